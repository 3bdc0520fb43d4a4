use chrono::{Datelike, Months, TimeZone, Utc};

use crate::limits::{EXPANSION_HORIZON_MS, MAX_OCCURRENCES};
use crate::model::*;

/// Lazily expand a recurrence rule from its first occurrence window.
///
/// The seed is occurrence zero and every produced window keeps the
/// seed's duration. `Count`/`Until` ends are finite; `Open` stops at
/// the expansion horizon. `MAX_OCCURRENCES` bounds every end type, so
/// the sequence always terminates. Weekday-driven frequencies yield
/// only matching days (the seed day counts when it matches).
pub fn expand(rule: &Recurrence, seed: Span) -> impl Iterator<Item = Span> {
    Occurrences {
        rule: *rule,
        seed,
        step: 0,
        cursor_day: 0,
        match_idx: 0,
        produced: 0,
    }
}

struct Occurrences {
    rule: Recurrence,
    seed: Span,
    /// Next multiple of `interval` for shift-based frequencies.
    step: u32,
    /// Days past the seed day, for weekday-driven frequencies.
    cursor_day: i64,
    /// Matching days seen so far, for weekday-driven frequencies.
    match_idx: u32,
    produced: usize,
}

impl Occurrences {
    fn interval(&self) -> u32 {
        self.rule.interval.max(1)
    }

    fn within_end(&self, start: Ms) -> bool {
        match self.rule.end {
            RecurrenceEnd::Count(_) => true, // counted in next()
            RecurrenceEnd::Until(until) => start <= until,
            RecurrenceEnd::Open => start <= self.seed.start + EXPANSION_HORIZON_MS,
        }
    }

    fn next_shift(&mut self, unit: Ms) -> Option<Span> {
        let delta = self.step as Ms * self.interval() as Ms * unit;
        self.step = self.step.checked_add(1)?;
        Some(self.seed.shifted(delta))
    }

    /// Always offsets from the seed, so a Jan-31 monthly series clamps
    /// short months without drifting.
    fn next_months(&mut self, unit: u32) -> Option<Span> {
        let k = self.step.checked_mul(self.interval())?.checked_mul(unit)?;
        self.step = self.step.checked_add(1)?;
        let start_dt = Utc.timestamp_millis_opt(self.seed.start).single()?;
        let shifted = start_dt.checked_add_months(Months::new(k))?;
        let start = shifted.timestamp_millis();
        Some(Span::new(start, start + self.seed.duration_ms()))
    }

    fn next_weekday_match(&mut self, matches: impl Fn(u8) -> bool) -> Option<Span> {
        // One yield needs at most `interval` matching days; a week of
        // misses past that means the set can never match again.
        let give_up = self.cursor_day + self.interval() as i64 * 7 + 7;
        while self.cursor_day < give_up {
            let start = self.seed.start + self.cursor_day * DAY_MS;
            self.cursor_day += 1;
            if !matches(weekday_of(start)?) {
                continue;
            }
            let m = self.match_idx;
            self.match_idx = self.match_idx.checked_add(1)?;
            if m % self.interval() == 0 {
                return Some(Span::new(start, start + self.seed.duration_ms()));
            }
        }
        None
    }
}

impl Iterator for Occurrences {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.produced >= MAX_OCCURRENCES {
            return None;
        }
        if let RecurrenceEnd::Count(n) = self.rule.end
            && self.produced >= n as usize {
                return None;
            }
        let candidate = match self.rule.freq {
            Frequency::Daily => self.next_shift(DAY_MS),
            Frequency::Weekly => self.next_shift(7 * DAY_MS),
            Frequency::Monthly => self.next_months(1),
            Frequency::Yearly => self.next_months(12),
            Frequency::Weekdays => self.next_weekday_match(|d| (1..=5).contains(&d)),
            Frequency::Custom { days } => self.next_weekday_match(move |d| days.contains(d)),
        }?;
        if !self.within_end(candidate.start) {
            return None;
        }
        self.produced += 1;
        Some(candidate)
    }
}

/// 0 = Sunday, matching `WeekdaySet`.
fn weekday_of(t: Ms) -> Option<u8> {
    let dt = Utc.timestamp_millis_opt(t).single()?;
    Some(dt.weekday().num_days_from_sunday() as u8)
}
