use ulid::Ulid;

use crate::model::*;

use super::error::BookingError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_span(span: &Span) -> Result<(), BookingError> {
    use crate::limits::*;
    if span.end <= span.start {
        return Err(BookingError::Validation("window end must be after start"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(BookingError::LimitExceeded("window too wide"));
    }
    Ok(())
}

pub(crate) fn validate_booking(booking: &Booking) -> Result<(), BookingError> {
    use crate::limits::*;
    validate_span(&booking.span)?;
    if booking.title.trim().is_empty() {
        return Err(BookingError::Validation("title must not be empty"));
    }
    if booking.title.len() > MAX_TITLE_LEN {
        return Err(BookingError::LimitExceeded("title too long"));
    }
    if booking.category.len() > MAX_CATEGORY_LEN {
        return Err(BookingError::LimitExceeded("category too long"));
    }
    if let Some(ref notes) = booking.notes
        && notes.len() > MAX_NOTES_LEN {
            return Err(BookingError::LimitExceeded("notes too long"));
        }
    if booking.participants.is_empty() {
        return Err(BookingError::Validation("at least one participant required"));
    }
    if booking.participants.len() > MAX_PARTICIPANTS {
        return Err(BookingError::LimitExceeded("too many participants"));
    }
    if booking.resources.len() > MAX_RESOURCES_PER_BOOKING {
        return Err(BookingError::LimitExceeded("too many resources"));
    }
    if booking.reminders.len() > MAX_REMINDERS_PER_BOOKING {
        return Err(BookingError::LimitExceeded("too many reminders"));
    }
    for r in &booking.reminders {
        if r.offset_minutes < 0 {
            return Err(BookingError::Validation("reminder offset must not be negative"));
        }
        if !r.channels.any() {
            return Err(BookingError::Validation("reminder needs at least one channel"));
        }
    }
    if let Some(rec) = &booking.recurrence {
        if rec.interval == 0 {
            return Err(BookingError::Validation("recurrence interval must be >= 1"));
        }
        if rec.interval > MAX_RECURRENCE_INTERVAL {
            return Err(BookingError::LimitExceeded("recurrence interval too wide"));
        }
        if let Frequency::Custom { days } = rec.freq
            && days.is_empty() {
                return Err(BookingError::Validation("custom recurrence needs at least one weekday"));
            }
        if let RecurrenceEnd::Count(0) = rec.end {
            return Err(BookingError::Validation("recurrence count must be >= 1"));
        }
    }
    Ok(())
}

/// True when the two bookings share a participant or an identical
/// resource ref. Both sets are sorted, so walk them in lockstep.
pub(crate) fn shares_participant_or_resource(a: &Booking, b: &Booking) -> bool {
    let mut bp = b.participants.iter().peekable();
    for p in &a.participants {
        while let Some(&&q) = bp.peek() {
            if q < *p {
                bp.next();
            } else if q == *p {
                return true;
            } else {
                break;
            }
        }
    }
    let mut br = b.resources.iter().peekable();
    for r in &a.resources {
        while let Some(&&s) = br.peek() {
            if s < *r {
                br.next();
            } else if s == *r {
                return true;
            } else {
                break;
            }
        }
    }
    false
}

/// All bookings whose window overlaps the candidate's and which share
/// a participant or resource with it. `exclude` supports in-place
/// edits. Returns every match so the caller can present the full
/// conflict list; resolution is always an explicit caller decision.
pub fn find_conflicts(candidate: &Booking, existing: &[Booking], exclude: Option<Ulid>) -> Vec<Booking> {
    existing
        .iter()
        .filter(|b| Some(b.id) != exclude)
        .filter(|b| b.span.overlaps(&candidate.span))
        .filter(|b| shares_participant_or_resource(candidate, b))
        .cloned()
        .collect()
}
