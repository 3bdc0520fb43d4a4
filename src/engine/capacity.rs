use std::collections::HashMap;

use crate::model::*;

/// Daily booking cap. The global default counts every booking whose
/// start falls on the same business-local day; `per_kind` entries
/// additionally cap the same-day count of bookings touching that
/// resource kind. The per-kind table is empty by default, which keeps
/// the historical global-count behavior.
#[derive(Debug, Clone)]
pub struct CapacityPolicy {
    pub default_cap: usize,
    pub per_kind: HashMap<ResourceKind, usize>,
    /// Business-day boundary offset from UTC, minutes.
    pub utc_offset_min: i32,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            default_cap: 10,
            per_kind: HashMap::new(),
            utc_offset_min: 0,
        }
    }
}

/// Which cap was hit, for the error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityHit {
    pub day_count: usize,
    pub cap: usize,
}

impl CapacityPolicy {
    /// Days since the epoch in the business time zone.
    pub fn day_index(&self, t: Ms) -> i64 {
        (t + self.utc_offset_min as Ms * MINUTE_MS).div_euclid(DAY_MS)
    }

    /// Returns the hit when adding a booking starting at
    /// `candidate_start` with `candidate_resources` would reach a cap.
    /// `existing` must already exclude the booking being edited, if any.
    pub fn would_exceed(
        &self,
        candidate_start: Ms,
        candidate_resources: &std::collections::BTreeSet<ResourceRef>,
        existing: &[Booking],
    ) -> Option<CapacityHit> {
        let day = self.day_index(candidate_start);
        let same_day: Vec<&Booking> = existing
            .iter()
            .filter(|b| self.day_index(b.span.start) == day)
            .collect();

        if same_day.len() >= self.default_cap {
            return Some(CapacityHit { day_count: same_day.len(), cap: self.default_cap });
        }

        for kind in candidate_resources.iter().map(|r| r.kind) {
            let Some(&cap) = self.per_kind.get(&kind) else { continue };
            let count = same_day
                .iter()
                .filter(|b| b.resources.iter().any(|r| r.kind == kind))
                .count();
            if count >= cap {
                return Some(CapacityHit { day_count: count, cap });
            }
        }
        None
    }
}
