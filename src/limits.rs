//! Hard limits. Violations surface as `BookingError::LimitExceeded`.

use crate::model::{Ms, DAY_MS};

/// 2000-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking window may not exceed 90 days.
pub const MAX_SPAN_DURATION_MS: Ms = 90 * DAY_MS;

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_CATEGORY_LEN: usize = 64;
pub const MAX_NOTES_LEN: usize = 4096;

pub const MAX_PARTICIPANTS: usize = 200;
pub const MAX_RESOURCES_PER_BOOKING: usize = 32;
pub const MAX_REMINDERS_PER_BOOKING: usize = 16;

/// Open-ended recurrence stops this far past the seed start.
pub const EXPANSION_HORIZON_MS: Ms = 2 * 365 * DAY_MS;

/// Absolute ceiling on occurrences per expansion, any end type.
pub const MAX_OCCURRENCES: usize = 1000;

/// Widest admissible recurrence interval (10 years of weeks).
pub const MAX_RECURRENCE_INTERVAL: u32 = 520;

/// Widest window accepted by range queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 400 * DAY_MS;

/// Most rows one dispatcher tick will claim.
pub const MAX_CLAIM_PAGE: usize = 1024;
