use ulid::Ulid;

use crate::model::Booking;

#[derive(Debug)]
pub enum BookingError {
    /// Malformed candidate; never persisted.
    Validation(&'static str),
    /// Overlapping bookings sharing a participant or resource.
    /// Recoverable: the caller may re-submit with `force`.
    Conflicts(Vec<Booking>),
    /// Daily cap reached. Hard block, no override path.
    Capacity { day_count: usize, cap: usize },
    NotFound(Ulid),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Validation(msg) => write!(f, "validation failed: {msg}"),
            BookingError::Conflicts(found) => {
                write!(f, "{} conflicting booking(s):", found.len())?;
                for b in found {
                    write!(f, " {}", b.id)?;
                }
                Ok(())
            }
            BookingError::Capacity { day_count, cap } => {
                write!(f, "daily cap {cap} reached: {day_count} booking(s) already that day")
            }
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}
