//! Collaborator seams. Durable storage, preference lookup, and the
//! actual email/push transport live behind these traits; the core
//! never talks to a database or an SMTP server directly.

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Bookings whose window overlaps `range`.
    async fn query(&self, range: Span) -> Vec<Booking>;
    async fn get(&self, id: Ulid) -> Option<Booking>;
    async fn insert(&self, booking: Booking);
    /// False when no row with that id exists.
    async fn update(&self, booking: Booking) -> bool;
    async fn delete(&self, id: Ulid) -> Option<Booking>;
}

#[async_trait]
pub trait ScheduledNotificationRepository: Send + Sync {
    /// Invalidate the booking's `Pending` rows, then insert the
    /// recomputed plan. Keeps a reschedule from leaving stale or
    /// duplicate reminders behind.
    async fn upsert_plan(&self, booking_id: Ulid, plan: Vec<ScheduledNotification>);

    /// Atomically claim up to `limit` rows with `status = Pending`
    /// and `due_at <= now`, ordered by `due_at`. The
    /// `Pending → Claimed` transition is a compare-and-swap: with
    /// concurrent callers each row has at most one winner.
    async fn claim_due(&self, now: Ms, limit: usize) -> Vec<ScheduledNotification>;

    async fn mark_sent(&self, id: Ulid, log_id: Option<Ulid>);
    async fn mark_failed(&self, id: Ulid, log_id: Option<Ulid>);
    async fn mark_cancelled(&self, id: Ulid);

    /// `Pending` and `Claimed` rows for the booking → `Cancelled`.
    /// Claimed rows are included so a delete racing an in-flight
    /// claim still converges. Returns the number of rows touched.
    async fn cancel_for_booking(&self, booking_id: Ulid) -> usize;

    async fn pending_for_booking(&self, booking_id: Ulid) -> Vec<ScheduledNotification>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// None means the user never saved preferences; callers fall back
    /// to `NotificationPreference::default()`.
    async fn get(&self, user_id: Ulid) -> Option<NotificationPreference>;
}

#[async_trait]
pub trait NotificationLogStore: Send + Sync {
    async fn append(&self, log: NotificationLog);
    /// False when no such log exists.
    async fn mark_read(&self, id: Ulid) -> bool;
    async fn for_user(&self, user_id: Ulid) -> Vec<NotificationLog>;
}

#[derive(Debug)]
pub struct SendError(pub String);

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "send failed: {}", self.0)
    }
}

impl std::error::Error for SendError {}

/// Opaque transport. Template rendering and delivery credentials are
/// entirely the implementor's business.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        user_id: Ulid,
        channel: Channel,
        category: EventCategory,
        payload: &serde_json::Value,
    ) -> Result<(), SendError>;
}
