use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Same duration, moved by `delta` milliseconds.
    pub fn shifted(&self, delta: Ms) -> Span {
        Span::new(self.start + delta, self.end + delta)
    }
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Room,
    Vehicle,
    Equipment,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Room => "room",
            ResourceKind::Vehicle => "vehicle",
            ResourceKind::Equipment => "equipment",
        }
    }
}

/// A shared bookable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: Ulid,
}

// ── Channels ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Email,
    Push,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Channels {
    pub email: bool,
    pub push: bool,
}

impl Channels {
    pub const fn email() -> Self {
        Self { email: true, push: false }
    }

    pub const fn push() -> Self {
        Self { email: false, push: true }
    }

    pub const fn both() -> Self {
        Self { email: true, push: true }
    }

    pub fn any(&self) -> bool {
        self.email || self.push
    }

    pub fn contains(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::Push => self.push,
        }
    }

    /// Enabled channels, email first.
    pub fn iter(&self) -> impl Iterator<Item = Channel> {
        let this = *self;
        [Channel::Email, Channel::Push]
            .into_iter()
            .filter(move |c| this.contains(*c))
    }
}

// ── Recurrence ───────────────────────────────────────────────────

/// Days of week as a bitmask; bit n = n days after Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeekdaySet(pub u8);

impl WeekdaySet {
    pub fn from_days(days: &[u8]) -> Self {
        let mut set = Self::default();
        for &d in days {
            set.insert(d);
        }
        set
    }

    pub fn insert(&mut self, day: u8) {
        if day <= 6 {
            self.0 |= 1 << day;
        }
    }

    pub fn contains(&self, day: u8) -> bool {
        day <= 6 && self.0 & (1 << day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 & 0x7f == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Monday through Friday.
    Weekdays,
    Custom { days: WeekdaySet },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceEnd {
    /// Total number of occurrences, seed included.
    Count(u32),
    /// Last admissible occurrence start, inclusive.
    Until(Ms),
    /// No explicit end; expansion is horizon-capped.
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub freq: Frequency,
    /// Every Nth occurrence of the base pattern (>= 1).
    pub interval: u32,
    pub end: RecurrenceEnd,
}

// ── Booking ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSpec {
    pub offset_minutes: i64,
    pub channels: Channels,
}

/// A reserved time window tied to participants and/or resources.
///
/// A candidate with `recurrence: Some(_)` is expanded at create time
/// into independent instances, each stored with its own id and
/// `recurrence: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub category: String,
    pub title: String,
    pub notes: Option<String>,
    pub span: Span,
    pub all_day: bool,
    pub recurrence: Option<Recurrence>,
    pub participants: BTreeSet<Ulid>,
    pub resources: BTreeSet<ResourceRef>,
    pub reminders: Vec<ReminderSpec>,
    pub created_by: Ulid,
    pub updated_by: Ulid,
    pub created_at: Ms,
    pub updated_at: Ms,
}

// ── Preferences ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    Created,
    Updated,
    Deleted,
    Reminder,
    Leave,
}

impl EventCategory {
    pub fn label(&self) -> &'static str {
        match self {
            EventCategory::Created => "created",
            EventCategory::Updated => "updated",
            EventCategory::Deleted => "deleted",
            EventCategory::Reminder => "reminder",
            EventCategory::Leave => "leave",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryToggles {
    pub created: bool,
    pub updated: bool,
    pub deleted: bool,
    pub reminder: bool,
    pub leave: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self { created: true, updated: true, deleted: true, reminder: true, leave: true }
    }
}

impl CategoryToggles {
    pub fn enabled(&self, category: EventCategory) -> bool {
        match category {
            EventCategory::Created => self.created,
            EventCategory::Updated => self.updated,
            EventCategory::Deleted => self.deleted,
            EventCategory::Reminder => self.reminder,
            EventCategory::Leave => self.leave,
        }
    }
}

/// Per-user window during which delivery is suppressed.
/// Minutes from local midnight, half-open; `start > end` wraps past
/// midnight (e.g. 22:00–07:00). `start == end` is an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_min: u16,
    pub end_min: u16,
}

impl QuietHours {
    pub fn contains(&self, minute_of_day: u16) -> bool {
        if self.start_min <= self.end_min {
            self.start_min <= minute_of_day && minute_of_day < self.end_min
        } else {
            minute_of_day >= self.start_min || minute_of_day < self.end_min
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub categories: CategoryToggles,
    pub default_reminder_offset_min: i64,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            email_enabled: true,
            push_enabled: true,
            categories: CategoryToggles::default(),
            default_reminder_offset_min: 15,
            quiet_hours: None,
        }
    }
}

impl NotificationPreference {
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::Push => self.push_enabled,
        }
    }
}

// ── Scheduled notifications ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Pending,
    Claimed,
    Sent,
    Failed,
    Cancelled,
}

/// One due reminder for one participant. `Pending → Claimed →
/// {Sent | Failed}` is driven only by the dispatcher; `Cancelled`
/// is set externally when the owning booking goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub user_id: Ulid,
    pub offset_minutes: i64,
    pub channels: Channels,
    pub due_at: Ms,
    pub status: NotificationStatus,
    pub log_id: Option<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutcome {
    Sent,
    Suppressed,
    Failed { error: String },
}

/// Append-only audit record of one attempted send. Never mutated
/// except to mark read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub user_id: Ulid,
    pub channel: Channel,
    pub category: EventCategory,
    pub summary: serde_json::Value,
    pub outcome: LogOutcome,
    pub read: bool,
    pub at: Ms,
}

// ── Change feed ──────────────────────────────────────────────────

/// In-process booking change event, fanned out per participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    Created { id: Ulid },
    Updated { id: Ulid },
    Deleted { id: Ulid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_shifted_keeps_duration() {
        let s = Span::new(100, 250);
        let t = s.shifted(7 * DAY_MS);
        assert_eq!(t.duration_ms(), s.duration_ms());
        assert_eq!(t.start - s.start, 7 * DAY_MS);
    }

    #[test]
    fn weekday_set_roundtrip() {
        let set = WeekdaySet::from_days(&[1, 3, 5]);
        assert!(set.contains(1));
        assert!(set.contains(5));
        assert!(!set.contains(0));
        assert!(!set.contains(6));
        assert!(!set.is_empty());
        assert!(WeekdaySet::default().is_empty());
    }

    #[test]
    fn weekday_set_ignores_out_of_range() {
        let set = WeekdaySet::from_days(&[7, 200]);
        assert!(set.is_empty());
        assert!(!set.contains(7));
    }

    #[test]
    fn channels_iter_enabled_only() {
        let both: Vec<_> = Channels::both().iter().collect();
        assert_eq!(both, vec![Channel::Email, Channel::Push]);
        let push: Vec<_> = Channels::push().iter().collect();
        assert_eq!(push, vec![Channel::Push]);
        assert!(!Channels::default().any());
    }

    #[test]
    fn quiet_hours_plain_window() {
        let q = QuietHours { start_min: 9 * 60, end_min: 17 * 60 };
        assert!(q.contains(9 * 60));
        assert!(q.contains(12 * 60));
        assert!(!q.contains(17 * 60)); // half-open
        assert!(!q.contains(8 * 60 + 59));
    }

    #[test]
    fn quiet_hours_wraps_midnight() {
        let q = QuietHours { start_min: 22 * 60, end_min: 7 * 60 };
        assert!(q.contains(23 * 60 + 30));
        assert!(q.contains(6 * 60));
        assert!(q.contains(0));
        assert!(!q.contains(8 * 60));
        assert!(!q.contains(21 * 60 + 59));
    }

    #[test]
    fn quiet_hours_degenerate_is_empty() {
        let q = QuietHours { start_min: 300, end_min: 300 };
        assert!(!q.contains(300));
        assert!(!q.contains(0));
    }

    #[test]
    fn preference_defaults_all_on() {
        let p = NotificationPreference::default();
        assert!(p.channel_enabled(Channel::Email));
        assert!(p.channel_enabled(Channel::Push));
        assert!(p.categories.enabled(EventCategory::Reminder));
        assert_eq!(p.default_reminder_offset_min, 15);
        assert!(p.quiet_hours.is_none());
    }
}
