//! In-memory repository implementations. Test and single-process
//! backing; a database-backed deployment swaps these out behind the
//! `repo` traits.

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;
use crate::repo::{
    NotificationLogStore, PreferenceStore, ScheduleRepository, ScheduledNotificationRepository,
};

#[derive(Default)]
pub struct MemoryStore {
    bookings: DashMap<Ulid, Booking>,
    notifications: DashMap<Ulid, ScheduledNotification>,
    prefs: DashMap<Ulid, NotificationPreference>,
    logs: DashMap<Ulid, NotificationLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_preference(&self, user_id: Ulid, pref: NotificationPreference) {
        self.prefs.insert(user_id, pref);
    }

    pub fn notification(&self, id: Ulid) -> Option<ScheduledNotification> {
        self.notifications.get(&id).map(|e| e.value().clone())
    }

    pub fn notifications_for_booking(&self, booking_id: Ulid) -> Vec<ScheduledNotification> {
        let mut rows: Vec<ScheduledNotification> = self
            .notifications
            .iter()
            .filter(|e| e.value().booking_id == booking_id)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|n| n.due_at);
        rows
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[async_trait]
impl ScheduleRepository for MemoryStore {
    async fn query(&self, range: Span) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.value().span.overlaps(&range))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.span.start);
        out
    }

    async fn get(&self, id: Ulid) -> Option<Booking> {
        self.bookings.get(&id).map(|e| e.value().clone())
    }

    async fn insert(&self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    async fn update(&self, booking: Booking) -> bool {
        match self.bookings.get_mut(&booking.id) {
            Some(mut entry) => {
                *entry = booking;
                true
            }
            None => false,
        }
    }

    async fn delete(&self, id: Ulid) -> Option<Booking> {
        self.bookings.remove(&id).map(|(_, b)| b)
    }
}

// ── Scheduled notifications ──────────────────────────────────────

#[async_trait]
impl ScheduledNotificationRepository for MemoryStore {
    async fn upsert_plan(&self, booking_id: Ulid, plan: Vec<ScheduledNotification>) {
        for mut entry in self.notifications.iter_mut() {
            let row = entry.value_mut();
            if row.booking_id == booking_id && row.status == NotificationStatus::Pending {
                row.status = NotificationStatus::Cancelled;
            }
        }
        for row in plan {
            self.notifications.insert(row.id, row);
        }
    }

    async fn claim_due(&self, now: Ms, limit: usize) -> Vec<ScheduledNotification> {
        let mut due: Vec<(Ms, Ulid)> = self
            .notifications
            .iter()
            .filter(|e| {
                e.value().status == NotificationStatus::Pending && e.value().due_at <= now
            })
            .map(|e| (e.value().due_at, *e.key()))
            .collect();
        due.sort();

        let mut claimed = Vec::new();
        for (_, id) in due.into_iter().take(limit) {
            // The entry lock makes this a compare-and-swap: a row
            // another worker already claimed is skipped here.
            if let Some(mut entry) = self.notifications.get_mut(&id)
                && entry.value().status == NotificationStatus::Pending {
                    entry.value_mut().status = NotificationStatus::Claimed;
                    claimed.push(entry.value().clone());
                }
        }
        claimed
    }

    async fn mark_sent(&self, id: Ulid, log_id: Option<Ulid>) {
        if let Some(mut entry) = self.notifications.get_mut(&id) {
            entry.value_mut().status = NotificationStatus::Sent;
            entry.value_mut().log_id = log_id;
        }
    }

    async fn mark_failed(&self, id: Ulid, log_id: Option<Ulid>) {
        if let Some(mut entry) = self.notifications.get_mut(&id) {
            entry.value_mut().status = NotificationStatus::Failed;
            entry.value_mut().log_id = log_id;
        }
    }

    async fn mark_cancelled(&self, id: Ulid) {
        if let Some(mut entry) = self.notifications.get_mut(&id) {
            entry.value_mut().status = NotificationStatus::Cancelled;
        }
    }

    async fn cancel_for_booking(&self, booking_id: Ulid) -> usize {
        let mut touched = 0;
        for mut entry in self.notifications.iter_mut() {
            let row = entry.value_mut();
            if row.booking_id == booking_id
                && matches!(
                    row.status,
                    NotificationStatus::Pending | NotificationStatus::Claimed
                )
            {
                row.status = NotificationStatus::Cancelled;
                touched += 1;
            }
        }
        touched
    }

    async fn pending_for_booking(&self, booking_id: Ulid) -> Vec<ScheduledNotification> {
        let mut rows: Vec<ScheduledNotification> = self
            .notifications
            .iter()
            .filter(|e| {
                e.value().booking_id == booking_id
                    && e.value().status == NotificationStatus::Pending
            })
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|n| n.due_at);
        rows
    }
}

// ── Preferences / logs ───────────────────────────────────────────

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get(&self, user_id: Ulid) -> Option<NotificationPreference> {
        self.prefs.get(&user_id).map(|e| *e.value())
    }
}

#[async_trait]
impl NotificationLogStore for MemoryStore {
    async fn append(&self, log: NotificationLog) {
        self.logs.insert(log.id, log);
    }

    async fn mark_read(&self, id: Ulid) -> bool {
        match self.logs.get_mut(&id) {
            Some(mut entry) => {
                entry.value_mut().read = true;
                true
            }
            None => false,
        }
    }

    async fn for_user(&self, user_id: Ulid) -> Vec<NotificationLog> {
        let mut out: Vec<NotificationLog> = self
            .logs
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|l| l.at);
        out
    }
}
