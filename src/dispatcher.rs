use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::now_ms;
use crate::limits::MAX_CLAIM_PAGE;
use crate::model::*;
use crate::observability;
use crate::prefs::{minute_of_day, should_suppress};
use crate::repo::{
    NotificationLogStore, NotificationSender, PreferenceStore, ScheduleRepository,
    ScheduledNotificationRepository,
};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub tick: Duration,
    pub claim_page: usize,
    /// Business-zone offset for quiet-hours evaluation, minutes.
    pub utc_offset_min: i32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(30),
            claim_page: 128,
            utc_offset_min: 0,
        }
    }
}

/// Time-driven reminder worker. Each tick claims due rows (CAS,
/// safe with concurrent workers), filters them through per-user
/// preferences, hands the rest to the transport, and records every
/// outcome. One bad row never stops the batch, and a `Failed` row is
/// terminal — retries are a manual, administrative action.
pub struct Dispatcher {
    schedules: Arc<dyn ScheduleRepository>,
    notifications: Arc<dyn ScheduledNotificationRepository>,
    prefs: Arc<dyn PreferenceStore>,
    logs: Arc<dyn NotificationLogStore>,
    sender: Arc<dyn NotificationSender>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        notifications: Arc<dyn ScheduledNotificationRepository>,
        prefs: Arc<dyn PreferenceStore>,
        logs: Arc<dyn NotificationLogStore>,
        sender: Arc<dyn NotificationSender>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            schedules,
            notifications,
            prefs,
            logs,
            sender,
            config,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            interval.tick().await;
            let started = Instant::now();
            let processed = self.tick(now_ms()).await;
            metrics::histogram!(observability::DISPATCH_TICK_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            if processed > 0 {
                info!("dispatched {processed} reminder(s)");
            }
        }
    }

    /// One polling pass. Returns the number of rows processed.
    pub async fn tick(&self, now: Ms) -> usize {
        let page = self.config.claim_page.min(MAX_CLAIM_PAGE);
        let claimed = self.notifications.claim_due(now, page).await;
        if claimed.is_empty() {
            return 0;
        }
        metrics::counter!(observability::REMINDERS_CLAIMED_TOTAL).increment(claimed.len() as u64);

        let mut processed = 0;
        for row in claimed {
            self.process_one(row, now).await;
            processed += 1;
        }
        processed
    }

    async fn process_one(&self, row: ScheduledNotification, now: Ms) {
        let Some(booking) = self.schedules.get(row.booking_id).await else {
            // Deleted between planning and claim; converge on Cancelled.
            self.notifications.mark_cancelled(row.id).await;
            metrics::counter!(observability::REMINDERS_CANCELLED_TOTAL).increment(1);
            debug!("skip reminder {}: booking {} gone", row.id, row.booking_id);
            return;
        };

        let pref = self.prefs.get(row.user_id).await.unwrap_or_default();
        let minute = minute_of_day(now, self.config.utc_offset_min);
        let payload = serde_json::json!({
            "title": booking.title,
            "category": booking.category,
            "start": booking.span.start,
            "offsetMinutes": row.offset_minutes,
        });

        let mut first_log: Option<Ulid> = None;
        let mut failed = false;
        for channel in row.channels.iter() {
            if should_suppress(&pref, channel, EventCategory::Reminder, minute) {
                let log_id = self
                    .write_log(&row, channel, payload.clone(), LogOutcome::Suppressed, now)
                    .await;
                first_log.get_or_insert(log_id);
                metrics::counter!(observability::REMINDERS_SUPPRESSED_TOTAL).increment(1);
                continue;
            }
            match self
                .sender
                .send(row.user_id, channel, EventCategory::Reminder, &payload)
                .await
            {
                Ok(()) => {
                    let log_id = self
                        .write_log(&row, channel, payload.clone(), LogOutcome::Sent, now)
                        .await;
                    first_log.get_or_insert(log_id);
                    metrics::counter!(observability::REMINDERS_SENT_TOTAL).increment(1);
                }
                Err(e) => {
                    warn!("reminder {} via {} failed: {e}", row.id, channel.label());
                    let log_id = self
                        .write_log(
                            &row,
                            channel,
                            payload.clone(),
                            LogOutcome::Failed { error: e.to_string() },
                            now,
                        )
                        .await;
                    first_log.get_or_insert(log_id);
                    metrics::counter!(observability::REMINDERS_FAILED_TOTAL).increment(1);
                    failed = true;
                }
            }
        }

        // A fully suppressed row still counts as delivered, so the
        // "would have fired" history stays intact.
        if failed {
            self.notifications.mark_failed(row.id, first_log).await;
        } else {
            self.notifications.mark_sent(row.id, first_log).await;
        }
    }

    async fn write_log(
        &self,
        row: &ScheduledNotification,
        channel: Channel,
        summary: serde_json::Value,
        outcome: LogOutcome,
        now: Ms,
    ) -> Ulid {
        let log = NotificationLog {
            id: Ulid::new(),
            booking_id: row.booking_id,
            user_id: row.user_id,
            channel,
            category: EventCategory::Reminder,
            summary,
            outcome,
            read: false,
            at: now,
        };
        let id = log.id;
        self.logs.append(log).await;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::plan_reminders;
    use crate::engine::tests::support::{booking_at, user};
    use crate::repo::SendError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    const H: Ms = 3_600_000;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(Ulid, Channel)>>,
        fail_for: Option<Ulid>,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(
            &self,
            user_id: Ulid,
            channel: Channel,
            _category: EventCategory,
            _payload: &serde_json::Value,
        ) -> Result<(), SendError> {
            if self.fail_for == Some(user_id) {
                return Err(SendError("smtp unreachable".into()));
            }
            self.sent.lock().await.push((user_id, channel));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
        dispatcher: Arc<Dispatcher>,
    }

    fn fixture_with(sender: RecordingSender, config: DispatcherConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(sender);
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            sender.clone(),
            config,
        ));
        Fixture { store, sender, dispatcher }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingSender::default(), DispatcherConfig::default())
    }

    /// Insert a booking plus its reminder rows, due `offset_minutes`
    /// before `start`.
    async fn seed(fx: &Fixture, start: Ms, users: &[Ulid], channels: Channels) -> Vec<ScheduledNotification> {
        use crate::repo::{ScheduleRepository, ScheduledNotificationRepository};
        let mut booking = booking_at(start, start + H, users, &[]);
        booking.reminders = vec![ReminderSpec { offset_minutes: 15, channels }];
        let plan = plan_reminders(&booking, start - DAY_MS);
        fx.store.insert(booking.clone()).await;
        fx.store.upsert_plan(booking.id, plan.clone()).await;
        plan
    }

    #[tokio::test]
    async fn sends_due_reminders_and_records_outcome() {
        let fx = fixture();
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1)], Channels::email()).await;
        let due_at = plan[0].due_at;

        // Not yet due: nothing claimed.
        assert_eq!(fx.dispatcher.tick(due_at - MINUTE_MS).await, 0);

        assert_eq!(fx.dispatcher.tick(due_at + 1).await, 1);
        let row = fx.store.notification(plan[0].id).unwrap();
        assert_eq!(row.status, NotificationStatus::Sent);
        assert!(row.log_id.is_some());

        let sent = fx.sender.sent.lock().await;
        assert_eq!(*sent, vec![(user(1), Channel::Email)]);

        use crate::repo::NotificationLogStore;
        let logs = fx.store.for_user(user(1)).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].outcome, LogOutcome::Sent);
        assert_eq!(logs[0].category, EventCategory::Reminder);
    }

    #[tokio::test]
    async fn second_tick_does_not_resend() {
        let fx = fixture();
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1)], Channels::email()).await;
        let t = plan[0].due_at + 1;

        assert_eq!(fx.dispatcher.tick(t).await, 1);
        assert_eq!(fx.dispatcher.tick(t).await, 0);
        assert_eq!(fx.sender.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn quiet_hours_suppress_but_mark_sent() {
        let fx = fixture();
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1)], Channels::email()).await;

        // Quiet hours covering the whole day: always suppressed.
        fx.store.set_preference(
            user(1),
            NotificationPreference {
                quiet_hours: Some(QuietHours { start_min: 0, end_min: 24 * 60 }),
                ..Default::default()
            },
        );

        assert_eq!(fx.dispatcher.tick(plan[0].due_at + 1).await, 1);
        let row = fx.store.notification(plan[0].id).unwrap();
        assert_eq!(row.status, NotificationStatus::Sent);
        assert!(fx.sender.sent.lock().await.is_empty());

        use crate::repo::NotificationLogStore;
        let logs = fx.store.for_user(user(1)).await;
        assert_eq!(logs[0].outcome, LogOutcome::Suppressed);
    }

    #[tokio::test]
    async fn disabled_channel_suppressed_enabled_channel_delivered() {
        let fx = fixture();
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1)], Channels::both()).await;
        fx.store.set_preference(
            user(1),
            NotificationPreference { email_enabled: false, ..Default::default() },
        );

        fx.dispatcher.tick(plan[0].due_at + 1).await;
        let sent = fx.sender.sent.lock().await;
        assert_eq!(*sent, vec![(user(1), Channel::Push)]);
        let row = fx.store.notification(plan[0].id).unwrap();
        assert_eq!(row.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let sender = RecordingSender { fail_for: Some(user(1)), ..Default::default() };
        let fx = fixture_with(sender, DispatcherConfig::default());
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1), user(2)], Channels::email()).await;
        let t = plan.iter().map(|n| n.due_at).max().unwrap() + 1;

        assert_eq!(fx.dispatcher.tick(t).await, 2);

        let by_user = |u: Ulid| {
            plan.iter()
                .find(|n| n.user_id == u)
                .map(|n| fx.store.notification(n.id).unwrap().status)
                .unwrap()
        };
        assert_eq!(by_user(user(1)), NotificationStatus::Failed);
        assert_eq!(by_user(user(2)), NotificationStatus::Sent);

        // The failure is terminal: nothing left to claim.
        assert_eq!(fx.dispatcher.tick(t).await, 0);
    }

    #[tokio::test]
    async fn booking_gone_after_claim_cancels_row() {
        let fx = fixture();
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1)], Channels::email()).await;

        use crate::repo::ScheduleRepository;
        fx.store.delete(plan[0].booking_id).await.unwrap();

        assert_eq!(fx.dispatcher.tick(plan[0].due_at + 1).await, 1);
        let row = fx.store.notification(plan[0].id).unwrap();
        assert_eq!(row.status, NotificationStatus::Cancelled);
        assert!(fx.sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_workers_claim_each_row_once() {
        let fx = fixture();
        let other = Arc::new(Dispatcher::new(
            fx.store.clone(),
            fx.store.clone(),
            fx.store.clone(),
            fx.store.clone(),
            fx.sender.clone(),
            DispatcherConfig::default(),
        ));
        let start = now_ms() + 16 * MINUTE_MS;
        let plan = seed(&fx, start, &[user(1)], Channels::email()).await;
        let t = plan[0].due_at + 1;

        let a = tokio::spawn({
            let d = fx.dispatcher.clone();
            async move { d.tick(t).await }
        });
        let b = tokio::spawn({
            let d = other.clone();
            async move { d.tick(t).await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a + b, 1);
        assert_eq!(fx.sender.sent.lock().await.len(), 1);
    }
}
