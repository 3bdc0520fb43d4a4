mod capacity;
mod conflict;
mod error;
mod recurrence;

pub use capacity::{CapacityHit, CapacityPolicy};
pub use conflict::find_conflicts;
pub use error::BookingError;
pub use recurrence::expand;

pub(crate) use conflict::now_ms;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_MS;
use crate::model::*;
use crate::notify::ChangeFeed;
use crate::observability;
use crate::repo::{ScheduleRepository, ScheduledNotificationRepository};

use conflict::validate_booking;

/// Orchestrates booking lifecycle: conflict and capacity checks,
/// persistence, reminder planning, change-feed fan-out.
///
/// All mutations run under one write gate so conflict-check-then-
/// insert is a single serialized unit; two concurrent candidates for
/// the same resource can never both pass the check.
pub struct BookingService {
    schedules: Arc<dyn ScheduleRepository>,
    notifications: Arc<dyn ScheduledNotificationRepository>,
    feed: Arc<ChangeFeed>,
    capacity: CapacityPolicy,
    write_gate: Mutex<()>,
}

impl BookingService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        notifications: Arc<dyn ScheduledNotificationRepository>,
        feed: Arc<ChangeFeed>,
        capacity: CapacityPolicy,
    ) -> Self {
        Self {
            schedules,
            notifications,
            feed,
            capacity,
            write_gate: Mutex::new(()),
        }
    }

    /// Create a booking, or every instance of a recurring one.
    ///
    /// Two-phase: every instance is validated against the store and
    /// the batch so far, then all are committed — a recurring create
    /// is all-or-nothing. Conflicts come back as data
    /// (`BookingError::Conflicts`) unless `force`; the capacity cap
    /// has no override path.
    pub async fn create(
        &self,
        candidate: Booking,
        force: bool,
    ) -> Result<Vec<Booking>, BookingError> {
        validate_booking(&candidate)?;
        let now = now_ms();
        let check_start = Instant::now();
        let _gate = self.write_gate.lock().await;

        let windows: Vec<Span> = match &candidate.recurrence {
            Some(rule) => recurrence::expand(rule, candidate.span).collect(),
            None => vec![candidate.span],
        };
        let Some(last) = windows.last() else {
            return Err(BookingError::Validation("recurrence yields no occurrences"));
        };

        let probe = self.day_padded(Span::new(windows[0].start, last.end));
        let mut all = self.schedules.query(probe).await;

        let mut instances = Vec::with_capacity(windows.len());
        let mut conflicts: Vec<Booking> = Vec::new();
        let mut seen = HashSet::new();
        for (idx, span) in windows.iter().enumerate() {
            let mut instance = candidate.clone();
            instance.span = *span;
            instance.recurrence = None;
            if idx > 0 {
                instance.id = Ulid::new();
            }
            instance.created_at = now;
            instance.updated_at = now;

            if let Some(hit) = self
                .capacity
                .would_exceed(span.start, &instance.resources, &all)
            {
                metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "create", "status" => "capacity")
                    .increment(1);
                return Err(BookingError::Capacity { day_count: hit.day_count, cap: hit.cap });
            }
            if !force {
                for found in find_conflicts(&instance, &all, None) {
                    if seen.insert(found.id) {
                        conflicts.push(found);
                    }
                }
            }
            // Later occurrences check against earlier ones too.
            all.push(instance.clone());
            instances.push(instance);
        }

        if !conflicts.is_empty() {
            metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "create", "status" => "conflict")
                .increment(1);
            return Err(BookingError::Conflicts(conflicts));
        }

        metrics::histogram!(observability::BOOKING_CHECK_DURATION_SECONDS, "op" => "create")
            .record(check_start.elapsed().as_secs_f64());

        for instance in &instances {
            self.schedules.insert(instance.clone()).await;
            let plan = plan_reminders(instance, now);
            self.notifications.upsert_plan(instance.id, plan).await;
            self.feed
                .publish(instance, BookingEvent::Created { id: instance.id });
        }
        metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "create", "status" => "ok")
            .increment(instances.len() as u64);
        info!(
            "created {} booking instance(s): {:?}",
            instances.len(),
            candidate.title
        );
        Ok(instances)
    }

    /// Update one booking in place, rechecking conflicts (minus the
    /// booking itself) and capacity, then replacing its reminder plan.
    pub async fn update(
        &self,
        id: Ulid,
        mut changes: Booking,
        force: bool,
    ) -> Result<Booking, BookingError> {
        if changes.recurrence.is_some() {
            return Err(BookingError::Validation(
                "recurring series cannot be edited in place",
            ));
        }
        changes.id = id;
        validate_booking(&changes)?;
        let now = now_ms();
        let _gate = self.write_gate.lock().await;

        let current = self
            .schedules
            .get(id)
            .await
            .ok_or(BookingError::NotFound(id))?;
        changes.created_by = current.created_by;
        changes.created_at = current.created_at;
        changes.updated_at = now;

        let probe = self.day_padded(changes.span);
        let existing = self.schedules.query(probe).await;
        if !force {
            let conflicts = find_conflicts(&changes, &existing, Some(id));
            if !conflicts.is_empty() {
                metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "update", "status" => "conflict")
                    .increment(1);
                return Err(BookingError::Conflicts(conflicts));
            }
        }
        let others: Vec<Booking> = existing.into_iter().filter(|b| b.id != id).collect();
        if let Some(hit) = self
            .capacity
            .would_exceed(changes.span.start, &changes.resources, &others)
        {
            metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "update", "status" => "capacity")
                .increment(1);
            return Err(BookingError::Capacity { day_count: hit.day_count, cap: hit.cap });
        }

        if !self.schedules.update(changes.clone()).await {
            return Err(BookingError::NotFound(id));
        }
        // Stale rows for the old start time die here; the recomputed
        // plan replaces them.
        let plan = plan_reminders(&changes, now);
        self.notifications.upsert_plan(id, plan).await;
        self.feed.publish(&changes, BookingEvent::Updated { id });
        metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "update", "status" => "ok")
            .increment(1);
        Ok(changes)
    }

    /// Delete a booking and cancel its open reminders. `Claimed` rows
    /// are cancelled too: a delete racing an in-flight claim should
    /// converge on Cancelled even if a very late claim slips through.
    pub async fn delete(&self, id: Ulid) -> Result<Booking, BookingError> {
        let _gate = self.write_gate.lock().await;
        let removed = self
            .schedules
            .delete(id)
            .await
            .ok_or(BookingError::NotFound(id))?;
        let cancelled = self.notifications.cancel_for_booking(id).await;
        if cancelled > 0 {
            debug!("cancelled {cancelled} reminder(s) for deleted booking {id}");
        }
        self.feed.publish(&removed, BookingEvent::Deleted { id });
        metrics::counter!(observability::BOOKINGS_TOTAL, "op" => "delete", "status" => "ok")
            .increment(1);
        Ok(removed)
    }

    pub async fn get(&self, id: Ulid) -> Option<Booking> {
        self.schedules.get(id).await
    }

    pub async fn bookings_in(&self, range: Span) -> Result<Vec<Booking>, BookingError> {
        if range.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(BookingError::LimitExceeded("query window too wide"));
        }
        Ok(self.schedules.query(range).await)
    }

    /// Widen a window to whole business days so same-day capacity
    /// counting sees bookings outside the candidate's hours.
    fn day_padded(&self, span: Span) -> Span {
        let off = self.capacity.utc_offset_min as Ms * MINUTE_MS;
        let first_day = self.capacity.day_index(span.start);
        let last_day = self.capacity.day_index(span.end);
        Span::new(first_day * DAY_MS - off, (last_day + 1) * DAY_MS - off)
    }
}

/// Reminder rows for one persisted booking: one per (participant,
/// reminder) pair, skipping pairs whose due time already passed.
pub fn plan_reminders(booking: &Booking, now: Ms) -> Vec<ScheduledNotification> {
    let mut plan = Vec::new();
    for &user_id in &booking.participants {
        for spec in &booking.reminders {
            let due_at = booking.span.start - spec.offset_minutes * MINUTE_MS;
            if due_at <= now {
                debug!(
                    "skip reminder for {user_id} on {}: due time already past",
                    booking.id
                );
                continue;
            }
            plan.push(ScheduledNotification {
                id: Ulid::new(),
                booking_id: booking.id,
                user_id,
                offset_minutes: spec.offset_minutes,
                channels: spec.channels,
                due_at,
                status: NotificationStatus::Pending,
                log_id: None,
            });
        }
    }
    plan
}
