use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Booking, BookingEvent};

const CHANNEL_CAPACITY: usize = 256;

/// In-process change feed, one broadcast channel per participant.
/// The UI layer's live-refresh hook; not a delivery transport.
pub struct ChangeFeed {
    channels: DashMap<Ulid, broadcast::Sender<BookingEvent>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a participant's booking changes. Creates the
    /// channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Fan the event out to every participant. No-op for participants
    /// nobody is listening on.
    pub fn publish(&self, booking: &Booking, event: BookingEvent) {
        for user_id in &booking.participants {
            if let Some(sender) = self.channels.get(user_id) {
                let _ = sender.send(event);
            }
        }
    }

    /// Remove a participant's channel (e.g. on logout).
    pub fn remove(&self, user_id: &Ulid) {
        self.channels.remove(user_id);
    }
}
