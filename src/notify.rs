use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{DayKey, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of committed events per (service, date), so a display can
/// refresh its availability grid when someone else books.
pub struct NotifyHub {
    channels: DashMap<DayKey, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, key: DayKey) -> broadcast::Receiver<Event> {
        self.channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is watching the day.
    pub fn send(&self, key: DayKey, event: &Event) {
        let drop_channel = match self.channels.get(&key) {
            Some(sender) => sender.send(event.clone()).is_err(),
            None => false,
        };
        // Every receiver is gone.
        if drop_channel {
            self.channels.remove_if(&key, |_, s| s.receiver_count() == 0);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceKind;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn key(day: u32) -> DayKey {
        DayKey::new(ServiceKind::Spa, NaiveDate::from_ymd_opt(2026, 10, day).unwrap())
    }

    fn cancelled(key: DayKey) -> Event {
        Event::BookingCancelled {
            id: Ulid::new(),
            service: key.service,
            date: key.date,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_for_its_day_only() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(key(19));

        hub.send(key(20), &cancelled(key(20)));
        let event = cancelled(key(19));
        hub.send(key(19), &event);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(key(19), &cancelled(key(19)));
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn channel_dropped_once_receivers_leave() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(key(19));
        assert_eq!(hub.channel_count(), 1);
        drop(rx);
        hub.send(key(19), &cancelled(key(19)));
        assert_eq!(hub.channel_count(), 0);
    }
}
