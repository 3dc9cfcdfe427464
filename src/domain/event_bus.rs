//! Event Bus
//!
//! Pure synchronous fan-out of published events to every registered
//! subscriber, in subscription order. No buffering, no replay, no filtering.

pub struct EventBus<T> {
    subscribers: Vec<Box<dyn Fn(&T) + Send>>,
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber. Subscribers are invoked in registration order.
    pub fn subscribe(&mut self, subscriber: impl Fn(&T) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Deliver `event` to every subscriber, synchronously.
    pub fn publish(&self, event: &T) {
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn delivers_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(move |n: &u32| log.lock().unwrap().push((tag, *n)));
        }

        bus.publish(&7);
        bus.publish(&8);

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                ("first", 7),
                ("second", 7),
                ("third", 7),
                ("first", 8),
                ("second", 8),
                ("third", 8),
            ]
        );
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus: EventBus<u32> = EventBus::new();
        bus.publish(&1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
