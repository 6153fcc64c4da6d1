//! A replay-1 channel: the latest value is always available to a new
//! subscriber, and successive equal values are suppressed so subscribers
//! only observe genuine changes. Built directly on `tokio::sync::watch`,
//! which already has replay-of-latest semantics; this type adds the
//! equality suppression on top.

use tokio::sync::watch;

/// A single-value broadcast channel seeded with an initial value, where
/// `send` is a no-op if the new value equals the current one.
pub struct ReplayChannel<V> {
    tx: watch::Sender<V>,
}

impl<V: Clone + PartialEq + Send + Sync + 'static> ReplayChannel<V> {
    pub fn new(initial: V) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// A new receiver immediately observes the current value — replay
    /// semantics are automatic from `watch::Sender::subscribe`.
    pub fn subscribe(&self) -> watch::Receiver<V> {
        self.tx.subscribe()
    }

    /// Emit `value` unless it equals the channel's current value.
    pub fn emit(&self, value: V) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    pub fn current(&self) -> V {
        self.tx.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_subscriber_observes_current_value_immediately() {
        let channel = ReplayChannel::new(1);
        let rx = channel.subscribe();
        assert_eq!(*rx.borrow(), 1);
    }

    #[test]
    fn equal_successive_values_are_suppressed() {
        let channel = ReplayChannel::new(1);
        let rx = channel.subscribe();
        assert!(!rx.has_changed().unwrap());
        channel.emit(1);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn distinct_values_are_delivered() {
        let channel = ReplayChannel::new(1);
        let rx = channel.subscribe();
        channel.emit(2);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), 2);
    }
}
