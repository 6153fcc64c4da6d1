//! The pending-change queue a `WriteEngine` enqueues into and a sync engine
//! drains. Keyed by id so a later change to the same entity replaces an
//! earlier still-pending one rather than both being replayed.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ripple_core::{Entity, PendingChange};

pub struct PendingQueue<T: Entity> {
    changes: Mutex<HashMap<T::Id, PendingChange<T, T::Id>>>,
}

impl<T: Entity> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            changes: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Entity> PendingQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `change`, replacing whatever was pending for the same id.
    pub fn enqueue(&self, change: PendingChange<T, T::Id>) {
        self.changes
            .lock()
            .expect("pending queue lock poisoned")
            .insert(change.id.clone(), change);
    }

    pub fn remove(&self, id: &T::Id) -> Option<PendingChange<T, T::Id>> {
        self.changes.lock().expect("pending queue lock poisoned").remove(id)
    }

    pub fn count(&self) -> u64 {
        self.changes.lock().expect("pending queue lock poisoned").len() as u64
    }

    /// Every change whose `next_attempt_at` has arrived, ordered by
    /// `enqueued_at` so older writes retry first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<PendingChange<T, T::Id>> {
        let guard = self.changes.lock().expect("pending queue lock poisoned");
        let mut due: Vec<_> = guard
            .values()
            .filter(|c| c.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.enqueued_at);
        due
    }

    pub fn reschedule(&self, id: &T::Id, next_attempt_at: DateTime<Utc>) {
        if let Some(change) = self.changes.lock().expect("pending queue lock poisoned").get_mut(id) {
            change.record_attempt(next_attempt_at);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::PendingOp;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        id: u64,
    }

    impl Entity for Widget {
        type Id = u64;
        fn id(&self) -> u64 {
            self.id
        }
        fn type_name() -> &'static str {
            "widget"
        }
    }

    #[test]
    fn later_change_replaces_earlier_for_same_id() {
        let queue = PendingQueue::<Widget>::new();
        queue.enqueue(PendingChange::save(1, None, Widget { id: 1 }));
        assert_eq!(queue.count(), 1);
        queue.enqueue(PendingChange::delete(1, Some(Widget { id: 1 })));
        assert_eq!(queue.count(), 1);
        assert_eq!(queue.due(Utc::now())[0].op, PendingOp::Delete);
    }

    #[test]
    fn due_returns_changes_whose_time_has_come() {
        let queue = PendingQueue::<Widget>::new();
        queue.enqueue(PendingChange::save(1, None, Widget { id: 1 }));
        let now = Utc::now();
        assert_eq!(queue.due(now).len(), 1);
        queue.reschedule(&1, now + chrono::Duration::seconds(60));
        assert_eq!(queue.due(now).len(), 0);
    }
}
