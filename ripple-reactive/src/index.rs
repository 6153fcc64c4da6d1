//! The two indices that live beside the cache: `item_streams` keyed by id
//! and `query_streams` keyed by structural `Query` equality. Every
//! cache mutation updates the affected item's channel and recomputes every
//! query channel whose filter admits the entity's before- or after- state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ripple_core::{Entity, Query};
use serde_json::Value;
use tokio::sync::watch;

use crate::channel::ReplayChannel;
use crate::query_eval;

pub struct ReactiveIndex<T: Entity> {
    item_streams: Mutex<HashMap<T::Id, Arc<ReplayChannel<Option<T>>>>>,
    query_streams: Mutex<HashMap<Query, Arc<ReplayChannel<Vec<T>>>>>,
}

impl<T: Entity> Default for ReactiveIndex<T> {
    fn default() -> Self {
        Self {
            item_streams: Mutex::new(HashMap::new()),
            query_streams: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Entity> ReactiveIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an item's channel, seeding it with `current` if this is
    /// the channel's first subscriber.
    pub fn watch_item(&self, id: &T::Id, current: Option<T>) -> watch::Receiver<Option<T>> {
        let mut streams = self.item_streams.lock().expect("item_streams lock poisoned");
        let channel = streams
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ReplayChannel::new(current)));
        channel.subscribe()
    }

    /// Subscribe to a query's channel, seeding it with `current` (the
    /// query's result set computed by the caller) if this is its first
    /// subscriber.
    pub fn watch_query(&self, query: Query, current: Vec<T>) -> watch::Receiver<Vec<T>> {
        let mut streams = self.query_streams.lock().expect("query_streams lock poisoned");
        let channel = streams
            .entry(query)
            .or_insert_with(|| Arc::new(ReplayChannel::new(current)));
        channel.subscribe()
    }

    /// Called on every cache mutation: updates `id`'s item channel and
    /// recomputes every live query channel whose filter admits `before` or
    /// `after`. `all_present` is the full current set of present (non-
    /// tombstoned) entities, used to recompute admitted query results.
    pub fn on_mutation(&self, id: &T::Id, before: Option<&T>, after: Option<&T>, all_present: &[T]) {
        {
            let mut streams = self.item_streams.lock().expect("item_streams lock poisoned");
            let channel = streams
                .entry(id.clone())
                .or_insert_with(|| Arc::new(ReplayChannel::new(None)));
            channel.emit(after.cloned());
        }

        let before_json = before.map(|e| serde_json::to_value(e).unwrap_or(Value::Null));
        let after_json = after.map(|e| serde_json::to_value(e).unwrap_or(Value::Null));

        let streams = self.query_streams.lock().expect("query_streams lock poisoned");
        for (query, channel) in streams.iter() {
            let admitted_before = before_json.as_ref().map(|v| query_eval::admits(query, v)).unwrap_or(false);
            let admitted_after = after_json.as_ref().map(|v| query_eval::admits(query, v)).unwrap_or(false);
            if !admitted_before && !admitted_after {
                continue;
            }
            let recomputed = recompute(query, all_present);
            channel.emit(recomputed);
        }
    }

    pub fn item_stream_count(&self) -> usize {
        self.item_streams.lock().expect("item_streams lock poisoned").len()
    }

    pub fn query_stream_count(&self) -> usize {
        self.query_streams.lock().expect("query_streams lock poisoned").len()
    }

    /// Drop every channel this index owns. Each channel's `watch::Sender`
    /// goes with it, which closes every outstanding `Receiver` (their next
    /// `changed()` resolves to the closed error) — the terminal signal
    /// `dispose()` needs so every outstanding subscriber unblocks on close.
    pub fn close_all(&self) {
        self.item_streams.lock().expect("item_streams lock poisoned").clear();
        self.query_streams.lock().expect("query_streams lock poisoned").clear();
    }
}

fn recompute<T: Entity>(query: &Query, all_present: &[T]) -> Vec<T> {
    let as_json: Vec<Value> = all_present
        .iter()
        .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
        .collect();
    query_eval::select(query, &as_json)
        .into_iter()
        .map(|i| all_present[i].clone())
        .collect()
}
