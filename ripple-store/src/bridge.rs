//! Bridges `ripple_storage::CacheObserver` (the fetch/write engines'
//! notification hook) into `ripple_reactive::ReactiveIndex::on_mutation`,
//! without either engine depending on the reactive crate directly — the
//! same dependency-inversion shape `ripple_saga::TransactionalStore` uses
//! to let a lower layer call into a higher one.
//!
//! `CacheObserver::on_update` only carries the new value, not the value it
//! replaced, but `on_mutation` needs both to know which query channels to
//! recompute. A small shadow map tracks "what this id last notified as" so
//! the bridge can recover a `before` without re-reading the cache (which
//! would already hold the new value by notification time).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ripple_core::Entity;
use ripple_storage::{CacheObserver, CacheStore};
use ripple_reactive::ReactiveIndex;

pub struct ReactiveBridge<T: Entity> {
    reactive: Arc<ReactiveIndex<T>>,
    cache: Arc<CacheStore<T>>,
    shadow: Mutex<HashMap<T::Id, Option<T>>>,
}

impl<T: Entity> ReactiveBridge<T> {
    pub fn new(reactive: Arc<ReactiveIndex<T>>, cache: Arc<CacheStore<T>>) -> Self {
        Self {
            reactive,
            cache,
            shadow: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Entity> CacheObserver<T> for ReactiveBridge<T> {
    fn on_update(&self, id: &T::Id, value: Option<&T>) {
        let before = {
            let mut shadow = self.shadow.lock().expect("reactive bridge shadow lock poisoned");
            shadow.insert(id.clone(), value.cloned())
        }
        .flatten();
        let all_present = self.cache.present_values();
        self.reactive.on_mutation(id, before.as_ref(), value, &all_present);
    }
}
