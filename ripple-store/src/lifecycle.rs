//! The store's lifecycle states: a runtime-checked enum rather than a
//! compile-time typestate, since `StoreHandle` is constructed once and
//! shared behind an `Arc` — a typestate wouldn't compose with that.

use std::sync::atomic::{AtomicU8, Ordering};

use ripple_core::{LifecycleError, RippleError, RippleResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    Initializing = 1,
    Ready = 2,
    Disposing = 3,
    Disposed = 4,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Disposing,
            _ => Self::Disposed,
        }
    }
}

/// An atomic cell holding a `LifecycleState`, with a `require_ready` guard
/// every facade operation calls before touching the cache or backend.
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Created as u8),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Every operation but `initialize`/`dispose` calls this first.
    pub fn require_ready(&self, op: &'static str) -> RippleResult<()> {
        if self.get() == LifecycleState::Ready {
            Ok(())
        } else {
            Err(RippleError::Lifecycle(LifecycleError::NotReady { reason: op }))
        }
    }
}
