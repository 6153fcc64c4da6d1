//! ripple-storage - Backend interface, owned cache, and the fetch/write
//! policy engines that implement the store facade's read and write
//! contracts against it.

pub mod backend;
pub mod cache;
pub mod fetch;
pub mod queue;
pub mod write;

pub use backend::{Backend, BackendCapabilities};
pub use cache::CacheStore;
pub use fetch::{CacheObserver, FetchEngine};
pub use queue::PendingQueue;
pub use write::WriteEngine;
