//! ripple-store - `StoreHandle`, the public facade wiring the fetch/write
//! policy engines, the reactive fan-out, the sync loop, and the
//! interceptor chain behind one API per entity type.

pub mod bridge;
pub mod handle;
pub mod interceptor;
pub mod lifecycle;

pub use bridge::ReactiveBridge;
pub use handle::{is_not_ready, EncryptionSettings, StoreHandle};
pub use interceptor::{Interceptor, InterceptorChain, InterceptorOutcome, OpContext, OpKind};
pub use lifecycle::{Lifecycle, LifecycleState};
