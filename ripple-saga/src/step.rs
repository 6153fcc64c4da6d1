//! A saga step is a forward/compensation closure pair. Results are carried
//! between the two as `serde_json::Value` rather than a step-specific
//! generic type, which lets the coordinator hold a single homogeneous step
//! list instead of needing type erasure via `dyn Any`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use ripple_core::{RippleError, RippleResult, SagaError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type ForwardFn = Box<dyn Fn() -> BoxFuture<'static, RippleResult<Value>> + Send + Sync>;
type CompensationFn = Box<dyn Fn(Value) -> BoxFuture<'static, RippleResult<()>> + Send + Sync>;

/// One step in a saga: a name, a forward action, a compensation to undo it,
/// and an optional per-step timeout.
pub struct SagaStep {
    pub name: String,
    pub step_timeout: Option<Duration>,
    pub(crate) forward: ForwardFn,
    pub(crate) compensation: CompensationFn,
}

impl SagaStep {
    /// Build a step from typed forward/compensation closures; `R` is
    /// serialized to carry the forward result into the compensation
    /// closure and across the saga's event stream.
    pub fn new<R, Fwd, FwdFut, Comp, CompFut>(name: impl Into<String>, forward: Fwd, compensation: Comp) -> Self
    where
        R: Serialize + DeserializeOwned + Send + 'static,
        Fwd: Fn() -> FwdFut + Send + Sync + 'static,
        FwdFut: Future<Output = RippleResult<R>> + Send + 'static,
        Comp: Fn(R) -> CompFut + Send + Sync + 'static,
        CompFut: Future<Output = RippleResult<()>> + Send + 'static,
    {
        let forward: ForwardFn = Box::new(move || {
            let fut = forward();
            Box::pin(async move {
                let result = fut.await?;
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            })
        });
        let compensation: CompensationFn = Box::new(move |value: Value| {
            let typed: Result<R, _> = serde_json::from_value(value);
            match typed {
                Ok(typed) => {
                    let fut = compensation(typed);
                    Box::pin(fut) as BoxFuture<'static, RippleResult<()>>
                }
                Err(e) => Box::pin(async move {
                    Err(RippleError::Saga(SagaError::CompensationFailed {
                        step: "deserialize".into(),
                        reason: e.to_string(),
                    }))
                }),
            }
        });
        Self {
            name: name.into(),
            step_timeout: None,
            forward,
            compensation,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }
}
