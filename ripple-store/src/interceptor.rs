//! The interceptor chain: an ordered list of hooks wrapping every facade
//! operation. Declaration order on the way in, reverse order on the way
//! back.
//!
//! The chain is shared across entity types, so inputs and short-circuit
//! responses cross the trait boundary as `serde_json::Value` rather than a
//! generic `T` — the facade is responsible for decoding a short-circuit
//! value back into `T`/`Vec<T>` for the operation it's running.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ripple_core::{RippleError, RippleResult};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Get,
    GetAll,
    Watch,
    WatchAll,
    Save,
    SaveAll,
    Delete,
    DeleteAll,
    Sync,
    Invalidate,
    InvalidateAll,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Get => "get",
            OpKind::GetAll => "get_all",
            OpKind::Watch => "watch",
            OpKind::WatchAll => "watch_all",
            OpKind::Save => "save",
            OpKind::SaveAll => "save_all",
            OpKind::Delete => "delete",
            OpKind::DeleteAll => "delete_all",
            OpKind::Sync => "sync",
            OpKind::Invalidate => "invalidate",
            OpKind::InvalidateAll => "invalidate_all",
        }
    }
}

/// The mutable context bag an interceptor sees and may rewrite. `input` is
/// a JSON view of the operation's argument (an id, a query, an item, a
/// batch); `attributes` is free-form state interceptors may use to pass
/// data to themselves across the before/after/on_error hooks of a single
/// call.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub kind: OpKind,
    pub entity_type: &'static str,
    pub input: Value,
    pub attributes: HashMap<String, Value>,
}

impl OpContext {
    pub fn new(kind: OpKind, entity_type: &'static str, input: Value) -> Self {
        Self {
            kind,
            entity_type,
            input,
            attributes: HashMap::new(),
        }
    }
}

/// What `before` decided: either let the operation run, or supply a
/// response directly (a cached value, an injected test fixture) and skip
/// the underlying engine call entirely.
pub enum InterceptorOutcome {
    Continue,
    ShortCircuit(Value),
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn before(&self, ctx: &mut OpContext) -> RippleResult<InterceptorOutcome> {
        let _ = ctx;
        Ok(InterceptorOutcome::Continue)
    }

    async fn after(&self, ctx: &mut OpContext, result: &Value) -> RippleResult<()> {
        let _ = (ctx, result);
        Ok(())
    }

    async fn on_error(&self, ctx: &mut OpContext, error: &RippleError) -> RippleResult<()> {
        let _ = (ctx, error);
        Ok(())
    }
}

/// An ordered list of interceptors. Forward order for `before` (the first
/// interceptor to short-circuit wins); reverse order for `after`/
/// `on_error` so the interceptor that saw the request last sees the
/// response first, like unwinding a call stack.
#[derive(Default, Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs `before` in declaration order. Returns `Some(value)` as soon as
    /// an interceptor short-circuits; the remaining interceptors in the
    /// chain do not see the call at all.
    pub async fn run_before(&self, ctx: &mut OpContext) -> RippleResult<Option<Value>> {
        for interceptor in &self.interceptors {
            match interceptor.before(ctx).await? {
                InterceptorOutcome::Continue => {}
                InterceptorOutcome::ShortCircuit(value) => return Ok(Some(value)),
            }
        }
        Ok(None)
    }

    pub async fn run_after(&self, ctx: &mut OpContext, result: &Value) -> RippleResult<()> {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after(ctx, result).await?;
        }
        Ok(())
    }

    pub async fn run_on_error(&self, ctx: &mut OpContext, error: &RippleError) {
        for interceptor in self.interceptors.iter().rev() {
            if let Err(hook_err) = interceptor.on_error(ctx, error).await {
                tracing::warn!(
                    interceptor = interceptor.name(),
                    error = %hook_err,
                    "on_error hook itself failed, ignoring"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Interceptor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn before(&self, _ctx: &mut OpContext) -> RippleResult<InterceptorOutcome> {
            self.order.lock().unwrap().push(self.name);
            Ok(InterceptorOutcome::Continue)
        }

        async fn after(&self, _ctx: &mut OpContext, _result: &Value) -> RippleResult<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct ShortCircuiter {
        value: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Interceptor for ShortCircuiter {
        fn name(&self) -> &'static str {
            "short-circuiter"
        }

        async fn before(&self, _ctx: &mut OpContext) -> RippleResult<InterceptorOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(InterceptorOutcome::ShortCircuit(self.value.clone()))
        }
    }

    #[tokio::test]
    async fn before_runs_forward_and_after_runs_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .push(Arc::new(Recorder {
                name: "a",
                order: order.clone(),
            }))
            .push(Arc::new(Recorder {
                name: "b",
                order: order.clone(),
            }));

        let mut ctx = OpContext::new(OpKind::Get, "widget", Value::Null);
        chain.run_before(&mut ctx).await.unwrap();
        chain.run_after(&mut ctx, &Value::Null).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "b", "a"]);
    }

    #[tokio::test]
    async fn short_circuit_stops_the_chain() {
        let later = Arc::new(ShortCircuiter {
            value: serde_json::json!({"cached": true}),
            calls: AtomicUsize::new(0),
        });
        let chain = InterceptorChain::new().push(later.clone()).push(later.clone());

        let mut ctx = OpContext::new(OpKind::Get, "widget", Value::Null);
        let outcome = chain.run_before(&mut ctx).await.unwrap();

        assert_eq!(outcome, Some(serde_json::json!({"cached": true})));
        assert_eq!(later.calls.load(Ordering::SeqCst), 1);
    }
}
