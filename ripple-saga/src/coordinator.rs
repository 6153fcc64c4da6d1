//! Executes an ordered list of `SagaStep`s with forward-then-compensate
//! semantics, broadcasting a `SagaEvent` at every phase transition.

use std::sync::Arc;
use std::time::Duration;

use ripple_core::{MetricsReporter, NullReporter, RippleError, SagaError};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{SagaEvent, SagaEventKind};
use crate::step::SagaStep;

/// The result of a saga's execution.
#[derive(Debug, Clone)]
pub enum SagaOutcome {
    /// Every step's forward action succeeded, in declaration order.
    Success { saga_id: Uuid, results: Vec<Value> },
    /// A step failed and every attempted compensation succeeded.
    Failure {
        saga_id: Uuid,
        error: String,
        failed_step: String,
        compensated: Vec<String>,
    },
    /// A step failed and at least one compensation itself failed; the saga
    /// is left in a state requiring manual reconciliation.
    PartialFailure {
        saga_id: Uuid,
        error: String,
        failed_step: String,
        compensation_errors: Vec<String>,
    },
}

impl SagaOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SagaOutcome::Success { .. })
    }
}

/// Coordinates execution of an ordered sequence of steps, broadcasting
/// lifecycle events to any subscriber.
pub struct SagaCoordinator {
    steps: Vec<SagaStep>,
    overall_timeout: Option<Duration>,
    events_tx: broadcast::Sender<SagaEvent>,
    metrics: Arc<dyn MetricsReporter>,
}

impl Default for SagaCoordinator {
    fn default() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            steps: Vec::new(),
            overall_timeout: None,
            events_tx,
            metrics: Arc::new(NullReporter),
        }
    }
}

impl SagaCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsReporter>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    pub fn add_step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Subscribe to this saga's lifecycle events. Must be called before
    /// `execute` to observe events from the very start, since this is a
    /// `broadcast` channel with no replay.
    pub fn subscribe(&self) -> broadcast::Receiver<SagaEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: SagaEvent) {
        // A saga with no subscribers is a legitimate, common case; ignore
        // the send error rather than treating it as a failure.
        let _ = self.events_tx.send(event);
    }

    pub async fn execute(&self) -> SagaOutcome {
        let saga_id = Uuid::now_v7();
        let total = self.steps.len();
        info!(%saga_id, total, "saga started");
        self.emit(SagaEvent::new(SagaEventKind::SagaStarted, saga_id).with_total(total));

        let deadline = self.overall_timeout.map(|d| Instant::now() + d);
        let mut completed: Vec<(String, Value)> = Vec::with_capacity(total);

        for (index, step) in self.steps.iter().enumerate() {
            self.emit(SagaEvent::new(SagaEventKind::StepStarted, saga_id).with_step(&step.name, index, total));
            let step_start = Instant::now();

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let err = RippleError::Saga(SagaError::SagaTimedOut {
                        timeout_ms: self.overall_timeout.unwrap().as_millis() as u64,
                    });
                    return self
                        .fail(saga_id, total, &step.name, index, step_start, &completed, err)
                        .await;
                }
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let effective_timeout = match (step.step_timeout, remaining) {
                (Some(t), Some(r)) => Some(t.min(r)),
                (Some(t), None) => Some(t),
                (None, Some(r)) => Some(r),
                (None, None) => None,
            };

            let outcome = match effective_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, (step.forward)()).await {
                    Ok(result) => result,
                    Err(_) => Err(RippleError::Saga(SagaError::StepTimedOut {
                        step: step.name.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    })),
                },
                None => (step.forward)().await,
            };

            match outcome {
                Ok(result) => {
                    self.metrics.record_duration("saga.step_duration", step_start.elapsed());
                    self.emit(
                        SagaEvent::new(SagaEventKind::StepCompleted, saga_id)
                            .with_step(&step.name, index, total)
                            .with_duration(step_start.elapsed()),
                    );
                    completed.push((step.name.clone(), result));
                }
                Err(err) => {
                    return self
                        .fail(saga_id, total, &step.name, index, step_start, &completed, err)
                        .await;
                }
            }
        }

        self.metrics.record_counter("saga.succeeded", 1);
        self.emit(SagaEvent::new(SagaEventKind::SagaCompleted, saga_id).with_total(total));
        SagaOutcome::Success {
            saga_id,
            results: completed.into_iter().map(|(_, r)| r).collect(),
        }
    }

    async fn fail(
        &self,
        saga_id: Uuid,
        total: usize,
        failed_step: &str,
        failed_index: usize,
        step_start: Instant,
        completed: &[(String, Value)],
        err: RippleError,
    ) -> SagaOutcome {
        warn!(%saga_id, step = failed_step, %err, "saga step failed, compensating");
        self.emit(
            SagaEvent::new(SagaEventKind::StepFailed, saga_id)
                .with_step(failed_step, failed_index, total)
                .with_duration(step_start.elapsed())
                .with_error(err.to_string()),
        );

        let compensation_errors = self.compensate(saga_id, completed).await;
        self.metrics.record_counter("saga.failed", 1);
        self.emit(
            SagaEvent::new(SagaEventKind::SagaFailed, saga_id)
                .with_total(total)
                .with_error(err.to_string()),
        );

        if compensation_errors.is_empty() {
            SagaOutcome::Failure {
                saga_id,
                error: err.to_string(),
                failed_step: failed_step.to_string(),
                compensated: completed.iter().map(|(name, _)| name.clone()).collect(),
            }
        } else {
            SagaOutcome::PartialFailure {
                saga_id,
                error: err.to_string(),
                failed_step: failed_step.to_string(),
                compensation_errors,
            }
        }
    }

    /// Run compensations for `completed` steps in strict reverse order,
    /// continuing past individual compensation failures so every completed
    /// step gets an attempt.
    async fn compensate(&self, saga_id: Uuid, completed: &[(String, Value)]) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, result) in completed.iter().rev() {
            let step = self
                .steps
                .iter()
                .find(|s| &s.name == name)
                .expect("a completed step must still be in the step list");

            self.emit(SagaEvent::new(SagaEventKind::CompensationStarted, saga_id).with_step(name, 0, 0));
            match (step.compensation)(result.clone()).await {
                Ok(()) => {
                    self.emit(SagaEvent::new(SagaEventKind::CompensationCompleted, saga_id).with_step(name, 0, 0));
                }
                Err(err) => {
                    warn!(%saga_id, step = %name, %err, "compensation failed");
                    self.emit(
                        SagaEvent::new(SagaEventKind::CompensationFailed, saga_id)
                            .with_step(name, 0, 0)
                            .with_error(err.to_string()),
                    );
                    errors.push(format!("{name}: {err}"));
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{OpContext, StorageError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[tokio::test]
    async fn all_steps_succeeding_yields_success_in_order() {
        let coordinator = SagaCoordinator::new()
            .add_step(SagaStep::new(
                "reserve",
                || Box::pin(async { Ok::<_, RippleError>(1u32) }),
                |_: u32| Box::pin(async { Ok(()) }),
            ))
            .add_step(SagaStep::new(
                "charge",
                || Box::pin(async { Ok::<_, RippleError>(2u32) }),
                |_: u32| Box::pin(async { Ok(()) }),
            ));

        let outcome = coordinator.execute().await;
        match outcome {
            SagaOutcome::Success { results, .. } => {
                assert_eq!(results, vec![Value::from(1), Value::from(2)]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_compensates_completed_steps_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_a = order.clone();
        let order_b = order.clone();

        let coordinator = SagaCoordinator::new()
            .add_step(SagaStep::new(
                "a",
                || Box::pin(async { Ok::<_, RippleError>(()) }),
                move |_: ()| {
                    let order = order_a.clone();
                    Box::pin(async move {
                        order.lock().unwrap().push("a");
                        Ok(())
                    })
                },
            ))
            .add_step(SagaStep::new(
                "b",
                || Box::pin(async { Ok::<_, RippleError>(()) }),
                move |_: ()| {
                    let order = order_b.clone();
                    Box::pin(async move {
                        order.lock().unwrap().push("b");
                        Ok(())
                    })
                },
            ))
            .add_step(SagaStep::new(
                "c-fails",
                || {
                    Box::pin(async {
                        Err::<(), _>(RippleError::Storage(StorageError::Network {
                            context: OpContext::new("c"),
                            reason: "down".into(),
                        }))
                    })
                },
                |_: ()| Box::pin(async { Ok(()) }),
            ));

        let outcome = coordinator.execute().await;
        match outcome {
            SagaOutcome::Failure {
                failed_step,
                compensated,
                ..
            } => {
                assert_eq!(failed_step, "c-fails");
                assert_eq!(compensated, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(*order.lock().unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn compensation_failure_surfaces_as_partial_failure() {
        let coordinator = SagaCoordinator::new()
            .add_step(SagaStep::new(
                "a",
                || Box::pin(async { Ok::<_, RippleError>(()) }),
                |_: ()| {
                    Box::pin(async {
                        Err(RippleError::Saga(SagaError::CompensationFailed {
                            step: "a".into(),
                            reason: "rollback unavailable".into(),
                        }))
                    })
                },
            ))
            .add_step(SagaStep::new(
                "b-fails",
                || {
                    Box::pin(async {
                        Err::<(), _>(RippleError::Storage(StorageError::Timeout {
                            context: OpContext::new("b"),
                        }))
                    })
                },
                |_: ()| Box::pin(async { Ok(()) }),
            ));

        let outcome = coordinator.execute().await;
        assert!(matches!(outcome, SagaOutcome::PartialFailure { .. }));
    }

    #[tokio::test]
    async fn step_timeout_triggers_compensation() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_comp = attempts.clone();

        let coordinator = SagaCoordinator::new().add_step(
            SagaStep::new(
                "slow",
                || {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, RippleError>(())
                    })
                },
                move |_: ()| {
                    attempts_comp.fetch_add(1, Ordering::Relaxed);
                    Box::pin(async { Ok(()) })
                },
            )
            .with_timeout(Duration::from_millis(5)),
        );

        let outcome = coordinator.execute().await;
        assert!(matches!(outcome, SagaOutcome::Failure { .. }));
        assert_eq!(attempts.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_the_full_event_sequence() {
        let coordinator = SagaCoordinator::new().add_step(SagaStep::new(
            "only",
            || Box::pin(async { Ok::<_, RippleError>(()) }),
            |_: ()| Box::pin(async { Ok(()) }),
        ));
        let mut events = coordinator.subscribe();

        coordinator.execute().await;

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.event);
        }
        assert_eq!(
            kinds,
            vec![
                SagaEventKind::SagaStarted,
                SagaEventKind::StepStarted,
                SagaEventKind::StepCompleted,
                SagaEventKind::SagaCompleted,
            ]
        );
    }
}
