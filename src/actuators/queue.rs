//! # QueueActuator: batch submission with an aggregated outcome.
//!
//! Submits a batch of monos (fanned across their keys) and awaits until
//! every member has settled, then reports per-member results in one
//! [`QueueOutcome`].
//!
//! Admission rejections count as failures for the rejected member; accepted
//! members keep executing and settle through their hooks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time;

use crate::error::ActuatorError;
use crate::hooks::MonoHooks;
use crate::keeper::Keeper;
use crate::mono::{Mono, MonoRef};

/// Aggregated result of a batch submission.
#[derive(Debug)]
pub struct QueueOutcome {
    success: usize,
    failed: usize,
    /// Per-mono results: `None` means success, `Some(reason)` means failure.
    pub results: HashMap<String, Option<String>>,
}

impl QueueOutcome {
    /// Number of members that completed.
    pub fn success(&self) -> usize {
        self.success
    }

    /// Number of members that failed, were revoked, or were rejected.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// `Some(Partial)` if any member failed, `None` when the batch is clean.
    pub fn error(&self) -> Option<ActuatorError> {
        if self.failed == 0 {
            None
        } else {
            Some(ActuatorError::Partial {
                failed: self.failed,
                total: self.success + self.failed,
            })
        }
    }
}

/// Submits batches of monos and awaits their collective settlement.
pub struct QueueActuator {
    keeper: Arc<Keeper>,
    wait: Duration,
}

impl QueueActuator {
    /// Creates a queue actuator. The wait defaults to the keeper's
    /// configured `task_wait` and covers the whole batch.
    pub fn new(keeper: Arc<Keeper>) -> Self {
        let wait = keeper.config().task_wait;
        Self { keeper, wait }
    }

    /// Overrides the wait deadline for the whole batch.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Submits every mono and awaits until all have settled.
    ///
    /// The deadline covers the batch as a whole; if it elapses before every
    /// member settles, [`ActuatorError::Timeout`] is returned and unsettled
    /// members keep executing.
    pub async fn exec(&self, monos: Vec<MonoRef>) -> Result<QueueOutcome, ActuatorError> {
        if monos.is_empty() {
            return Ok(QueueOutcome {
                success: 0,
                failed: 0,
                results: HashMap::new(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let hook = Arc::new(AggregateHook {
            total: monos.len(),
            state: Mutex::new(AggState {
                success: 0,
                failed: 0,
                results: HashMap::new(),
                tx: Some(tx),
            }),
        });

        for mono in &monos {
            mono.set_hooks(Arc::clone(&hook) as Arc<dyn MonoHooks>);
        }

        for mono in monos {
            let id = mono.id().to_string();
            if let Err(e) = self.keeper.add_mono(Arc::clone(&mono)).await {
                // rejected at the gate; the hook will never fire for it
                hook.record(&id, Some(e.to_string()));
            }
        }

        match time::timeout(self.wait, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(ActuatorError::Closed),
            Err(_) => Err(ActuatorError::Timeout { wait: self.wait }),
        }
    }
}

struct AggState {
    success: usize,
    failed: usize,
    results: HashMap<String, Option<String>>,
    tx: Option<oneshot::Sender<QueueOutcome>>,
}

/// Shared hooks implementation counting settlements across the batch.
struct AggregateHook {
    total: usize,
    state: Mutex<AggState>,
}

impl AggregateHook {
    /// Records one member's settlement; idempotent per mono id.
    fn record(&self, id: &str, failure: Option<String>) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if st.results.contains_key(id) {
            return;
        }
        match &failure {
            None => st.success += 1,
            Some(_) => st.failed += 1,
        }
        st.results.insert(id.to_string(), failure);

        if st.success + st.failed == self.total {
            if let Some(tx) = st.tx.take() {
                let _ = tx.send(QueueOutcome {
                    success: st.success,
                    failed: st.failed,
                    results: std::mem::take(&mut st.results),
                });
            }
        }
    }
}

#[async_trait]
impl MonoHooks for AggregateHook {
    async fn on_complete(&self, mono: &Mono) {
        self.record(mono.id(), None);
    }

    async fn on_failed(&self, mono: &Mono) {
        let reason = mono.reason().unwrap_or_else(|| "unknown".to_string());
        self.record(mono.id(), Some(reason));
    }

    async fn on_revoke(&self, mono: &Mono) {
        self.record(mono.id(), Some("revoked".to_string()));
    }
}
