//! # Actuator: synchronous-style waiting over asynchronous execution.
//!
//! An [`Actuator`] submits a mono through a [`Keeper`] and blocks the caller
//! (async-blocks, via `await`) until the mono reaches a terminal state or a
//! wait deadline elapses.
//!
//! ## How it works
//! ```text
//! exec(mono)
//!    │ set_hooks(ResultHook{ oneshot::Sender })
//!    │ keeper.add_mono(mono) ──► flux ──► worker ──► terminal transition
//!    │                                                   │
//!    └── timeout(wait, oneshot::Receiver) ◄── hook fires ┘
//! ```
//!
//! ## Rules
//! - A wait timeout abandons the *wait only*: the mono keeps executing and
//!   will settle on its own. Callers who want the item marked should call
//!   [`Mono::timeout`](crate::Mono::timeout) themselves.
//! - Admission failures surface as [`ActuatorError::Rejected`] with nothing
//!   enqueued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time;

use crate::error::ActuatorError;
use crate::hooks::MonoHooks;
use crate::keeper::Keeper;
use crate::mono::{Mono, MonoRef};

/// Submits monos and awaits their terminal state.
pub struct Actuator {
    keeper: Arc<Keeper>,
    wait: Duration,
}

impl Actuator {
    /// Creates an actuator over the given keeper. The wait defaults to the
    /// keeper's configured `task_wait`.
    pub fn new(keeper: Arc<Keeper>) -> Self {
        let wait = keeper.config().task_wait;
        Self { keeper, wait }
    }

    /// Overrides the wait deadline.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Submits `mono` and awaits its terminal transition.
    ///
    /// Resolution:
    /// - COMPLETE → `Ok(())`
    /// - FAILED → [`ActuatorError::Failed`] with the recorded reason
    /// - REVOKED → [`ActuatorError::Revoked`]
    /// - deadline elapsed → [`ActuatorError::Timeout`] (mono keeps running)
    pub async fn exec(&self, mono: MonoRef) -> Result<(), ActuatorError> {
        let (tx, rx) = oneshot::channel();
        mono.set_hooks(Arc::new(ResultHook {
            tx: Mutex::new(Some(tx)),
        }));

        self.keeper.add_mono(Arc::clone(&mono)).await?;

        match time::timeout(self.wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActuatorError::Closed),
            Err(_) => Err(ActuatorError::Timeout { wait: self.wait }),
        }
    }
}

/// One-shot hooks implementation resolving the actuator's wait.
struct ResultHook {
    tx: Mutex<Option<oneshot::Sender<Result<(), ActuatorError>>>>,
}

impl ResultHook {
    fn resolve(&self, result: Result<(), ActuatorError>) {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(result);
        }
    }
}

#[async_trait]
impl MonoHooks for ResultHook {
    async fn on_complete(&self, _mono: &Mono) {
        self.resolve(Ok(()));
    }

    async fn on_failed(&self, mono: &Mono) {
        self.resolve(Err(ActuatorError::Failed {
            reason: mono.reason().unwrap_or_else(|| "unknown".to_string()),
        }));
    }

    async fn on_revoke(&self, _mono: &Mono) {
        self.resolve(Err(ActuatorError::Revoked));
    }
}
