//! Group variant of the actuator: submit a whole group, await its terminal
//! state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time;

use crate::error::ActuatorError;
use crate::hooks::GroupHooks;
use crate::keeper::GroupKeeper;
use crate::mono::{Group, GroupRef};

/// Submits groups through a [`GroupKeeper`] and awaits their terminal state.
///
/// Same contract as [`Actuator`](crate::Actuator): a wait timeout abandons
/// the wait, never the group.
pub struct GroupActuator {
    keeper: Arc<GroupKeeper>,
    wait: Duration,
}

impl GroupActuator {
    /// Creates a group actuator. The wait defaults to the keeper's
    /// configured `task_wait`.
    pub fn new(keeper: Arc<GroupKeeper>) -> Self {
        let wait = keeper.config().task_wait;
        Self { keeper, wait }
    }

    /// Overrides the wait deadline.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Submits `group` and awaits COMPLETE or FAILED.
    pub async fn exec(&self, group: GroupRef) -> Result<(), ActuatorError> {
        let (tx, rx) = oneshot::channel();
        group.set_hooks(Arc::new(GroupResultHook {
            tx: Mutex::new(Some(tx)),
        }));

        self.keeper.add_group(Arc::clone(&group)).await?;

        match time::timeout(self.wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActuatorError::Closed),
            Err(_) => Err(ActuatorError::Timeout { wait: self.wait }),
        }
    }
}

struct GroupResultHook {
    tx: Mutex<Option<oneshot::Sender<Result<(), ActuatorError>>>>,
}

impl GroupResultHook {
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
impl GroupHooks for GroupResultHook {
    async fn on_complete(&self, _group: &Group) {
        self.resolve(Ok(()));
    }

    async fn on_failed(&self, group: &Group) {
        self.resolve(Err(ActuatorError::Failed {
            reason: group.reason().unwrap_or_else(|| "unknown".to_string()),
        }));
    }
}
