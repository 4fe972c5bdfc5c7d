//! Error types used by the keeper runtime, the lifecycle machines, and the
//! actuator bridges.
//!
//! This module defines one error enum per failure class:
//!
//! - [`AdmissionError`]: a submission was refused before any state changed.
//! - [`TransitionError`]: a lifecycle method was called from the wrong state.
//! - [`WorkError`]: the embedder's work itself failed; drives the retry policy.
//! - [`ActuatorError`]: the outcome of a blocking wait over an async submission.
//!
//! All types provide `as_label()` for logs/metrics; [`WorkError`] additionally
//! provides [`WorkError::is_retryable`].

use std::time::Duration;
use thiserror::Error;

use crate::mono::MonoStatus;

/// # Errors refusing a submission.
///
/// Returned synchronously by `Keeper::add_mono`, `Keeper::check` and the
/// group equivalents. When one of these is returned, nothing was mutated:
/// no flux was created and the mono/group was not enqueued.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The keeper has not finished startup recovery (or was never started).
    #[error("keeper is not running")]
    NotRunning,

    /// The keeper is shutting down and no longer accepts work.
    #[error("keeper is stopping")]
    Stopping,

    /// The key's flux has exceeded its maximum number of monos.
    #[error("flux '{code}' has exceeded maximum number of monos ({limit})")]
    QueueFull {
        /// The serialization key whose queue is full.
        code: String,
        /// The configured per-key capacity.
        limit: usize,
    },

    /// A mono with the same id is already registered in the key's flux.
    #[error("mono '{mono_id}' is already queued")]
    Duplicate {
        /// The offending mono id.
        mono_id: String,
    },

    /// The mono or group was not in READY state when pushed.
    #[error("'{id}' is not ready for submission")]
    NotReady {
        /// The offending mono or group id.
        id: String,
    },

    /// Another non-terminal group already occupies this key.
    #[error("group key '{code}' is busy")]
    KeyBusy {
        /// The occupied serialization key.
        code: String,
    },

    /// The dispatch channel is closed (the worker pool has retired).
    #[error("dispatch channel closed")]
    Closed,
}

impl AdmissionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AdmissionError::NotRunning => "admission_not_running",
            AdmissionError::Stopping => "admission_stopping",
            AdmissionError::QueueFull { .. } => "admission_queue_full",
            AdmissionError::Duplicate { .. } => "admission_duplicate",
            AdmissionError::NotReady { .. } => "admission_not_ready",
            AdmissionError::KeyBusy { .. } => "admission_key_busy",
            AdmissionError::Closed => "admission_closed",
        }
    }
}

/// # Errors produced by lifecycle transitions.
///
/// Surfaced to the caller of the transition method; callers usually convert
/// these into a `failed()` transition (which is legal from any state).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The requested edge does not exist in the state machine.
    #[error("illegal transition: {from} -> {to}")]
    Illegal {
        /// Current state at the time of the call.
        from: MonoStatus,
        /// Requested target state.
        to: MonoStatus,
    },

    /// The retry budget is spent; the caller must transition to FAILED instead.
    #[error("retries exhausted after {times} attempts")]
    RetriesExhausted {
        /// Number of attempts already started.
        times: u32,
    },
}

impl TransitionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransitionError::Illegal { .. } => "transition_illegal",
            TransitionError::RetriesExhausted { .. } => "transition_retries_exhausted",
        }
    }
}

/// # Errors produced by the embedder's work.
///
/// Returned from [`Work::run`](crate::Work::run). A retryable error drives
/// the retry policy; a fatal error fails the mono immediately regardless of
/// remaining budget.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum WorkError {
    /// Execution failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable fatal error (never retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl WorkError {
    /// Shorthand for a retryable failure.
    pub fn fail(error: impl Into<String>) -> Self {
        WorkError::Fail { error: error.into() }
    }

    /// Shorthand for a fatal, non-retryable failure.
    pub fn fatal(error: impl Into<String>) -> Self {
        WorkError::Fatal { error: error.into() }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkError::Fail { .. } => "work_failed",
            WorkError::Fatal { .. } => "work_fatal",
        }
    }

    /// Indicates whether the error is safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkError::Fail { .. })
    }
}

/// # Errors produced by a store collaborator.
///
/// Persistence is best-effort: the runtime reports these on the event bus
/// and carries on; they never fail the transition that triggered them.
#[derive(Error, Debug, Clone)]
#[error("store operation failed: {0}")]
pub struct StoreError(pub String);

/// # Outcomes of a blocking actuator wait.
///
/// A `Timeout` abandons only the wait; the underlying mono keeps running to
/// completion independently.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ActuatorError {
    /// The wait deadline elapsed before the work resolved.
    #[error("wait timed out after {wait:?}")]
    Timeout {
        /// The configured wait duration.
        wait: Duration,
    },

    /// The keeper refused the submission; nothing was enqueued.
    #[error("submission rejected: {0}")]
    Rejected(#[from] AdmissionError),

    /// The work reached FAILED.
    #[error("execution failed: {reason}")]
    Failed {
        /// The failure reason recorded on the mono/group.
        reason: String,
    },

    /// The work was revoked before it could run.
    #[error("execution revoked")]
    Revoked,

    /// A batch resolved with at least one failed member.
    #[error("{failed} of {total} monos failed")]
    Partial {
        /// Number of failed members.
        failed: usize,
        /// Batch size.
        total: usize,
    },

    /// The result channel was dropped before resolving.
    #[error("result channel closed")]
    Closed,
}

impl ActuatorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActuatorError::Timeout { .. } => "actuator_timeout",
            ActuatorError::Rejected(_) => "actuator_rejected",
            ActuatorError::Failed { .. } => "actuator_failed",
            ActuatorError::Revoked => "actuator_revoked",
            ActuatorError::Partial { .. } => "actuator_partial",
            ActuatorError::Closed => "actuator_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_error_retryability() {
        assert!(WorkError::fail("boom").is_retryable());
        assert!(!WorkError::fatal("nope").is_retryable());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(AdmissionError::NotRunning.as_label(), "admission_not_running");
        assert_eq!(
            TransitionError::RetriesExhausted { times: 3 }.as_label(),
            "transition_retries_exhausted"
        );
        assert_eq!(
            ActuatorError::Timeout { wait: Duration::from_secs(1) }.as_label(),
            "actuator_timeout"
        );
    }
}
