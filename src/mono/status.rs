//! # Lifecycle states for monos and groups.
//!
//! [`MonoStatus`] is the full eight-state machine; [`GroupStatus`] is the
//! simpler five-state variant (groups do not retry, revoke, or time out on
//! their own).
//!
//! Legal edges are enforced by the transition methods on
//! [`Mono`](crate::Mono) and [`Group`](crate::Group), not here; this module
//! only classifies states.

use std::fmt;

use serde::Serialize;

/// State of a single mono.
///
/// Terminal states: `Complete`, `Failed`, `Revoke`, `Timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonoStatus {
    /// Constructed or reset; eligible for submission.
    Ready,
    /// Admitted to a flux, waiting for its serialization slot.
    Pending,
    /// First attempt in flight.
    Executing,
    /// A failed attempt was rescheduled; another attempt is in flight or due.
    Retrying,
    /// Finished successfully.
    Complete,
    /// Failed terminally (work error, exhausted budget, or explicit call).
    Failed,
    /// Terminated without running (cancellation or crash recovery).
    Revoke,
    /// Marked timed-out by a caller that stopped waiting.
    Timeout,
}

impl MonoStatus {
    /// True once no further transition except `failed()` is meaningful.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonoStatus::Complete | MonoStatus::Failed | MonoStatus::Revoke | MonoStatus::Timeout
        )
    }

    /// True while the mono is owned by a flux (admitted but not terminal).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MonoStatus::Pending | MonoStatus::Executing | MonoStatus::Retrying
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            MonoStatus::Ready => "ready",
            MonoStatus::Pending => "pending",
            MonoStatus::Executing => "executing",
            MonoStatus::Retrying => "retrying",
            MonoStatus::Complete => "complete",
            MonoStatus::Failed => "failed",
            MonoStatus::Revoke => "revoke",
            MonoStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for MonoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// State of a group.
///
/// Terminal states: `Complete`, `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Constructed or reset; eligible for submission.
    Ready,
    /// Admitted to the group keeper, waiting for a worker.
    Pending,
    /// The group's work is in flight.
    Executing,
    /// Finished successfully.
    Complete,
    /// Failed terminally.
    Failed,
}

impl GroupStatus {
    /// True once the group reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupStatus::Complete | GroupStatus::Failed)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GroupStatus::Ready => "ready",
            GroupStatus::Pending => "pending",
            GroupStatus::Executing => "executing",
            GroupStatus::Complete => "complete",
            GroupStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
