//! # Runtime events emitted by keepers, fluxes, and lifecycle transitions.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Mono lifecycle**: every state-machine edge a mono takes.
//! - **Group lifecycle**: the simpler group state-machine edges.
//! - **Flux/keeper lifecycle**: queue creation/close, workers, recovery, shutdown.
//! - **Degradation**: best-effort collaborators failing (store, hooks, subscribers).
//!
//! The [`Event`] struct carries optional metadata such as the mono id, the
//! serialization key, attempt counts, and failure reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Mono lifecycle ===
    /// Mono was admitted to a flux.
    MonoPending,
    /// Mono began an execution attempt.
    MonoExecuting,
    /// Mono failed an attempt and was scheduled for another.
    MonoRetrying,
    /// Mono finished successfully.
    MonoComplete,
    /// Mono reached FAILED (work error, exhausted budget, or explicit call).
    MonoFailed,
    /// Mono was revoked (cancellation or crash recovery).
    MonoRevoked,
    /// Mono was marked TIMEOUT by a caller.
    MonoTimeout,

    // === Group lifecycle ===
    /// Group was admitted to the group keeper.
    GroupPending,
    /// Group began executing.
    GroupExecuting,
    /// Group finished successfully.
    GroupComplete,
    /// Group reached FAILED.
    GroupFailed,

    // === Flux / keeper lifecycle ===
    /// A flux was created for a previously-unseen key.
    FluxOpened,
    /// A flux idled out and deregistered itself.
    FluxClosed,
    /// A mono caught in the idle-close window was resubmitted.
    FluxResubmitted,
    /// A worker task started.
    WorkerStarted,
    /// A worker task consumed a retire sentinel and exited.
    WorkerRetired,
    /// The startup recovery sweep began.
    RecoveryStarted,
    /// The startup recovery sweep finished; the keeper is RUNNING.
    RecoveryFinished,
    /// Shutdown was requested; admission is refused from now on.
    ShutdownRequested,
    /// The last worker exited; the keeper is STOPPED.
    AllWorkersRetired,

    // === Degradation (best-effort collaborators) ===
    /// A store update/delete failed; the in-memory transition stands.
    StoreDegraded,
    /// A lifecycle hook panicked; the panic was caught and isolated.
    HookPanicked,
    /// The recovery sweep could not fetch uncompleted work.
    RecoveryDegraded,
    /// A subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,
    /// A subscriber panicked during event processing.
    SubscriberPanicked,
}

impl EventKind {
    /// Static label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::MonoPending => "mono_pending",
            EventKind::MonoExecuting => "mono_executing",
            EventKind::MonoRetrying => "mono_retrying",
            EventKind::MonoComplete => "mono_complete",
            EventKind::MonoFailed => "mono_failed",
            EventKind::MonoRevoked => "mono_revoked",
            EventKind::MonoTimeout => "mono_timeout",
            EventKind::GroupPending => "group_pending",
            EventKind::GroupExecuting => "group_executing",
            EventKind::GroupComplete => "group_complete",
            EventKind::GroupFailed => "group_failed",
            EventKind::FluxOpened => "flux_opened",
            EventKind::FluxClosed => "flux_closed",
            EventKind::FluxResubmitted => "flux_resubmitted",
            EventKind::WorkerStarted => "worker_started",
            EventKind::WorkerRetired => "worker_retired",
            EventKind::RecoveryStarted => "recovery_started",
            EventKind::RecoveryFinished => "recovery_finished",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::AllWorkersRetired => "all_workers_retired",
            EventKind::StoreDegraded => "store_degraded",
            EventKind::HookPanicked => "hook_panicked",
            EventKind::RecoveryDegraded => "recovery_degraded",
            EventKind::SubscriberOverflow => "subscriber_overflow",
            EventKind::SubscriberPanicked => "subscriber_panicked",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Mono id, if applicable.
    pub mono: Option<Arc<str>>,
    /// Group id, if applicable.
    pub group: Option<Arc<str>>,
    /// Serialization key, if applicable.
    pub code: Option<Arc<str>>,
    /// Worker name, if applicable.
    pub worker: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Human-readable reason (errors, degradation details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            mono: None,
            group: None,
            code: None,
            worker: None,
            attempt: None,
            reason: None,
        }
    }

    /// Attaches a mono id.
    #[inline]
    pub fn with_mono(mut self, mono: impl Into<Arc<str>>) -> Self {
        self.mono = Some(mono.into());
        self
    }

    /// Attaches a group id.
    #[inline]
    pub fn with_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Attaches a serialization key.
    #[inline]
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True for events reporting subscriber-side degradation. These must not
    /// themselves trigger new overflow events, to avoid feedback loops.
    #[inline]
    pub fn is_subscriber_degradation(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::MonoPending);
        let b = Event::now(EventKind::MonoExecuting);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builder_setters_attach_metadata() {
        let ev = Event::now(EventKind::MonoFailed)
            .with_mono("m-1")
            .with_code("dev-1")
            .with_attempt(2)
            .with_reason("boom");
        assert_eq!(ev.mono.as_deref(), Some("m-1"));
        assert_eq!(ev.code.as_deref(), Some("dev-1"));
        assert_eq!(ev.attempt, Some(2));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }
}
