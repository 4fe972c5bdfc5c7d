//! # Per-item lifecycle hooks.
//!
//! [`MonoHooks`] and [`GroupHooks`] are the listener seams: an embedder (or
//! an [`Actuator`](crate::Actuator), which is just a hooks implementation
//! plus a wait) registers one set of callbacks per item and is notified on
//! every transition.
//!
//! ## Rules
//! - Hooks are invoked **after** the in-memory transition and the store
//!   update, outside any internal lock.
//! - Panics inside a hook are caught and published as
//!   [`EventKind::HookPanicked`](crate::EventKind); they never poison the
//!   state machine.
//! - All methods default to no-ops; implementors override the subset they
//!   care about.

use async_trait::async_trait;

use crate::mono::{Group, Mono};

/// Lifecycle callbacks for a single mono.
#[async_trait]
pub trait MonoHooks: Send + Sync + 'static {
    /// Mono was admitted to a flux.
    async fn on_pending(&self, mono: &Mono) {
        let _ = mono;
    }

    /// Mono began an execution attempt.
    async fn on_executing(&self, mono: &Mono) {
        let _ = mono;
    }

    /// Mono failed an attempt and will be retried.
    async fn on_retrying(&self, mono: &Mono) {
        let _ = mono;
    }

    /// Mono was revoked.
    async fn on_revoke(&self, mono: &Mono) {
        let _ = mono;
    }

    /// Mono finished successfully.
    async fn on_complete(&self, mono: &Mono) {
        let _ = mono;
    }

    /// Mono reached FAILED.
    async fn on_failed(&self, mono: &Mono) {
        let _ = mono;
    }
}

/// Lifecycle callbacks for a group.
///
/// There is no `on_retrying`: groups do not retry, their monos do.
#[async_trait]
pub trait GroupHooks: Send + Sync + 'static {
    /// Group was admitted to the group keeper.
    async fn on_pending(&self, group: &Group) {
        let _ = group;
    }

    /// Group began executing.
    async fn on_executing(&self, group: &Group) {
        let _ = group;
    }

    /// Group finished successfully.
    async fn on_complete(&self, group: &Group) {
        let _ = group;
    }

    /// Group reached FAILED.
    async fn on_failed(&self, group: &Group) {
        let _ = group;
    }
}
