//! # Persistence and recovery seams.
//!
//! The core never persists its own queue; durability is delegated to these
//! collaborator traits. Implementations live outside the crate (SQL, KV,
//! whatever the embedder runs) and are invoked best-effort: a failing store
//! call is published as [`EventKind::StoreDegraded`](crate::EventKind) and
//! never blocks or fails the state transition that triggered it.
//!
//! [`RecoverySource`] is consumed once per process lifetime, by the startup
//! recovery sweep: monos/groups left non-terminal by a previous process
//! cannot be resumed (their execution context is gone) and are revoked or
//! failed instead.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::mono::{Group, Mono};
use crate::{GroupRef, MonoRef};

/// Persistence sink for mono state.
///
/// `update_mono` is called after every state transition; `delete_mono` is an
/// explicit caller action, independent of terminal state.
#[async_trait]
pub trait MonoStore: Send + Sync + 'static {
    /// Persists the mono's current state.
    async fn update_mono(&self, mono: &Mono) -> Result<(), StoreError>;

    /// Removes the mono from the store.
    async fn delete_mono(&self, mono: &Mono) -> Result<(), StoreError>;
}

/// Persistence sink for group state, plus the bookkeeping helpers a
/// group-aware store provides.
#[async_trait]
pub trait GroupStore: Send + Sync + 'static {
    /// Persists the group's current state.
    async fn update_group(&self, group: &Group) -> Result<(), StoreError>;

    /// Removes the group from the store.
    async fn delete_group(&self, group: &Group) -> Result<(), StoreError>;

    /// Records the membership of the group's monos.
    async fn link_group_monos(&self, group: &Group) -> Result<(), StoreError>;

    /// Issues the next per-key sequence number.
    async fn next_sequence(&self, code: &str) -> Result<u64, StoreError>;
}

/// Source of work left in flight by a previous process lifetime.
#[async_trait]
pub trait RecoverySource: Send + Sync + 'static {
    /// Returns all monos still in a non-terminal state.
    async fn fetch_uncomplete_monos(&self) -> Result<Vec<MonoRef>, StoreError>;

    /// Returns all groups still in a non-terminal state.
    async fn fetch_uncomplete_groups(&self) -> Result<Vec<GroupRef>, StoreError>;
}
