//! # Introspection snapshots for operational dashboards.
//!
//! `Keeper::export` / `GroupKeeper::export` assemble these point-in-time
//! views of configuration, worker pool, and in-flight work. All types are
//! `serde::Serialize`, so an HTTP adapter can hand them straight to its
//! response encoder.

use serde::Serialize;

use crate::config::KeeperConfig;
use crate::keeper::KeeperStatus;
use crate::mono::{GroupStatus, MonoStatus};

/// Point-in-time view of a single mono.
#[derive(Debug, Clone, Serialize)]
pub struct MonoSnapshot {
    /// Unique mono id.
    pub id: String,
    /// Serialization key.
    pub unique_code: String,
    /// Operation discriminator.
    pub option: String,
    /// Lifecycle state at snapshot time.
    pub status: MonoStatus,
    /// Attempts started so far.
    pub execute_times: u32,
    /// Attempts allowed.
    pub max_execute_times: u32,
    /// Last failure/retry reason, if any.
    pub reason: Option<String>,
}

/// Point-in-time view of a group and its members.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    /// Unique group id.
    pub id: String,
    /// Serialization key.
    pub unique_code: String,
    /// Operation discriminator.
    pub option: String,
    /// Lifecycle state at snapshot time.
    pub status: GroupStatus,
    /// Per-key sequence number, if the store issued one.
    pub sequence: Option<u64>,
    /// Member monos in submission order.
    pub monos: Vec<MonoSnapshot>,
}

/// Point-in-time view of one flux and its registered monos.
#[derive(Debug, Clone, Serialize)]
pub struct FluxSnapshot {
    /// The serialization key this flux serves.
    pub unique_id: String,
    /// Registered monos, sorted by id.
    pub monos: Vec<MonoSnapshot>,
}

/// Point-in-time view of a [`Keeper`](crate::Keeper).
#[derive(Debug, Clone, Serialize)]
pub struct KeeperSnapshot {
    /// Lifecycle status of the keeper.
    pub status: KeeperStatus,
    /// Effective configuration.
    pub config: KeeperConfig,
    /// Number of spawned workers.
    pub workers: usize,
    /// In-flight fluxes and their contents.
    pub fluxes: Vec<FluxSnapshot>,
}

/// Point-in-time view of a [`GroupKeeper`](crate::GroupKeeper).
#[derive(Debug, Clone, Serialize)]
pub struct GroupKeeperSnapshot {
    /// Lifecycle status of the keeper.
    pub status: KeeperStatus,
    /// Effective configuration.
    pub config: KeeperConfig,
    /// Number of spawned workers.
    pub workers: usize,
    /// In-flight groups and their member monos.
    pub groups: Vec<GroupSnapshot>,
}
