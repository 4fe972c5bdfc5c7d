//! Keeper runtime: admission, worker pools, routing, recovery, shutdown.
//!
//! Internal modules:
//! - [`keeper`]: the mono keeper (admission gate, flux routing, sweep);
//! - [`group_keeper`]: the group variant (one group per key at a time);
//! - [`worker`]: the shared-receiver worker loop and dispatch sentinels;
//! - [`snapshot`]: serializable introspection views for `export()`.

#[allow(clippy::module_inception)]
mod keeper;
mod group_keeper;
mod snapshot;
pub(crate) mod worker;

pub use group_keeper::{GroupKeeper, GroupKeeperBuilder};
pub use keeper::{Keeper, KeeperBuilder, KeeperStatus};
pub use snapshot::{FluxSnapshot, GroupKeeperSnapshot, GroupSnapshot, KeeperSnapshot, MonoSnapshot};
