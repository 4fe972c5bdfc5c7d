//! Work items: the [`Work`] capability, the [`Mono`] state machine, and the
//! composite [`Group`].
//!
//! Internal modules:
//! - [`status`]: state enums and terminal/active classification;
//! - [`work`]: the embedder-supplied work capability and its fn adapter;
//! - [`mono`]: the single-item state machine;
//! - [`group`]: the composite variant (no retry of its own).

mod group;
#[allow(clippy::module_inception)]
mod mono;
mod status;
mod work;

pub use group::{Group, GroupBuilder, GroupRef};
pub use mono::{Mono, MonoBuilder, MonoRef};
pub use status::{GroupStatus, MonoStatus};
pub use work::{Work, WorkFn, WorkRef};
