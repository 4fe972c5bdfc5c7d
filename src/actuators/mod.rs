//! # Actuators: synchronous-style entry points over the async runtime.
//!
//! An actuator couples a keeper with a wait deadline and a one-shot hooks
//! implementation, turning fire-and-forget submission into "submit and await
//! the terminal state":
//!
//! - [`Actuator`]: one mono, one result;
//! - [`GroupActuator`]: one group, one result;
//! - [`QueueActuator`]: a batch of monos, one aggregated [`QueueOutcome`].
//!
//! A wait deadline bounds the *caller's patience*, not the work: when it
//! elapses, the submitted items keep executing and settle on their own.

#[allow(clippy::module_inception)]
mod actuator;
mod group;
mod queue;

pub use actuator::Actuator;
pub use group::GroupActuator;
pub use queue::{QueueActuator, QueueOutcome};
