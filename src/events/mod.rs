//! Runtime events: the broadcast bus and the event/metadata types.
//!
//! Every lifecycle transition, flux open/close, worker start/retire, and
//! best-effort collaborator failure is published here. Subscribers consume
//! the stream through [`crate::SubscriberSet`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
