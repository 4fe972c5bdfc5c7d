//! # Event subscribers for the keeper runtime.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`]
//! fan-out used by keepers to deliver [`Event`](crate::events::Event)s.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Mono/Flux/Keeper ── publish(Event) ──► Bus ──► SubscriberSet::emit
//!                                                       │
//!                                        ┌──────────────┼──────────────┐
//!                                        ▼              ▼              ▼
//!                                   [queue S1]     [queue S2]     [queue SN]
//!                                        │              │              │
//!                                   worker S1      worker S2      worker SN
//!                                        │              │              │
//!                                   on_event()     on_event()     on_event()
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use monoflux::{Subscribe, Event, EventKind};
//! use async_trait::async_trait;
//!
//! struct MetricsSubscriber;
//!
//! #[async_trait]
//! impl Subscribe for MetricsSubscriber {
//!     async fn on_event(&self, event: &Event) {
//!         match event.kind {
//!             EventKind::MonoFailed => {
//!                 // increment failure counter
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
