//! # monoflux
//!
//! **Monoflux** is an embeddable keyed task-execution library for Rust.
//!
//! It provides primitives to define work units (monos), serialize them per
//! key through FIFO queues (fluxes), execute them on a bounded worker pool
//! (the keeper), and wait on outcomes synchronously (actuators). The crate
//! is designed as a building block for job runners and device controllers
//! that must never run two operations against the same key at once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │     Mono     │   │     Mono     │   │     Mono     │
//!     │ (key "dev-1")│   │ (key "dev-1")│   │ (key "dev-2")│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Keeper (admission + routing)                                     │
//! │  - refuses while not RUNNING, per-key capacity, duplicates        │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - flux table: unique_code ─► Flux                                │
//! └──────────────┬───────────────────────────────┬────────────────────┘
//!                ▼                               ▼
//!        ┌──────────────┐                ┌──────────────┐
//!        │ Flux "dev-1" │                │ Flux "dev-2" │
//!        │ (FIFO queue) │                │ (FIFO queue) │
//!        └──────┬───────┘                └──────┬───────┘
//!               │        shared dispatch        │
//!               └──────────────┬────────────────┘
//!                              ▼
//!               ┌──────────────────────────────┐
//!               │  worker pool (N tasks)       │
//!               │  one flux at a time each     │
//!               │  retry loop per mono         │
//!               └──────────────┬───────────────┘
//!                              ▼
//!               ┌──────────────────────────────┐
//!               │  Bus (broadcast channel)     │
//!               └──────────────┬───────────────┘
//!                              ▼
//!                        SubscriberSet
//!                       (per-sub queues)
//! ```
//!
//! ### Mono lifecycle
//! ```text
//! MonoBuilder::build() ─► READY
//!
//! keeper.add_mono(mono)
//!   ├─► admission checks (RUNNING, duplicate, capacity)
//!   ├─► READY ─► PENDING (admitted to the key's flux)
//!   └─► worker picks the flux:
//!         loop {
//!           ├─► PENDING ─► EXECUTING (attempt 1) / stay EXECUTING|RETRYING
//!           ├─► work.run()
//!           │     ├─ Ok ──────────────► COMPLETE, exit
//!           │     ├─ Err(Fail), budget left ─► RETRYING, pause, continue
//!           │     └─ Err(Fatal) or budget spent ─► FAILED, exit
//!           └─► (REVOKED/TIMEOUT are caller- or recovery-driven)
//!         }
//! ```
//!
//! A flux that sits idle past its timeout closes itself and deregisters;
//! monos caught in the close window are re-routed to a fresh flux.
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                       |
//! |-------------------|--------------------------------------------------------------------|------------------------------------------|
//! | **Work units**    | Define work as async closures or trait impls, with retry budgets.  | [`Mono`], [`MonoBuilder`], [`WorkFn`]    |
//! | **Composites**    | Bundle monos under one unit of work with its own lifecycle.        | [`Group`], [`GroupBuilder`]              |
//! | **Execution**     | Bounded worker pools with per-key FIFO serialization.              | [`Keeper`], [`GroupKeeper`]              |
//! | **Waiting**       | Submit-and-await over the async runtime, single or batch.          | [`Actuator`], [`QueueActuator`]          |
//! | **Persistence**   | Optional stores and crash-recovery sources.                        | [`MonoStore`], [`RecoverySource`]        |
//! | **Observability** | Lifecycle events, hooks, pluggable subscribers.                    | [`Event`], [`MonoHooks`], [`Subscribe`]  |
//! | **Errors**        | Typed errors for admission, transitions, and execution.            | [`AdmissionError`], [`WorkError`]        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use monoflux::{Actuator, Keeper, KeeperConfig, Mono, WorkFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keeper = Keeper::builder(KeeperConfig::default()).build();
//!     keeper.run_workers().await;
//!
//!     let mono = Mono::builder(
//!         "hello-1",
//!         "dev-1",
//!         WorkFn::arc(|| async {
//!             println!("Hello from mono!");
//!             Ok(())
//!         }),
//!     )
//!     .build();
//!
//!     // Submit and await the terminal state.
//!     Actuator::new(Arc::clone(&keeper)).exec(mono).await?;
//!
//!     keeper.shutdown().await;
//!     Ok(())
//! }
//! ```
mod actuators;
mod config;
mod error;
mod events;
mod flux;
mod hooks;
mod keeper;
mod mono;
mod store;
mod subscribers;

// ---- Public re-exports ----

pub use actuators::{Actuator, GroupActuator, QueueActuator, QueueOutcome};
pub use config::KeeperConfig;
pub use error::{
    ActuatorError, AdmissionError, StoreError, TransitionError, WorkError,
};
pub use events::{Bus, Event, EventKind};
pub use hooks::{GroupHooks, MonoHooks};
pub use keeper::{
    FluxSnapshot, GroupKeeper, GroupKeeperBuilder, GroupKeeperSnapshot, GroupSnapshot, Keeper,
    KeeperBuilder, KeeperSnapshot, KeeperStatus, MonoSnapshot,
};
pub use mono::{
    Group, GroupBuilder, GroupRef, GroupStatus, Mono, MonoBuilder, MonoRef, MonoStatus, Work,
    WorkFn, WorkRef,
};
pub use store::{GroupStore, MonoStore, RecoverySource};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
