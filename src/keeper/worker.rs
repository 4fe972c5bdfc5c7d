//! # Worker loop over the shared dispatch queue.
//!
//! Each keeper owns a fixed pool of worker tasks. A worker blocking-reads
//! one [`Flux`] at a time from the dispatch channel and runs it to
//! exhaustion (the flux self-closes when idle) before asking for the next.
//! The channel receiver is shared through an async mutex: exactly one idle
//! worker holds it while waiting; the lock is released the moment an item
//! arrives, before the flux is driven.
//!
//! Shutdown pushes one [`Dispatch::Retire`] sentinel per worker to wake and
//! retire every otherwise-idle worker.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::events::{Bus, Event, EventKind};
use crate::flux::Flux;
use crate::mono::GroupRef;

/// An item on the mono keeper's dispatch queue.
pub(crate) enum Dispatch {
    /// A flux awaiting a worker.
    Flux(Arc<Flux>),
    /// Shutdown sentinel; the receiving worker exits.
    Retire,
}

/// An item on the group keeper's dispatch queue.
pub(crate) enum GroupDispatch {
    /// A group awaiting a worker.
    Group(GroupRef),
    /// Shutdown sentinel; the receiving worker exits.
    Retire,
}

/// Runs one mono worker until it receives a retire sentinel (or the channel
/// closes).
pub(crate) async fn run_worker(name: String, rx: Arc<Mutex<mpsc::Receiver<Dispatch>>>, bus: Bus) {
    bus.publish(Event::now(EventKind::WorkerStarted).with_worker(name.as_str()));

    loop {
        let item = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        match item {
            Some(Dispatch::Flux(flux)) => flux.run().await,
            Some(Dispatch::Retire) | None => break,
        }
    }

    bus.publish(Event::now(EventKind::WorkerRetired).with_worker(name.as_str()));
}
