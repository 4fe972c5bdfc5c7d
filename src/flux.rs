//! # Flux: the per-key FIFO serialization queue.
//!
//! One [`Flux`] exists per in-flight `unique_code`. It guarantees in-order,
//! non-concurrent execution of all monos sharing that key: the dispatch loop
//! is strictly sequential, so at any instant at most one mono drawn from
//! this flux is executing.
//!
//! ## Lifecycle
//! ```text
//! Keeper.add_mono (first mono for key)
//!     └─► Flux created, enqueued on the keeper dispatch queue
//!             └─► a Worker picks it up and drives run():
//!                     loop {
//!                       recv(mono) with idle timeout
//!                         ├─ mono stale (not PENDING/EXECUTING/RETRYING) → drop
//!                         ├─ drive PENDING→EXECUTING, run work, retry policy
//!                         └─ idle timeout → self-close:
//!                              deregister from keeper, settle delay,
//!                              resubmit whatever is still queued, exit
//!                     }
//! ```
//!
//! ## Retry policy
//! A failed attempt consumes one unit of the budget via `retrying()`, pauses
//! `task_interval`, and re-invokes the work **in place**: the mono keeps its
//! serialization slot; retry is an explicit loop, never a new queue entry.
//!
//! ## Idle-close race
//! A mono pushed concurrently with the close is either drained during the
//! settle delay and resubmitted through the keeper (possibly under a fresh
//! flux), or its push fails with `Closed` and the keeper re-routes it. Work
//! is never lost; the per-key ordering guarantee, however, can break exactly
//! at this boundary. That window is an accepted property of the design.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use crate::config::KeeperConfig;
use crate::error::AdmissionError;
use crate::events::{Bus, Event, EventKind};
use crate::keeper::{FluxSnapshot, Keeper};
use crate::mono::MonoRef;

/// Registry of admitted monos plus the closed flag, under one lock so that
/// admission and close are linearized.
struct Registry {
    monos: HashMap<String, MonoRef>,
    closed: bool,
}

/// Per-key FIFO serialization queue. Created lazily by the keeper on the
/// first mono for an unseen key; destroys itself after an idle timeout.
pub(crate) struct Flux {
    unique_id: String,
    limit: usize,
    idle_timeout: Duration,
    settle_delay: Duration,
    interval: Option<Duration>,
    registry: Mutex<Registry>,
    tx: mpsc::Sender<MonoRef>,
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<MonoRef>>>,
    running: AtomicBool,
    keeper: Weak<Keeper>,
    bus: Bus,
}

impl Flux {
    /// Creates a flux for the given key.
    pub(crate) fn new(unique_id: impl Into<String>, cfg: &KeeperConfig, bus: Bus, keeper: Weak<Keeper>) -> Arc<Self> {
        let limit = cfg.limit_clamped();
        let (tx, rx) = mpsc::channel(limit);
        Arc::new(Self {
            unique_id: unique_id.into(),
            limit,
            idle_timeout: cfg.idle_timeout,
            settle_delay: cfg.settle_delay,
            interval: cfg.interval(),
            registry: Mutex::new(Registry {
                monos: HashMap::new(),
                closed: false,
            }),
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            running: AtomicBool::new(false),
            keeper,
            bus,
        })
    }

    /// Admits a mono: registers it, drives READY→PENDING, and enqueues it.
    ///
    /// Rejects duplicates, a full queue, a mono that is not READY, and a
    /// flux that has already begun closing (`Closed`; the keeper re-routes).
    pub(crate) async fn push(&self, mono: MonoRef) -> Result<(), AdmissionError> {
        {
            let mut reg = self.lock_registry();
            if reg.closed {
                return Err(AdmissionError::Closed);
            }
            if reg.monos.contains_key(mono.id()) {
                return Err(AdmissionError::Duplicate {
                    mono_id: mono.id().to_string(),
                });
            }
            if reg.monos.len() >= self.limit {
                return Err(AdmissionError::QueueFull {
                    code: self.unique_id.clone(),
                    limit: self.limit,
                });
            }
            reg.monos.insert(mono.id().to_string(), mono.clone());
        }

        if mono.pending().await.is_err() {
            self.unregister(mono.id());
            let _ = mono.failed("mono was not ready for flux admission").await;
            return Err(AdmissionError::NotReady {
                id: mono.id().to_string(),
            });
        }

        if self.tx.try_send(mono.clone()).is_err() {
            // queue torn down mid-push; hand the mono back to the keeper
            self.unregister(mono.id());
            let _ = mono.requeue();
            return Err(AdmissionError::Closed);
        }
        Ok(())
    }

    /// Read-only admission probe for `Keeper::check`.
    pub(crate) fn probe(&self, mono_id: &str) -> Result<(), AdmissionError> {
        let reg = self.lock_registry();
        if reg.closed {
            return Ok(()); // a fresh flux would be created for this key
        }
        if reg.monos.contains_key(mono_id) {
            return Err(AdmissionError::Duplicate {
                mono_id: mono_id.to_string(),
            });
        }
        if reg.monos.len() >= self.limit {
            return Err(AdmissionError::QueueFull {
                code: self.unique_id.clone(),
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// True once the flux has begun closing.
    pub(crate) fn is_closed(&self) -> bool {
        self.lock_registry().closed
    }

    /// Point-in-time view for `Keeper::export`.
    pub(crate) fn snapshot(&self) -> FluxSnapshot {
        let reg = self.lock_registry();
        let mut monos: Vec<_> = reg.monos.values().map(|m| m.snapshot()).collect();
        monos.sort_by(|a, b| a.id.cmp(&b.id));
        FluxSnapshot {
            unique_id: self.unique_id.clone(),
            monos,
        }
    }

    /// Drains this flux to exhaustion. Called by exactly one worker; the
    /// worker owns the flux until this returns.
    pub(crate) async fn run(self: Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return; // already driven once
        }
        let mut rx = match self.rx.lock().await.take() {
            Some(rx) => rx,
            None => return,
        };

        loop {
            match time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(mono)) => {
                    if !mono.status().is_active() {
                        // stale: revoked or failed while waiting in the queue
                        self.unregister(mono.id());
                        continue;
                    }
                    self.execute(&mono).await;
                    self.unregister(mono.id());
                    if let Some(pause) = self.interval {
                        time::sleep(pause).await;
                    }
                }
                Ok(None) => break,
                Err(_idle) => {
                    Arc::clone(&self).close(rx).await;
                    break;
                }
            }
        }
    }

    /// Drives one mono through the retry policy, holding the key's
    /// serialization slot for the whole attempt sequence.
    async fn execute(&self, mono: &MonoRef) {
        if mono.executing().await.is_err() {
            // a concurrent revoke raced ahead of the dispatch loop
            return;
        }

        loop {
            match mono.work().run().await {
                Ok(()) => {
                    if let Err(e) = mono.complete().await {
                        let _ = mono.failed(format!("completion rejected: {e}")).await;
                    }
                    break;
                }
                Err(err) if err.is_retryable() => match mono.retrying(&err).await {
                    Ok(()) => {
                        if let Some(pause) = self.interval {
                            time::sleep(pause).await;
                        }
                    }
                    Err(_exhausted) => {
                        let _ = mono.failed(err.to_string()).await;
                        break;
                    }
                },
                Err(err) => {
                    let _ = mono.failed(err.to_string()).await;
                    break;
                }
            }
        }
    }

    /// Idle self-close: deregister from the keeper, settle, then requeue
    /// anything that slipped in between the idle timeout and now.
    async fn close(self: Arc<Self>, mut rx: mpsc::Receiver<MonoRef>) {
        self.lock_registry().closed = true;

        let keeper = self.keeper.upgrade();
        if let Some(k) = &keeper {
            k.deregister_flux(&self, &self.unique_id).await;
        }
        self.bus
            .publish(Event::now(EventKind::FluxClosed).with_code(self.unique_id.as_str()));

        time::sleep(self.settle_delay).await;

        // stop further sends, then drain what made it into the buffer;
        // a push that lost this race gets `Closed` and is re-routed
        rx.close();
        while let Ok(mono) = rx.try_recv() {
            self.unregister(mono.id());
            if mono.requeue().is_err() {
                // terminal meanwhile; nothing to requeue
                continue;
            }
            self.bus.publish(
                Event::now(EventKind::FluxResubmitted)
                    .with_mono(mono.id())
                    .with_code(self.unique_id.as_str()),
            );
            match &keeper {
                Some(k) => k.resubmit(mono).await,
                None => {
                    let _ = mono.failed("keeper gone during flux close").await;
                }
            }
        }
    }

    fn unregister(&self, mono_id: &str) {
        self.lock_registry().monos.remove(mono_id);
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}
