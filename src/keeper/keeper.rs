//! # Keeper: admission control, worker pool, routing, and recovery.
//!
//! The [`Keeper`] owns the worker pool, the key→[`Flux`] routing table, the
//! dispatch queue, and the lifecycle status gate. It is an explicit instance
//! passed by reference to every call site; there is no process-wide
//! singleton.
//!
//! ## Data flow
//! ```text
//! caller ──► Keeper::add_mono (status gate)
//!               └─► route(): look up or lazily create the key's Flux
//!                     ├─ created → enqueue the Flux on the dispatch queue
//!                     └─► Flux::push (duplicate/capacity check, READY→PENDING)
//!                           └─► a Worker drains the Flux sequentially
//! ```
//!
//! ## Startup recovery
//! `run_workers()` spawns the pool immediately, but the keeper stays
//! STOPPED (admission refused) until the recovery sweep completes:
//! `recovery_delay` after startup it fetches every mono left non-terminal
//! by a prior process lifetime and revokes it: such work cannot be safely
//! resumed, only observed and resubmitted by the embedder. Sweep failures
//! are published and do not prevent the keeper from reaching RUNNING;
//! recovery is best-effort, not a precondition for availability.
//!
//! ## Shutdown
//! `shutdown()` flips to STOPPING (admission refused), pushes one retire
//! sentinel per worker, joins the pool, and flips to STOPPED.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::KeeperConfig;
use crate::error::AdmissionError;
use crate::events::{Bus, Event, EventKind};
use crate::flux::Flux;
use crate::keeper::worker::{run_worker, Dispatch};
use crate::keeper::KeeperSnapshot;
use crate::mono::{MonoRef, MonoStatus};
use crate::store::RecoverySource;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Lifecycle status of a keeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeeperStatus {
    /// Not started, or recovery still in progress; admission refused.
    Stopped,
    /// Accepting work.
    Running,
    /// Draining; admission refused, workers retiring.
    Stopping,
}

impl KeeperStatus {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            KeeperStatus::Stopped => "stopped",
            KeeperStatus::Running => "running",
            KeeperStatus::Stopping => "stopping",
        }
    }
}

/// Owner of the mono worker pool and the key→flux routing table; the
/// admission-control and lifecycle authority.
pub struct Keeper {
    /// Self-reference for spawning and flux backrefs; set at build time.
    me: Weak<Keeper>,
    cfg: KeeperConfig,
    bus: Bus,
    status: RwLock<KeeperStatus>,
    fluxes: RwLock<HashMap<String, Arc<Flux>>>,
    tx: mpsc::Sender<Dispatch>,
    rx: Arc<Mutex<mpsc::Receiver<Dispatch>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    recovery: Option<Arc<dyn RecoverySource>>,
}

impl Keeper {
    /// Starts building a keeper with the given configuration.
    pub fn builder(cfg: KeeperConfig) -> KeeperBuilder {
        KeeperBuilder {
            cfg,
            subscribers: Vec::new(),
            recovery: None,
        }
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> KeeperStatus {
        *self.status.read().await
    }

    /// The keeper's event bus; embedders may subscribe directly.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The configuration this keeper was built with.
    pub fn config(&self) -> &KeeperConfig {
        &self.cfg
    }

    /// Spawns the worker pool and schedules the recovery sweep.
    ///
    /// Idempotent: calling it on a keeper that is not STOPPED is a no-op.
    /// Admission stays refused until the sweep finishes and the status
    /// flips to RUNNING.
    pub async fn run_workers(&self) {
        {
            let st = self.status.read().await;
            if *st != KeeperStatus::Stopped {
                return;
            }
        }
        {
            let mut workers = self.workers.lock().await;
            if !workers.is_empty() {
                return;
            }
            for i in 0..self.cfg.workers_clamped() {
                let name = format!("mono-worker-{i}");
                let rx = Arc::clone(&self.rx);
                let bus = self.bus.clone();
                workers.push(tokio::spawn(run_worker(name, rx, bus)));
            }
        }

        match &self.recovery {
            None => {
                *self.status.write().await = KeeperStatus::Running;
            }
            Some(src) => {
                let src = Arc::clone(src);
                let Some(me) = self.me.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    time::sleep(me.cfg.recovery_delay).await;
                    me.bus.publish(Event::now(EventKind::RecoveryStarted));
                    me.sweep(src.as_ref()).await;
                    *me.status.write().await = KeeperStatus::Running;
                    me.bus.publish(Event::now(EventKind::RecoveryFinished));
                });
            }
        }
    }

    /// Submits a single mono (fire-and-forget).
    pub async fn add_mono(&self, mono: MonoRef) -> Result<(), AdmissionError> {
        self.ensure_running().await?;
        mono.attach_bus(&self.bus);
        // monos built without their own retry budget inherit the keeper's
        mono.apply_default_budget(self.cfg.max_execute_times());

        // a lookup can race a flux's idle-close; re-route and try again
        for _ in 0..3 {
            let flux = self.route(mono.unique_code()).await?;
            match flux.push(mono.clone()).await {
                Err(AdmissionError::Closed) => continue,
                other => return other,
            }
        }
        Err(AdmissionError::Closed)
    }

    /// Submits several monos in order; stops at the first refusal.
    pub async fn add_monos(&self, monos: Vec<MonoRef>) -> Result<(), AdmissionError> {
        for mono in monos {
            self.add_mono(mono).await?;
        }
        Ok(())
    }

    /// Read-only admission probe: would `add_mono` accept this mono right
    /// now? Mutates nothing; used by callers wanting to fail fast before
    /// constructing the real work.
    pub async fn check(&self, mono: &MonoRef) -> Result<(), AdmissionError> {
        self.ensure_running().await?;
        let fluxes = self.fluxes.read().await;
        match fluxes.get(mono.unique_code()) {
            Some(flux) => flux.probe(mono.id()),
            None => Ok(()),
        }
    }

    /// Revokes a mono that has not yet reached EXECUTING (or is retrying).
    /// The flux drops revoked monos at dequeue time.
    pub async fn revoke_mono(&self, mono: &MonoRef) -> Result<(), crate::TransitionError> {
        mono.revoke().await
    }

    /// Introspection snapshot: configuration, worker pool, and every
    /// in-flight flux with its registered monos.
    pub async fn export(&self) -> KeeperSnapshot {
        let status = *self.status.read().await;
        let workers = self.workers.lock().await.len();
        let fluxes = self.fluxes.read().await;
        let mut flux_snaps: Vec<_> = fluxes.values().map(|f| f.snapshot()).collect();
        flux_snaps.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        KeeperSnapshot {
            status,
            config: self.cfg.clone(),
            workers,
            fluxes: flux_snaps,
        }
    }

    /// [`Keeper::export`] as a JSON value, for HTTP adapters.
    pub async fn export_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.export().await)
    }

    /// Stops accepting work, retires every worker, and waits for them.
    pub async fn shutdown(&self) {
        {
            let mut st = self.status.write().await;
            if *st == KeeperStatus::Stopping {
                return;
            }
            *st = KeeperStatus::Stopping;
        }
        self.bus.publish(Event::now(EventKind::ShutdownRequested));

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        for _ in 0..handles.len() {
            let _ = self.tx.send(Dispatch::Retire).await;
        }
        for h in handles {
            let _ = h.await;
        }

        *self.status.write().await = KeeperStatus::Stopped;
        self.bus.publish(Event::now(EventKind::AllWorkersRetired));
    }

    // ---- crate-internal plumbing ----

    /// Removes a self-closing flux from the routing table. Identity-checked:
    /// a fresh flux that already reoccupied the key is left alone.
    pub(crate) async fn deregister_flux(&self, flux: &Arc<Flux>, code: &str) {
        let mut fluxes = self.fluxes.write().await;
        if let Some(existing) = fluxes.get(code) {
            if Arc::ptr_eq(existing, flux) {
                fluxes.remove(code);
            }
        }
    }

    /// Requeues a mono caught in a flux's idle-close window.
    pub(crate) async fn resubmit(&self, mono: MonoRef) {
        if let Err(e) = self.add_mono(mono.clone()).await {
            // never drop silently: the mono is failed with the refusal
            let _ = mono.failed(format!("resubmission refused: {e}")).await;
        }
    }

    // ---- internals ----

    async fn ensure_running(&self) -> Result<(), AdmissionError> {
        match *self.status.read().await {
            KeeperStatus::Running => Ok(()),
            KeeperStatus::Stopped => Err(AdmissionError::NotRunning),
            KeeperStatus::Stopping => Err(AdmissionError::Stopping),
        }
    }

    /// Looks up the key's flux, lazily creating (and dispatching) it.
    async fn route(&self, code: &str) -> Result<Arc<Flux>, AdmissionError> {
        {
            let fluxes = self.fluxes.read().await;
            if let Some(f) = fluxes.get(code) {
                if !f.is_closed() {
                    return Ok(Arc::clone(f));
                }
            }
        }

        let created = {
            let mut fluxes = self.fluxes.write().await;
            match fluxes.get(code) {
                Some(f) if !f.is_closed() => return Ok(Arc::clone(f)),
                _ => {
                    let flux = Flux::new(code, &self.cfg, self.bus.clone(), self.me.clone());
                    fluxes.insert(code.to_string(), Arc::clone(&flux));
                    flux
                }
            }
        };

        self.bus
            .publish(Event::now(EventKind::FluxOpened).with_code(code));
        self.tx
            .send(Dispatch::Flux(Arc::clone(&created)))
            .await
            .map_err(|_| AdmissionError::Closed)?;
        Ok(created)
    }

    /// Revokes every mono left non-terminal by a prior process lifetime.
    async fn sweep(&self, src: &dyn RecoverySource) {
        match src.fetch_uncomplete_monos().await {
            Ok(monos) => {
                for mono in monos {
                    mono.attach_bus(&self.bus);
                    match mono.status() {
                        s if s.is_active() => {
                            let _ = mono.revoke().await;
                        }
                        MonoStatus::Ready => {
                            let _ = mono.failed("unrecovered after restart").await;
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => {
                self.bus.publish(
                    Event::now(EventKind::RecoveryDegraded).with_reason(e.to_string()),
                );
            }
        }
    }
}

/// Builder for [`Keeper`].
pub struct KeeperBuilder {
    cfg: KeeperConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    recovery: Option<Arc<dyn RecoverySource>>,
}

impl KeeperBuilder {
    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (lifecycle, degradation, etc.)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the recovery source consulted by the startup sweep.
    pub fn with_recovery(mut self, recovery: Arc<dyn RecoverySource>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Builds the keeper. Must be called inside a tokio runtime: subscriber
    /// workers and the bus listener are spawned here.
    pub fn build(self) -> Arc<Keeper> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let (tx, rx) = mpsc::channel(self.cfg.dispatch_capacity_clamped());

        let keeper = Arc::new_cyclic(|me| Keeper {
            me: me.clone(),
            cfg: self.cfg,
            bus: bus.clone(),
            status: RwLock::new(KeeperStatus::Stopped),
            fluxes: RwLock::new(HashMap::new()),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            workers: Mutex::new(Vec::new()),
            recovery: self.recovery,
        });

        // fan bus events out to the subscriber set (fire-and-forget)
        let mut bus_rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(ev) => subs.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        keeper
    }
}
