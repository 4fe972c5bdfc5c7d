//! # GroupKeeper: the worker pool and admission authority for groups.
//!
//! Same shape as the mono [`Keeper`](crate::Keeper), but the unit of
//! dispatch is a whole [`Group`](crate::Group): a group worker pulls one
//! group at a time from the dispatch queue and drives
//! READY→PENDING→EXECUTING→COMPLETE|FAILED sequentially. There is no
//! group-level retry; failures inside member monos are their own concern.
//!
//! Admission is keyed: at most one non-terminal group per `unique_code` at
//! a time ("key busy" otherwise). The startup recovery sweep marks every
//! previously-uncompleted group FAILED and revokes its member monos: a
//! group's work cannot be resumed from a crash mid-execution.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::KeeperConfig;
use crate::error::AdmissionError;
use crate::events::{Bus, Event, EventKind};
use crate::keeper::worker::GroupDispatch;
use crate::keeper::{GroupKeeperSnapshot, KeeperStatus};
use crate::mono::GroupRef;
use crate::store::RecoverySource;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Owner of the group worker pool and the key→group routing table.
pub struct GroupKeeper {
    /// Self-reference for spawning worker loops; set at build time.
    me: Weak<GroupKeeper>,
    cfg: KeeperConfig,
    bus: Bus,
    status: RwLock<KeeperStatus>,
    groups: RwLock<HashMap<String, GroupRef>>,
    tx: mpsc::Sender<GroupDispatch>,
    rx: Arc<Mutex<mpsc::Receiver<GroupDispatch>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    recovery: Option<Arc<dyn RecoverySource>>,
}

impl GroupKeeper {
    /// Starts building a group keeper with the given configuration.
    pub fn builder(cfg: KeeperConfig) -> GroupKeeperBuilder {
        GroupKeeperBuilder {
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

    /// Spawns the group worker pool and schedules the recovery sweep.
    /// Idempotent; admission stays refused until the sweep completes.
    pub async fn run_workers(&self) {
        {
            let st = self.status.read().await;
            if *st != KeeperStatus::Stopped {
                return;
            }
        }
        let Some(this) = self.me.upgrade() else {
            return;
        };
        {
            let mut workers = self.workers.lock().await;
            if !workers.is_empty() {
                return;
            }
            for i in 0..self.cfg.workers_clamped() {
                let name = format!("group-worker-{i}");
                let me = Arc::clone(&this);
                workers.push(tokio::spawn(me.worker_loop(name)));
            }
        }

        match &self.recovery {
            None => {
                *self.status.write().await = KeeperStatus::Running;
            }
            Some(src) => {
                let src = Arc::clone(src);
                let me = this;
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

    /// Submits a group (fire-and-forget).
    ///
    /// Refuses while not RUNNING, and while another non-terminal group
    /// occupies the same key.
    pub async fn add_group(&self, group: GroupRef) -> Result<(), AdmissionError> {
        self.ensure_running().await?;
        group.attach_bus(&self.bus);

        {
            let mut groups = self.groups.write().await;
            if let Some(existing) = groups.get(group.unique_code()) {
                if !existing.status().is_terminal() {
                    return Err(AdmissionError::KeyBusy {
                        code: group.unique_code().to_string(),
                    });
                }
            }
            groups.insert(group.unique_code().to_string(), Arc::clone(&group));
        }

        if group.pending().await.is_err() {
            self.deregister(&group).await;
            return Err(AdmissionError::NotReady {
                id: group.id().to_string(),
            });
        }

        // store bookkeeping, best-effort
        group.issue_sequence().await;
        group.link_members().await;

        if self.tx.send(GroupDispatch::Group(Arc::clone(&group))).await.is_err() {
            self.deregister(&group).await;
            group.force_failed("dispatch channel closed").await;
            return Err(AdmissionError::Closed);
        }
        Ok(())
    }

    /// Read-only admission probe for groups.
    pub async fn check(&self, group: &GroupRef) -> Result<(), AdmissionError> {
        self.ensure_running().await?;
        let groups = self.groups.read().await;
        if let Some(existing) = groups.get(group.unique_code()) {
            if !existing.status().is_terminal() {
                return Err(AdmissionError::KeyBusy {
                    code: group.unique_code().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Introspection snapshot: configuration, worker pool, in-flight groups.
    pub async fn export(&self) -> GroupKeeperSnapshot {
        let status = *self.status.read().await;
        let workers = self.workers.lock().await.len();
        let groups = self.groups.read().await;
        let mut group_snaps: Vec<_> = groups.values().map(|g| g.snapshot()).collect();
        group_snaps.sort_by(|a, b| a.id.cmp(&b.id));
        GroupKeeperSnapshot {
            status,
            config: self.cfg.clone(),
            workers,
            groups: group_snaps,
        }
    }

    /// [`GroupKeeper::export`] as a JSON value, for HTTP adapters.
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
            let _ = self.tx.send(GroupDispatch::Retire).await;
        }
        for h in handles {
            let _ = h.await;
        }

        *self.status.write().await = KeeperStatus::Stopped;
        self.bus.publish(Event::now(EventKind::AllWorkersRetired));
    }

    // ---- internals ----

    async fn ensure_running(&self) -> Result<(), AdmissionError> {
        match *self.status.read().await {
            KeeperStatus::Running => Ok(()),
            KeeperStatus::Stopped => Err(AdmissionError::NotRunning),
            KeeperStatus::Stopping => Err(AdmissionError::Stopping),
        }
    }

    /// Identity-checked removal: a newer group that already reoccupied the
    /// key is left alone.
    async fn deregister(&self, group: &GroupRef) {
        let mut groups = self.groups.write().await;
        if let Some(existing) = groups.get(group.unique_code()) {
            if Arc::ptr_eq(existing, group) {
                groups.remove(group.unique_code());
            }
        }
    }

    /// One group worker: pulls a group at a time and drives it terminal.
    async fn worker_loop(self: Arc<Self>, name: String) {
        self.bus
            .publish(Event::now(EventKind::WorkerStarted).with_worker(name.as_str()));

        loop {
            let item = {
                let mut guard = self.rx.lock().await;
                guard.recv().await
            };
            match item {
                Some(GroupDispatch::Group(group)) => {
                    self.drive(&group).await;
                    self.deregister(&group).await;
                }
                Some(GroupDispatch::Retire) | None => break,
            }
        }

        self.bus
            .publish(Event::now(EventKind::WorkerRetired).with_worker(name.as_str()));
    }

    async fn drive(&self, group: &GroupRef) {
        if group.executing().await.is_err() {
            // raced a recovery sweep or an embedder reset; leave it be
            return;
        }
        match group.work().run().await {
            Ok(()) => {
                if group.complete().await.is_err() {
                    group.force_failed("completion rejected").await;
                }
            }
            Err(e) => {
                let _ = group.failed(e.to_string()).await;
            }
        }
    }

    /// Fails every group left non-terminal by a prior process lifetime and
    /// revokes its member monos.
    async fn sweep(&self, src: &dyn RecoverySource) {
        match src.fetch_uncomplete_groups().await {
            Ok(groups) => {
                for group in groups {
                    group.attach_bus(&self.bus);
                    group.force_failed("unrecovered after restart").await;
                    group.revoke_members().await;
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

/// Builder for [`GroupKeeper`].
pub struct GroupKeeperBuilder {
    cfg: KeeperConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    recovery: Option<Arc<dyn RecoverySource>>,
}

impl GroupKeeperBuilder {
    /// Sets event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the recovery source consulted by the startup sweep.
    pub fn with_recovery(mut self, recovery: Arc<dyn RecoverySource>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Builds the group keeper. Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<GroupKeeper> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let (tx, rx) = mpsc::channel(self.cfg.dispatch_capacity_clamped());

        let keeper = Arc::new_cyclic(|me| GroupKeeper {
            me: me.clone(),
            cfg: self.cfg,
            bus: bus.clone(),
            status: RwLock::new(KeeperStatus::Stopped),
            groups: RwLock::new(HashMap::new()),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            workers: Mutex::new(Vec::new()),
            recovery: self.recovery,
        });

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
