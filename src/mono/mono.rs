//! # Mono: a single keyed unit of work and its state machine.
//!
//! A [`Mono`] bundles identity (`mono_id`, `unique_code`, `option`), an
//! embedder-supplied [`Work`](crate::Work), a retry budget, and the
//! lifecycle state machine:
//!
//! ```text
//! READY ──pending()──► PENDING ──executing()──► EXECUTING ──retrying()──► RETRYING ─┐
//!                         │                        │   │                    │  ▲    │
//!                         │                        │   └────complete()──────┼──┼──► COMPLETE
//!                         │                        │                        │  └─retrying()
//!                         └────────revoke()────────┴────────revoke()────────┘
//!
//! failed(reason): legal from any state          → FAILED
//! timeout():      legal from any state          → TIMEOUT
//! ```
//!
//! ## Rules
//! - Every transition mutates in-memory state under a short-lived lock,
//!   then persists via the store (best-effort) and notifies the hooks,
//!   both **outside** the lock.
//! - Store failures and hook panics are published on the bus; they never
//!   fail the transition. The in-memory state machine is authoritative.
//! - `execute_times` counts started attempts and never exceeds
//!   `max_execute_times` (= retry budget + 1).
//! - `complete()` on an already-COMPLETE mono is an idempotent no-op.

use std::sync::{Arc, Mutex, OnceLock, RwLock};

use futures::FutureExt;

use crate::error::{StoreError, TransitionError, WorkError};
use crate::events::{Bus, Event, EventKind};
use crate::hooks::MonoHooks;
use crate::keeper::MonoSnapshot;
use crate::mono::{MonoStatus, WorkRef};
use crate::store::MonoStore;

/// Shared handle to a mono.
pub type MonoRef = Arc<Mono>;

/// Mutable lifecycle state, guarded by one lock.
struct MonoState {
    status: MonoStatus,
    execute_times: u32,
    reason: Option<String>,
}

/// A single schedulable unit of work tagged with an owning key.
///
/// Construct through [`Mono::builder`]; share as [`MonoRef`].
pub struct Mono {
    id: String,
    unique_code: String,
    option: String,
    work: WorkRef,
    max_execute_times: OnceLock<u32>,
    state: RwLock<MonoState>,
    store: Option<Arc<dyn MonoStore>>,
    hooks: Mutex<Option<Arc<dyn MonoHooks>>>,
    bus: OnceLock<Bus>,
}

impl Mono {
    /// Starts building a mono with the given id, serialization key, and work.
    pub fn builder(
        id: impl Into<String>,
        unique_code: impl Into<String>,
        work: WorkRef,
    ) -> MonoBuilder {
        MonoBuilder {
            id: id.into(),
            unique_code: unique_code.into(),
            option: String::new(),
            work,
            retry_times: None,
            status: MonoStatus::Ready,
            store: None,
            hooks: None,
        }
    }

    // ---- identity & observation ----

    /// Unique mono id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The serialization key; monos sharing it never run concurrently.
    pub fn unique_code(&self) -> &str {
        &self.unique_code
    }

    /// Operation discriminator supplied by the embedder.
    pub fn option(&self) -> &str {
        &self.option
    }

    /// The embedder-supplied work.
    pub fn work(&self) -> &WorkRef {
        &self.work
    }

    /// Current lifecycle state.
    pub fn status(&self) -> MonoStatus {
        self.read_state().status
    }

    /// Number of attempts started so far.
    pub fn execute_times(&self) -> u32 {
        self.read_state().execute_times
    }

    /// Attempts allowed (= retry budget + 1).
    ///
    /// A mono built without its own budget reports a single attempt until
    /// a keeper admits it and applies the configured default.
    pub fn max_execute_times(&self) -> u32 {
        self.max_execute_times.get().copied().unwrap_or(1)
    }

    /// Last recorded failure/retry reason, if any.
    pub fn reason(&self) -> Option<String> {
        self.read_state().reason.clone()
    }

    /// Point-in-time view for `Keeper::export`.
    pub fn snapshot(&self) -> MonoSnapshot {
        let st = self.read_state();
        MonoSnapshot {
            id: self.id.clone(),
            unique_code: self.unique_code.clone(),
            option: self.option.clone(),
            status: st.status,
            execute_times: st.execute_times,
            max_execute_times: self.max_execute_times(),
            reason: st.reason.clone(),
        }
    }

    /// Registers (replacing any previous) lifecycle hooks.
    ///
    /// Actuators call this right before submission; embedders may install
    /// their own listeners the same way.
    pub fn set_hooks(&self, hooks: Arc<dyn MonoHooks>) {
        *self.lock_hooks() = Some(hooks);
    }

    // ---- transitions ----

    /// Resets the mono for (re)submission: counters cleared, status READY.
    ///
    /// Legal from READY or any terminal state; illegal while the mono is
    /// owned by a flux.
    pub async fn ready(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if st.status.is_active() {
                return Err(TransitionError::Illegal {
                    from: st.status,
                    to: MonoStatus::Ready,
                });
            }
            st.status = MonoStatus::Ready;
            st.execute_times = 0;
            st.reason = None;
        }
        self.persist().await;
        Ok(())
    }

    /// READY → PENDING. Called by the flux on admission; the READY gate is
    /// what keeps a mono a member of at most one flux at a time.
    pub async fn pending(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if st.status != MonoStatus::Ready {
                return Err(TransitionError::Illegal {
                    from: st.status,
                    to: MonoStatus::Pending,
                });
            }
            st.status = MonoStatus::Pending;
        }
        self.settle(EventKind::MonoPending).await;
        Ok(())
    }

    /// PENDING → EXECUTING, starting attempt 1.
    ///
    /// Fails if the mono is not PENDING or has already been attempted.
    pub async fn executing(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if st.status != MonoStatus::Pending || st.execute_times != 0 {
                return Err(TransitionError::Illegal {
                    from: st.status,
                    to: MonoStatus::Executing,
                });
            }
            st.status = MonoStatus::Executing;
            st.execute_times = 1;
        }
        self.settle(EventKind::MonoExecuting).await;
        Ok(())
    }

    /// EXECUTING/RETRYING → RETRYING, starting the next attempt.
    ///
    /// Returns [`TransitionError::RetriesExhausted`] once the budget is
    /// spent; the caller must transition to FAILED instead.
    pub async fn retrying(&self, err: &WorkError) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if !matches!(st.status, MonoStatus::Executing | MonoStatus::Retrying) {
                return Err(TransitionError::Illegal {
                    from: st.status,
                    to: MonoStatus::Retrying,
                });
            }
            if st.execute_times >= self.max_execute_times() {
                return Err(TransitionError::RetriesExhausted {
                    times: st.execute_times,
                });
            }
            st.status = MonoStatus::Retrying;
            st.execute_times += 1;
            st.reason = Some(err.to_string());
        }
        self.settle(EventKind::MonoRetrying).await;
        Ok(())
    }

    /// EXECUTING/RETRYING → COMPLETE.
    ///
    /// Idempotent: a mono already COMPLETE returns `Ok(())` without side
    /// effects. Any other state is an illegal transition (e.g. a concurrent
    /// revoke raced ahead), which callers escalate to `failed()`.
    pub async fn complete(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            match st.status {
                MonoStatus::Complete => return Ok(()),
                MonoStatus::Executing | MonoStatus::Retrying => {
                    st.status = MonoStatus::Complete;
                }
                from => {
                    return Err(TransitionError::Illegal {
                        from,
                        to: MonoStatus::Complete,
                    })
                }
            }
        }
        self.settle(EventKind::MonoComplete).await;
        Ok(())
    }

    /// Any state → FAILED (always legal, terminal).
    pub async fn failed(&self, reason: impl Into<String>) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            st.status = MonoStatus::Failed;
            st.reason = Some(reason.into());
        }
        self.settle(EventKind::MonoFailed).await;
        Ok(())
    }

    /// PENDING/EXECUTING/RETRYING → REVOKE.
    ///
    /// Used for explicit cancellation and for crash recovery; a revoked mono
    /// never runs (or never runs again).
    pub async fn revoke(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if !st.status.is_active() {
                return Err(TransitionError::Illegal {
                    from: st.status,
                    to: MonoStatus::Revoke,
                });
            }
            st.status = MonoStatus::Revoke;
        }
        self.settle(EventKind::MonoRevoked).await;
        Ok(())
    }

    /// Any state → TIMEOUT.
    ///
    /// A caller-facing marker for work it stopped waiting on; the queue
    /// itself never calls this.
    pub async fn timeout(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            st.status = MonoStatus::Timeout;
        }
        self.persist().await;
        self.publish(EventKind::MonoTimeout);
        Ok(())
    }

    /// Removes the mono from its store, if one is attached.
    ///
    /// Deletion is an explicit caller action, independent of terminal state.
    pub async fn delete(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.delete_mono(self).await,
            None => Ok(()),
        }
    }

    // ---- crate-internal plumbing ----

    /// PENDING → READY without side effects. Used only by the flux
    /// idle-close path to requeue monos caught in the close window.
    pub(crate) fn requeue(&self) -> Result<(), TransitionError> {
        let mut st = self.write_state();
        if st.status != MonoStatus::Pending {
            return Err(TransitionError::Illegal {
                from: st.status,
                to: MonoStatus::Ready,
            });
        }
        st.status = MonoStatus::Ready;
        st.execute_times = 0;
        Ok(())
    }

    /// Wires the keeper's bus into the mono. First attachment wins;
    /// resubmission through the same keeper is a no-op.
    pub(crate) fn attach_bus(&self, bus: &Bus) {
        let _ = self.bus.set(bus.clone());
    }

    /// Applies the keeper's configured attempt budget at admission. First
    /// write wins, like [`Mono::attach_bus`]: an explicit builder budget
    /// (or an earlier admission) takes precedence.
    pub(crate) fn apply_default_budget(&self, max_execute_times: u32) {
        let _ = self.max_execute_times.set(max_execute_times);
    }

    // ---- side effects (always outside the state lock) ----

    /// Best-effort persistence; failures are published, never propagated.
    async fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.update_mono(self).await {
                self.publish_event(
                    Event::now(EventKind::StoreDegraded)
                        .with_mono(self.id.as_str())
                        .with_code(self.unique_code.as_str())
                        .with_reason(e.to_string()),
                );
            }
        }
    }

    /// Persists, then runs the matching hook (panic-isolated), then
    /// publishes the lifecycle event.
    async fn settle(&self, kind: EventKind) {
        self.persist().await;

        let hooks = self.lock_hooks().clone();
        if let Some(h) = hooks {
            let fut = async {
                match kind {
                    EventKind::MonoPending => h.on_pending(self).await,
                    EventKind::MonoExecuting => h.on_executing(self).await,
                    EventKind::MonoRetrying => h.on_retrying(self).await,
                    EventKind::MonoComplete => h.on_complete(self).await,
                    EventKind::MonoFailed => h.on_failed(self).await,
                    EventKind::MonoRevoked => h.on_revoke(self).await,
                    _ => {}
                }
            };
            if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                self.publish_event(
                    Event::now(EventKind::HookPanicked)
                        .with_mono(self.id.as_str())
                        .with_code(self.unique_code.as_str()),
                );
            }
        }

        self.publish(kind);
    }

    fn publish(&self, kind: EventKind) {
        let st = self.read_state();
        let mut ev = Event::now(kind)
            .with_mono(self.id.as_str())
            .with_code(self.unique_code.as_str())
            .with_attempt(st.execute_times);
        if let Some(reason) = &st.reason {
            ev = ev.with_reason(reason.as_str());
        }
        drop(st);
        self.publish_event(ev);
    }

    fn publish_event(&self, ev: Event) {
        if let Some(bus) = self.bus.get() {
            bus.publish(ev);
        }
    }

    // ---- lock helpers (poison-tolerant; hooks run outside the lock) ----

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MonoState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MonoState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn MonoHooks>>> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Mono {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.read_state();
        f.debug_struct("Mono")
            .field("id", &self.id)
            .field("unique_code", &self.unique_code)
            .field("option", &self.option)
            .field("status", &st.status)
            .field("execute_times", &st.execute_times)
            .field("max_execute_times", &self.max_execute_times())
            .finish()
    }
}

/// Builder for [`Mono`].
pub struct MonoBuilder {
    id: String,
    unique_code: String,
    option: String,
    work: WorkRef,
    retry_times: Option<u32>,
    status: MonoStatus,
    store: Option<Arc<dyn MonoStore>>,
    hooks: Option<Arc<dyn MonoHooks>>,
}

impl MonoBuilder {
    /// Sets the operation discriminator.
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.option = option.into();
        self
    }

    /// Sets the retry budget; attempts allowed = `retry_times + 1`.
    /// Overrides the owning keeper's configured default.
    pub fn retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = Some(retry_times);
        self
    }

    /// Sets the initial status. Defaults to READY; a
    /// [`RecoverySource`](crate::RecoverySource) rebuilding persisted monos
    /// uses this to restore the state they crashed in.
    pub fn status(mut self, status: MonoStatus) -> Self {
        self.status = status;
        self
    }

    /// Attaches a persistence sink.
    pub fn store(mut self, store: Arc<dyn MonoStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches lifecycle hooks.
    pub fn hooks(mut self, hooks: Arc<dyn MonoHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Builds the mono in READY state and returns a shared handle.
    pub fn build(self) -> MonoRef {
        let max_execute_times = OnceLock::new();
        if let Some(retry_times) = self.retry_times {
            let _ = max_execute_times.set(retry_times.saturating_add(1));
        }
        Arc::new(Mono {
            id: self.id,
            unique_code: self.unique_code,
            option: self.option,
            work: self.work,
            max_execute_times,
            state: RwLock::new(MonoState {
                status: self.status,
                execute_times: 0,
                reason: None,
            }),
            store: self.store,
            hooks: Mutex::new(self.hooks),
            bus: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mono::WorkFn;

    fn mono(retry: u32) -> MonoRef {
        Mono::builder("m-1", "dev-1", WorkFn::arc(|| async { Ok(()) }))
            .retry_times(retry)
            .build()
    }

    #[test]
    fn default_budget_fills_unset_only() {
        let m = Mono::builder("m-1", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
        assert_eq!(m.max_execute_times(), 1);
        m.apply_default_budget(3);
        assert_eq!(m.max_execute_times(), 3);
        m.apply_default_budget(9); // no-op, already set
        assert_eq!(m.max_execute_times(), 3);

        let explicit = mono(0);
        explicit.apply_default_budget(3);
        assert_eq!(explicit.max_execute_times(), 1);
    }

    #[tokio::test]
    async fn happy_path_edges() {
        let m = mono(0);
        assert_eq!(m.status(), MonoStatus::Ready);
        m.pending().await.unwrap();
        m.executing().await.unwrap();
        assert_eq!(m.execute_times(), 1);
        m.complete().await.unwrap();
        assert_eq!(m.status(), MonoStatus::Complete);
    }

    #[tokio::test]
    async fn pending_requires_ready() {
        let m = mono(0);
        m.pending().await.unwrap();
        let err = m.pending().await.unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[tokio::test]
    async fn executing_rejects_second_attempt_entry() {
        let m = mono(1);
        m.pending().await.unwrap();
        m.executing().await.unwrap();
        assert!(m.executing().await.is_err());
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let m = mono(1); // two attempts total
        m.pending().await.unwrap();
        m.executing().await.unwrap();

        let err = WorkError::fail("boom");
        m.retrying(&err).await.unwrap();
        assert_eq!(m.execute_times(), 2);
        assert!(matches!(
            m.retrying(&err).await.unwrap_err(),
            TransitionError::RetriesExhausted { times: 2 }
        ));
        assert!(m.execute_times() <= m.max_execute_times());
    }

    #[tokio::test]
    async fn complete_is_idempotent_when_complete() {
        let m = mono(0);
        m.pending().await.unwrap();
        m.executing().await.unwrap();
        m.complete().await.unwrap();
        assert!(m.complete().await.is_ok());
    }

    #[tokio::test]
    async fn complete_after_revoke_is_illegal() {
        let m = mono(0);
        m.pending().await.unwrap();
        m.revoke().await.unwrap();
        assert!(m.complete().await.is_err());
    }

    #[tokio::test]
    async fn failed_is_always_legal() {
        let m = mono(0);
        m.failed("explicit").await.unwrap();
        assert_eq!(m.status(), MonoStatus::Failed);
        assert_eq!(m.reason().as_deref(), Some("explicit"));
        // even from terminal
        m.failed("again").await.unwrap();
    }

    #[tokio::test]
    async fn revoke_requires_active_state() {
        let m = mono(0);
        assert!(m.revoke().await.is_err()); // READY
        m.pending().await.unwrap();
        m.revoke().await.unwrap();
        assert_eq!(m.status(), MonoStatus::Revoke);
    }

    #[tokio::test]
    async fn ready_resets_counters_after_terminal() {
        let m = mono(0);
        m.pending().await.unwrap();
        m.executing().await.unwrap();
        m.complete().await.unwrap();
        m.ready().await.unwrap();
        assert_eq!(m.status(), MonoStatus::Ready);
        assert_eq!(m.execute_times(), 0);
    }

    #[tokio::test]
    async fn ready_is_illegal_while_active() {
        let m = mono(0);
        m.pending().await.unwrap();
        assert!(m.ready().await.is_err());
    }
}
