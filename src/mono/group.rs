//! # Group: a composite of monos sharing one submission and lifecycle.
//!
//! A [`Group`] holds an ordered list of monos plus its own
//! [`Work`](crate::Work) (typically a fan-out over the member monos via the
//! same keeper machinery, or a bespoke batch routine). The state machine is
//! simpler than the mono's:
//!
//! ```text
//! READY ──pending()──► PENDING ──executing()──► EXECUTING ──► COMPLETE | FAILED
//! ```
//!
//! There is no RETRYING: retry is delegated to the constituent monos.
//! `complete()`/`failed()` on an already-terminal group are idempotent
//! no-ops.

use std::sync::{Arc, Mutex, OnceLock, RwLock};

use futures::FutureExt;

use crate::error::{StoreError, TransitionError};
use crate::events::{Bus, Event, EventKind};
use crate::hooks::GroupHooks;
use crate::keeper::GroupSnapshot;
use crate::mono::{GroupStatus, MonoRef, MonoStatus, WorkRef};
use crate::store::GroupStore;

/// Shared handle to a group.
pub type GroupRef = Arc<Group>;

struct GroupState {
    status: GroupStatus,
    reason: Option<String>,
}

/// A unit of work composed of multiple monos.
///
/// Construct through [`Group::builder`]; share as [`GroupRef`].
pub struct Group {
    id: String,
    unique_code: String,
    option: String,
    monos: Vec<MonoRef>,
    work: WorkRef,
    state: RwLock<GroupState>,
    sequence: OnceLock<u64>,
    store: Option<Arc<dyn GroupStore>>,
    hooks: Mutex<Option<Arc<dyn GroupHooks>>>,
    bus: OnceLock<Bus>,
}

impl Group {
    /// Starts building a group with the given id, serialization key,
    /// members, and batch work.
    pub fn builder(
        id: impl Into<String>,
        unique_code: impl Into<String>,
        monos: Vec<MonoRef>,
        work: WorkRef,
    ) -> GroupBuilder {
        GroupBuilder {
            id: id.into(),
            unique_code: unique_code.into(),
            option: String::new(),
            monos,
            work,
            store: None,
            hooks: None,
        }
    }

    // ---- identity & observation ----

    /// Unique group id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The group's serialization key.
    pub fn unique_code(&self) -> &str {
        &self.unique_code
    }

    /// Operation discriminator supplied by the embedder.
    pub fn option(&self) -> &str {
        &self.option
    }

    /// The member monos, in submission order.
    pub fn monos(&self) -> &[MonoRef] {
        &self.monos
    }

    /// The batch work.
    pub fn work(&self) -> &WorkRef {
        &self.work
    }

    /// Current lifecycle state.
    pub fn status(&self) -> GroupStatus {
        self.read_state().status
    }

    /// Last recorded failure reason, if any.
    pub fn reason(&self) -> Option<String> {
        self.read_state().reason.clone()
    }

    /// Per-key sequence number stamped at admission, if the store issued one.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence.get().copied()
    }

    /// Point-in-time view for `GroupKeeper::export`.
    pub fn snapshot(&self) -> GroupSnapshot {
        let st = self.read_state();
        GroupSnapshot {
            id: self.id.clone(),
            unique_code: self.unique_code.clone(),
            option: self.option.clone(),
            status: st.status,
            sequence: self.sequence(),
            monos: self.monos.iter().map(|m| m.snapshot()).collect(),
        }
    }

    /// Registers (replacing any previous) lifecycle hooks.
    pub fn set_hooks(&self, hooks: Arc<dyn GroupHooks>) {
        *self.lock_hooks() = Some(hooks);
    }

    // ---- transitions ----

    /// Resets the group for (re)submission.
    pub async fn ready(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if matches!(st.status, GroupStatus::Pending | GroupStatus::Executing) {
                return Err(illegal(st.status, GroupStatus::Ready));
            }
            st.status = GroupStatus::Ready;
            st.reason = None;
        }
        self.persist().await;
        Ok(())
    }

    /// READY → PENDING. Called by the group keeper on admission.
    pub async fn pending(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if st.status != GroupStatus::Ready {
                return Err(illegal(st.status, GroupStatus::Pending));
            }
            st.status = GroupStatus::Pending;
        }
        self.settle(EventKind::GroupPending).await;
        Ok(())
    }

    /// PENDING → EXECUTING.
    pub async fn executing(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            if st.status != GroupStatus::Pending {
                return Err(illegal(st.status, GroupStatus::Executing));
            }
            st.status = GroupStatus::Executing;
        }
        self.settle(EventKind::GroupExecuting).await;
        Ok(())
    }

    /// EXECUTING → COMPLETE. Idempotent no-op when already terminal.
    pub async fn complete(&self) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            match st.status {
                s if s.is_terminal() => return Ok(()),
                GroupStatus::Executing => st.status = GroupStatus::Complete,
                from => return Err(illegal(from, GroupStatus::Complete)),
            }
        }
        self.settle(EventKind::GroupComplete).await;
        Ok(())
    }

    /// EXECUTING → FAILED. Idempotent no-op when already terminal.
    pub async fn failed(&self, reason: impl Into<String>) -> Result<(), TransitionError> {
        {
            let mut st = self.write_state();
            match st.status {
                s if s.is_terminal() => return Ok(()),
                GroupStatus::Executing => {
                    st.status = GroupStatus::Failed;
                    st.reason = Some(reason.into());
                }
                from => return Err(illegal(from, GroupStatus::Failed)),
            }
        }
        self.settle(EventKind::GroupFailed).await;
        Ok(())
    }

    /// Removes the group from its store, if one is attached.
    pub async fn delete(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.delete_group(self).await,
            None => Ok(()),
        }
    }

    // ---- crate-internal plumbing ----

    /// Forces FAILED from any non-terminal state. Used only by the recovery
    /// sweep: a group's work cannot be resumed after a crash mid-execution.
    pub(crate) async fn force_failed(&self, reason: impl Into<String>) {
        {
            let mut st = self.write_state();
            if st.status.is_terminal() {
                return;
            }
            st.status = GroupStatus::Failed;
            st.reason = Some(reason.into());
        }
        self.settle(EventKind::GroupFailed).await;
    }

    /// Revokes every member mono still in a recoverable state.
    pub(crate) async fn revoke_members(&self) {
        for m in &self.monos {
            if m.status().is_active() {
                let _ = m.revoke().await;
            } else if m.status() == MonoStatus::Ready {
                // never admitted; fail it so it is not silently resumed
                let _ = m.failed("group recovered after restart").await;
            }
        }
    }

    /// Wires the keeper's bus into the group and its members.
    pub(crate) fn attach_bus(&self, bus: &Bus) {
        let _ = self.bus.set(bus.clone());
        for m in &self.monos {
            m.attach_bus(bus);
        }
    }

    /// Stamps the per-key sequence number issued by the store at admission.
    pub(crate) fn stamp_sequence(&self, seq: u64) {
        let _ = self.sequence.set(seq);
    }

    /// Records group↔mono membership in the store, best-effort.
    pub(crate) async fn link_members(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.link_group_monos(self).await {
                self.degraded(e.to_string());
            }
        }
    }

    /// Issues the next per-key sequence from the store, best-effort.
    pub(crate) async fn issue_sequence(&self) {
        if let Some(store) = &self.store {
            match store.next_sequence(&self.unique_code).await {
                Ok(seq) => self.stamp_sequence(seq),
                Err(e) => self.degraded(e.to_string()),
            }
        }
    }

    // ---- side effects (always outside the state lock) ----

    async fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.update_group(self).await {
                self.degraded(e.to_string());
            }
        }
    }

    async fn settle(&self, kind: EventKind) {
        self.persist().await;

        let hooks = self.lock_hooks().clone();
        if let Some(h) = hooks {
            let fut = async {
                match kind {
                    EventKind::GroupPending => h.on_pending(self).await,
                    EventKind::GroupExecuting => h.on_executing(self).await,
                    EventKind::GroupComplete => h.on_complete(self).await,
                    EventKind::GroupFailed => h.on_failed(self).await,
                    _ => {}
                }
            };
            if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                self.publish_event(
                    Event::now(EventKind::HookPanicked)
                        .with_group(self.id.as_str())
                        .with_code(self.unique_code.as_str()),
                );
            }
        }

        let st = self.read_state();
        let mut ev = Event::now(kind)
            .with_group(self.id.as_str())
            .with_code(self.unique_code.as_str());
        if let Some(reason) = &st.reason {
            ev = ev.with_reason(reason.as_str());
        }
        drop(st);
        self.publish_event(ev);
    }

    fn degraded(&self, reason: String) {
        self.publish_event(
            Event::now(EventKind::StoreDegraded)
                .with_group(self.id.as_str())
                .with_code(self.unique_code.as_str())
                .with_reason(reason),
        );
    }

    fn publish_event(&self, ev: Event) {
        if let Some(bus) = self.bus.get() {
            bus.publish(ev);
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, GroupState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, GroupState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn GroupHooks>>> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn illegal(from: GroupStatus, to: GroupStatus) -> TransitionError {
    // reuse the mono status vocabulary for the error surface
    TransitionError::Illegal {
        from: map_status(from),
        to: map_status(to),
    }
}

fn map_status(s: GroupStatus) -> MonoStatus {
    match s {
        GroupStatus::Ready => MonoStatus::Ready,
        GroupStatus::Pending => MonoStatus::Pending,
        GroupStatus::Executing => MonoStatus::Executing,
        GroupStatus::Complete => MonoStatus::Complete,
        GroupStatus::Failed => MonoStatus::Failed,
    }
}

/// Builder for [`Group`].
pub struct GroupBuilder {
    id: String,
    unique_code: String,
    option: String,
    monos: Vec<MonoRef>,
    work: WorkRef,
    store: Option<Arc<dyn GroupStore>>,
    hooks: Option<Arc<dyn GroupHooks>>,
}

impl GroupBuilder {
    /// Sets the operation discriminator.
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.option = option.into();
        self
    }

    /// Attaches a persistence sink.
    pub fn store(mut self, store: Arc<dyn GroupStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches lifecycle hooks.
    pub fn hooks(mut self, hooks: Arc<dyn GroupHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Builds the group in READY state and returns a shared handle.
    pub fn build(self) -> GroupRef {
        Arc::new(Group {
            id: self.id,
            unique_code: self.unique_code,
            option: self.option,
            monos: self.monos,
            work: self.work,
            state: RwLock::new(GroupState {
                status: GroupStatus::Ready,
                reason: None,
            }),
            sequence: OnceLock::new(),
            store: self.store,
            hooks: Mutex::new(self.hooks),
            bus: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mono::{Mono, WorkFn};

    fn group() -> GroupRef {
        let m = Mono::builder("m-1", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
        Group::builder("g-1", "dev-1", vec![m], WorkFn::arc(|| async { Ok(()) })).build()
    }

    #[tokio::test]
    async fn executing_requires_pending() {
        let g = group();
        assert!(g.executing().await.is_err());
        g.pending().await.unwrap();
        g.executing().await.unwrap();
        assert_eq!(g.status(), GroupStatus::Executing);
    }

    #[tokio::test]
    async fn terminal_transitions_require_executing() {
        let g = group();
        g.pending().await.unwrap();
        assert!(g.complete().await.is_err());
        assert!(g.failed("early").await.is_err());
    }

    #[tokio::test]
    async fn terminal_is_idempotent() {
        let g = group();
        g.pending().await.unwrap();
        g.executing().await.unwrap();
        g.complete().await.unwrap();
        assert!(g.complete().await.is_ok());
        assert!(g.failed("late").await.is_ok()); // no-op, stays COMPLETE
        assert_eq!(g.status(), GroupStatus::Complete);
    }

    #[tokio::test]
    async fn force_failed_covers_recovery() {
        let g = group();
        g.pending().await.unwrap();
        g.force_failed("unrecovered after restart").await;
        assert_eq!(g.status(), GroupStatus::Failed);
        assert_eq!(g.reason().as_deref(), Some("unrecovered after restart"));
    }
}
