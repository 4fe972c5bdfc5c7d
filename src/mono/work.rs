//! # Work abstraction and function-backed work implementation.
//!
//! This module defines the [`Work`] trait (the embedder-supplied unit of
//! work) and a convenient function-backed implementation [`WorkFn`]. The
//! common handle type is [`WorkRef`], an `Arc<dyn Work>` suitable for
//! sharing across the runtime.
//!
//! There is no active cancellation: once an attempt starts it runs to
//! completion. Work should therefore be reasonably bounded, and must be
//! idempotent: the queue guarantees at-least-once execution, not
//! exactly-once.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkError;

/// Shared handle to a unit of work.
pub type WorkRef = Arc<dyn Work>;

/// # Asynchronous unit of work.
///
/// A mono's (or group's) `run` is invoked by the flux dispatch loop while
/// the mono holds its key's serialization slot. The returned error drives
/// the retry policy: a retryable error consumes one unit of the budget, a
/// fatal one fails the mono immediately.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use monoflux::{Work, WorkError};
///
/// struct SyncDevice;
///
/// #[async_trait]
/// impl Work for SyncDevice {
///     async fn run(&self) -> Result<(), WorkError> {
///         // talk to the device...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Work: Send + Sync + 'static {
    /// Executes one attempt of the work.
    async fn run(&self) -> Result<(), WorkError>;
}

/// Function-backed work implementation.
///
/// Wraps a closure that *creates* a new future per attempt, so retries never
/// observe half-consumed state from a previous attempt. If attempts need
/// shared state, move an `Arc<...>` into the closure explicitly.
pub struct WorkFn<F> {
    f: F,
}

impl<F> WorkFn<F> {
    /// Creates new function-backed work.
    ///
    /// Prefer [`WorkFn::arc`] when you immediately need a [`WorkRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the work and returns it as a shared handle (`Arc<dyn Work>`).
    ///
    /// # Example
    /// ```
    /// use monoflux::{WorkError, WorkFn, WorkRef};
    ///
    /// let w: WorkRef = WorkFn::arc(|| async { Ok::<_, WorkError>(()) });
    /// ```
    pub fn arc<Fut>(f: F) -> Arc<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Work for WorkFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), WorkError> {
        (self.f)().await
    }
}
