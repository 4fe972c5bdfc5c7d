//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [executing] mono=warmup attempt=1
//! [retrying] mono=warmup attempt=2 err="connection refused"
//! [failed] mono=warmup err="connection refused"
//! [complete] mono=warmup
//! [flux-opened] code=dev-1
//! [shutdown-requested]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event descriptions
/// to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::MonoExecuting => {
                if let (Some(mono), Some(att)) = (&e.mono, e.attempt) {
                    println!("[executing] mono={mono} attempt={att}");
                }
            }
            EventKind::MonoRetrying => {
                println!(
                    "[retrying] mono={:?} attempt={:?} err={:?}",
                    e.mono, e.attempt, e.reason
                );
            }
            EventKind::MonoComplete => {
                println!("[complete] mono={:?}", e.mono);
            }
            EventKind::MonoFailed => {
                println!("[failed] mono={:?} err={:?}", e.mono, e.reason);
            }
            EventKind::MonoRevoked => {
                println!("[revoked] mono={:?}", e.mono);
            }
            EventKind::MonoTimeout => {
                println!("[timeout] mono={:?}", e.mono);
            }
            EventKind::FluxOpened => {
                println!("[flux-opened] code={:?}", e.code);
            }
            EventKind::FluxClosed => {
                println!("[flux-closed] code={:?}", e.code);
            }
            EventKind::FluxResubmitted => {
                println!("[flux-resubmitted] code={:?} mono={:?}", e.code, e.mono);
            }
            EventKind::GroupExecuting => {
                println!("[group-executing] group={:?}", e.group);
            }
            EventKind::GroupComplete => {
                println!("[group-complete] group={:?}", e.group);
            }
            EventKind::GroupFailed => {
                println!("[group-failed] group={:?} err={:?}", e.group, e.reason);
            }
            EventKind::WorkerStarted => {
                println!("[worker-started] worker={:?}", e.worker);
            }
            EventKind::WorkerRetired => {
                println!("[worker-retired] worker={:?}", e.worker);
            }
            EventKind::RecoveryStarted => {
                println!("[recovery-started]");
            }
            EventKind::RecoveryFinished => {
                println!("[recovery-finished]");
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::AllWorkersRetired => {
                println!("[all-workers-retired]");
            }
            _ => {
                println!("[{}] mono={:?} reason={:?}", e.kind.as_label(), e.mono, e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
