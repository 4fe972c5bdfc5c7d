//! # Example: actuator_wait
//!
//! Submit-and-await with an [`Actuator`], retries included, with the
//! built-in [`LogWriter`] printing every runtime event.
//!
//! Run with:
//! ```text
//! cargo run --example actuator_wait --features logging
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::{sync::Arc, time::Duration};

use monoflux::{Actuator, Keeper, KeeperConfig, LogWriter, Mono, Subscribe, WorkError, WorkFn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = KeeperConfig {
        retry_times: 2,
        task_interval: Duration::from_millis(100),
        ..KeeperConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let keeper = Keeper::builder(cfg).with_subscribers(subs).build();
    keeper.run_workers().await;

    // fails twice, then succeeds on the third attempt
    let attempts = Arc::new(AtomicU32::new(0));
    let mono = Mono::builder(
        "flaky-1",
        "dev-1",
        WorkFn::arc(move || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WorkError::fail("connection refused"))
                } else {
                    Ok(())
                }
            }
        }),
    )
    .retry_times(2)
    .build();

    let actuator = Actuator::new(Arc::clone(&keeper)).with_wait(Duration::from_secs(5));
    match actuator.exec(mono).await {
        Ok(()) => println!("mono completed"),
        Err(e) => println!("mono did not complete: {e}"),
    }

    keeper.shutdown().await;
    Ok(())
}
