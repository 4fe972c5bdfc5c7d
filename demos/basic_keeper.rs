//! # Example: basic_keeper
//!
//! Minimal fire-and-forget submission: monos on the same key run strictly in
//! order, monos on different keys run in parallel.
//!
//! Run with:
//! ```text
//! cargo run --example basic_keeper
//! ```

use std::{sync::Arc, time::Duration};

use monoflux::{Keeper, KeeperConfig, Mono, MonoRef, WorkFn};

fn make_mono(id: &str, code: &str, work_ms: u64) -> MonoRef {
    let label = format!("{code}/{id}");
    Mono::builder(
        id,
        code,
        WorkFn::arc(move || {
            let label = label.clone();
            async move {
                println!("[{label}] start (work {work_ms}ms)");
                tokio::time::sleep(Duration::from_millis(work_ms)).await;
                println!("[{label}] done");
                Ok(())
            }
        }),
    )
    .build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let keeper = Keeper::builder(KeeperConfig::default()).build();
    keeper.run_workers().await;

    // same key: serialized; different key: concurrent
    let monos = vec![
        make_mono("m-1", "dev-1", 300),
        make_mono("m-2", "dev-1", 100),
        make_mono("m-3", "dev-2", 200),
    ];
    let handles: Vec<MonoRef> = monos.iter().map(Arc::clone).collect();
    keeper.add_monos(monos).await?;

    while handles.iter().any(|m| !m.status().is_terminal()) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    println!("{}", serde_json::to_string_pretty(&keeper.export().await)?);
    keeper.shutdown().await;
    Ok(())
}
