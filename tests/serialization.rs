//! End-to-end scenarios: per-key ordering, admission, retries, idle-close,
//! recovery, actuators, and shutdown.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time;

use monoflux::{
    Actuator, ActuatorError, AdmissionError, Event, EventKind, Group, GroupActuator, GroupKeeper,
    Keeper, KeeperConfig, KeeperStatus, Mono, MonoRef, MonoStatus, QueueActuator, RecoverySource,
    StoreError, Subscribe, WorkError, WorkFn,
};

fn fast_cfg() -> KeeperConfig {
    KeeperConfig {
        idle_timeout: Duration::from_millis(50),
        settle_delay: Duration::from_millis(20),
        recovery_delay: Duration::from_millis(50),
        ..KeeperConfig::default()
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

struct CollectEvents(Arc<Mutex<Vec<EventKind>>>);

#[async_trait]
impl Subscribe for CollectEvents {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "collect"
    }
}

#[tokio::test]
async fn same_key_runs_in_submission_order() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mk = |id: &'static str, fail: bool| {
        let order = Arc::clone(&order);
        Mono::builder(
            id,
            "dev-1",
            WorkFn::arc(move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(id);
                    if fail {
                        Err(WorkError::fatal("device jammed"))
                    } else {
                        Ok(())
                    }
                }
            }),
        )
        .build()
    };

    let m1 = mk("m-1", false);
    let m2 = mk("m-2", true);
    let m3 = mk("m-3", false);

    keeper
        .add_monos(vec![m1.clone(), m2.clone(), m3.clone()])
        .await
        .unwrap();

    wait_until(|| {
        m1.status().is_terminal() && m2.status().is_terminal() && m3.status().is_terminal()
    })
    .await;

    assert_eq!(*order.lock().unwrap(), vec!["m-1", "m-2", "m-3"]);
    assert_eq!(m1.status(), MonoStatus::Complete);
    assert_eq!(m2.status(), MonoStatus::Failed);
    assert_eq!(m3.status(), MonoStatus::Complete);
    // one attempt only: the error was fatal
    assert_eq!(m2.execute_times(), 1);
    assert!(m2.reason().unwrap().contains("device jammed"));

    keeper.shutdown().await;
}

#[tokio::test]
async fn different_keys_run_concurrently() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let mk = |id: &'static str, code: &'static str| {
        let spans = Arc::clone(&spans);
        Mono::builder(
            id,
            code,
            WorkFn::arc(move || {
                let spans = Arc::clone(&spans);
                async move {
                    let start = Instant::now();
                    time::sleep(Duration::from_millis(200)).await;
                    spans.lock().unwrap().push((start, Instant::now()));
                    Ok(())
                }
            }),
        )
        .build()
    };

    let a = mk("a-1", "dev-a");
    let b = mk("b-1", "dev-b");
    keeper.add_monos(vec![a.clone(), b.clone()]).await.unwrap();

    wait_until(|| a.status().is_terminal() && b.status().is_terminal()).await;

    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 2);
    let (s1, e1) = spans[0];
    let (s2, e2) = spans[1];
    // both executions overlapped in time
    assert!(s1 < e2 && s2 < e1);

    keeper.shutdown().await;
}

#[tokio::test]
async fn admission_refused_before_workers_start() {
    let keeper = Keeper::builder(fast_cfg()).build();
    let mono = Mono::builder("m-1", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();

    let err = keeper.add_mono(mono.clone()).await.unwrap_err();
    assert_eq!(err, AdmissionError::NotRunning);
    assert_eq!(mono.status(), MonoStatus::Ready);
    assert!(keeper.export().await.fluxes.is_empty());
}

#[tokio::test]
async fn check_probes_without_enqueuing() {
    let cfg = KeeperConfig {
        max_queue_limit: 1,
        ..fast_cfg()
    };
    let keeper = Keeper::builder(cfg).build();
    keeper.run_workers().await;

    let slow = Mono::builder(
        "m-slow",
        "dev-1",
        WorkFn::arc(|| async {
            time::sleep(Duration::from_millis(500)).await;
            Ok(())
        }),
    )
    .build();
    keeper.add_mono(slow.clone()).await.unwrap();

    let probe = Mono::builder("m-probe", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
    let err = keeper.check(&probe).await.unwrap_err();
    assert!(matches!(err, AdmissionError::QueueFull { limit: 1, .. }));

    // a real submission is refused the same way, and neither mutated anything
    let err = keeper.add_mono(probe.clone()).await.unwrap_err();
    assert!(matches!(err, AdmissionError::QueueFull { limit: 1, .. }));
    assert_eq!(probe.status(), MonoStatus::Ready);
    let snap = keeper.export().await;
    assert_eq!(snap.fluxes.len(), 1);
    assert_eq!(snap.fluxes[0].monos.len(), 1);

    wait_until(|| slow.status().is_terminal()).await;
    keeper.shutdown().await;
}

#[tokio::test]
async fn duplicate_ids_are_rejected_per_key() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let first = Mono::builder(
        "m-dup",
        "dev-1",
        WorkFn::arc(|| async {
            time::sleep(Duration::from_millis(300)).await;
            Ok(())
        }),
    )
    .build();
    keeper.add_mono(first.clone()).await.unwrap();

    let second = Mono::builder("m-dup", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
    let err = keeper.add_mono(second).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Duplicate { .. }));

    wait_until(|| first.status().is_terminal()).await;
    keeper.shutdown().await;
}

#[tokio::test]
async fn retry_budget_retries_then_succeeds() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let mono = Mono::builder(
        "m-retry",
        "dev-1",
        WorkFn::arc(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WorkError::fail("transient"))
                } else {
                    Ok(())
                }
            }
        }),
    )
    .retry_times(2)
    .build();

    keeper.add_mono(mono.clone()).await.unwrap();
    wait_until(|| mono.status().is_terminal()).await;

    assert_eq!(mono.status(), MonoStatus::Complete);
    assert_eq!(mono.execute_times(), 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    keeper.shutdown().await;
}

#[tokio::test]
async fn exhausted_budget_fails_with_last_error() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let mono = Mono::builder(
        "m-exhaust",
        "dev-1",
        WorkFn::arc(|| async { Err(WorkError::fail("still down")) }),
    )
    .retry_times(1)
    .build();

    keeper.add_mono(mono.clone()).await.unwrap();
    wait_until(|| mono.status().is_terminal()).await;

    assert_eq!(mono.status(), MonoStatus::Failed);
    assert_eq!(mono.execute_times(), 2);
    assert!(mono.reason().unwrap().contains("still down"));

    keeper.shutdown().await;
}

#[tokio::test]
async fn keeper_retry_budget_applies_to_monos_without_their_own() {
    let keeper = Keeper::builder(KeeperConfig {
        retry_times: 2,
        ..fast_cfg()
    })
    .build();
    keeper.run_workers().await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let mono = Mono::builder(
        "m-inherit",
        "dev-8",
        WorkFn::arc(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WorkError::fail("transient"))
                } else {
                    Ok(())
                }
            }
        }),
    )
    .build();

    keeper.add_mono(mono.clone()).await.unwrap();
    wait_until(|| mono.status().is_terminal()).await;

    assert_eq!(mono.status(), MonoStatus::Complete);
    assert_eq!(mono.max_execute_times(), 3);
    assert_eq!(mono.execute_times(), 3);

    // an explicit per-mono budget still wins over the keeper's
    let own = Mono::builder(
        "m-own",
        "dev-8",
        WorkFn::arc(|| async { Err(WorkError::fail("still down")) }),
    )
    .retry_times(0)
    .build();
    keeper.add_mono(own.clone()).await.unwrap();
    wait_until(|| own.status().is_terminal()).await;

    assert_eq!(own.status(), MonoStatus::Failed);
    assert_eq!(own.execute_times(), 1);

    keeper.shutdown().await;
}

#[tokio::test]
async fn revoked_mono_is_dropped_at_dequeue() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let slow = Mono::builder(
        "m-slow",
        "dev-6",
        WorkFn::arc(|| async {
            time::sleep(Duration::from_millis(150)).await;
            Ok(())
        }),
    )
    .build();

    let ran = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&ran);
    let victim = Mono::builder(
        "m-victim",
        "dev-6",
        WorkFn::arc(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .build();

    keeper
        .add_monos(vec![slow.clone(), victim.clone()])
        .await
        .unwrap();
    // the worker is still busy with the slow mono; the victim is queued
    keeper.revoke_mono(&victim).await.unwrap();

    wait_until(|| slow.status() == MonoStatus::Complete).await;
    time::sleep(Duration::from_millis(50)).await;

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(victim.status(), MonoStatus::Revoke);

    keeper.shutdown().await;
}

#[tokio::test]
async fn flux_reopens_after_idle_close() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(CollectEvents(Arc::clone(&events)))];
    let keeper = Keeper::builder(fast_cfg()).with_subscribers(subs).build();
    keeper.run_workers().await;

    let m1 = Mono::builder("m-1", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
    keeper.add_mono(m1.clone()).await.unwrap();
    wait_until(|| m1.status().is_terminal()).await;

    // past the idle timeout the flux deregisters itself
    wait_until(|| {
        events
            .lock()
            .unwrap()
            .iter()
            .any(|k| *k == EventKind::FluxClosed)
    })
    .await;
    assert!(keeper.export().await.fluxes.is_empty());

    // the same key is served again by a fresh flux
    let m2 = Mono::builder("m-2", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
    keeper.add_mono(m2.clone()).await.unwrap();
    wait_until(|| m2.status().is_terminal()).await;
    assert_eq!(m2.status(), MonoStatus::Complete);

    wait_until(|| {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == EventKind::FluxOpened)
            .count()
            == 2
    })
    .await;

    keeper.shutdown().await;
}

struct OrphanSource {
    monos: Mutex<Vec<MonoRef>>,
}

#[async_trait]
impl RecoverySource for OrphanSource {
    async fn fetch_uncomplete_monos(&self) -> Result<Vec<MonoRef>, StoreError> {
        Ok(self.monos.lock().unwrap().clone())
    }

    async fn fetch_uncomplete_groups(&self) -> Result<Vec<monoflux::GroupRef>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn recovery_sweep_revokes_orphans_before_running() {
    let orphan = Mono::builder("m-orphan", "dev-1", WorkFn::arc(|| async { Ok(()) }))
        .status(MonoStatus::Pending)
        .build();
    let never_admitted = Mono::builder("m-ready", "dev-2", WorkFn::arc(|| async { Ok(()) }))
        .status(MonoStatus::Ready)
        .build();

    let src = Arc::new(OrphanSource {
        monos: Mutex::new(vec![orphan.clone(), never_admitted.clone()]),
    });
    let keeper = Keeper::builder(fast_cfg()).with_recovery(src).build();
    keeper.run_workers().await;

    // admission stays refused until the sweep has run
    let early = Mono::builder("m-early", "dev-3", WorkFn::arc(|| async { Ok(()) })).build();
    assert_eq!(
        keeper.add_mono(early).await.unwrap_err(),
        AdmissionError::NotRunning
    );

    wait_until(|| orphan.status() == MonoStatus::Revoke).await;
    wait_until(|| never_admitted.status() == MonoStatus::Failed).await;

    let keeper_status = keeper.status().await;
    assert_eq!(keeper_status, KeeperStatus::Running);

    keeper.shutdown().await;
}

#[tokio::test]
async fn queue_actuator_aggregates_partial_failure() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let mut monos = Vec::new();
    for i in 0..5 {
        let fails = i == 1 || i == 3;
        monos.push(
            Mono::builder(
                format!("m-{i}"),
                format!("dev-{i}"),
                WorkFn::arc(move || async move {
                    if fails {
                        Err(WorkError::fatal("bad member"))
                    } else {
                        Ok(())
                    }
                }),
            )
            .build(),
        );
    }

    let actuator = QueueActuator::new(Arc::clone(&keeper));
    let outcome = actuator.exec(monos).await.unwrap();

    assert_eq!(outcome.success(), 3);
    assert_eq!(outcome.failed(), 2);
    assert!(matches!(
        outcome.error(),
        Some(ActuatorError::Partial { failed: 2, total: 5 })
    ));
    assert!(outcome.results["m-1"].as_ref().unwrap().contains("bad member"));
    assert!(outcome.results["m-0"].is_none());

    keeper.shutdown().await;
}

#[tokio::test]
async fn actuator_resolves_success_and_failure() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;
    let actuator = Actuator::new(Arc::clone(&keeper));

    let ok = Mono::builder("m-ok", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
    actuator.exec(ok).await.unwrap();

    let bad = Mono::builder(
        "m-bad",
        "dev-1",
        WorkFn::arc(|| async { Err(WorkError::fatal("no such tape")) }),
    )
    .build();
    match actuator.exec(bad).await.unwrap_err() {
        ActuatorError::Failed { reason } => assert!(reason.contains("no such tape")),
        other => panic!("expected Failed, got {other:?}"),
    }

    keeper.shutdown().await;
}

#[tokio::test]
async fn actuator_timeout_abandons_wait_not_work() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let mono = Mono::builder(
        "m-slow",
        "dev-1",
        WorkFn::arc(|| async {
            time::sleep(Duration::from_millis(300)).await;
            Ok(())
        }),
    )
    .build();

    let actuator = Actuator::new(Arc::clone(&keeper)).with_wait(Duration::from_millis(50));
    let err = actuator.exec(mono.clone()).await.unwrap_err();
    assert!(matches!(err, ActuatorError::Timeout { .. }));

    // the mono keeps running and settles on its own
    wait_until(|| mono.status().is_terminal()).await;
    assert_eq!(mono.status(), MonoStatus::Complete);

    keeper.shutdown().await;
}

#[tokio::test]
async fn shutdown_refuses_further_admission() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;
    keeper.shutdown().await;

    assert_eq!(keeper.status().await, KeeperStatus::Stopped);
    let mono = Mono::builder("m-late", "dev-1", WorkFn::arc(|| async { Ok(()) })).build();
    assert_eq!(
        keeper.add_mono(mono).await.unwrap_err(),
        AdmissionError::NotRunning
    );
}

#[tokio::test]
async fn group_keeper_serializes_one_group_per_key() {
    let keeper = GroupKeeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let member = Mono::builder("m-1", "site-1", WorkFn::arc(|| async { Ok(()) })).build();
    let g1 = Group::builder(
        "g-1",
        "site-1",
        vec![member],
        WorkFn::arc(|| async {
            time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }),
    )
    .build();
    keeper.add_group(g1.clone()).await.unwrap();

    // the key is busy while g-1 is non-terminal
    let g2 = Group::builder("g-2", "site-1", vec![], WorkFn::arc(|| async { Ok(()) })).build();
    let err = keeper.add_group(g2).await.unwrap_err();
    assert!(matches!(err, AdmissionError::KeyBusy { .. }));

    wait_until(|| g1.status().is_terminal()).await;
    assert_eq!(g1.status(), monoflux::GroupStatus::Complete);

    // the worker deregisters the group after driving it
    for _ in 0..200 {
        if keeper.export().await.groups.is_empty() {
            break;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    assert!(keeper.export().await.groups.is_empty());

    let g3 = Group::builder("g-3", "site-1", vec![], WorkFn::arc(|| async { Ok(()) })).build();
    keeper.add_group(g3.clone()).await.unwrap();
    wait_until(|| g3.status().is_terminal()).await;

    keeper.shutdown().await;
}

#[tokio::test]
async fn group_admission_failure_reports_group_id() {
    let keeper = GroupKeeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let group =
        Group::builder("g-once", "site-3", vec![], WorkFn::arc(|| async { Ok(()) })).build();
    keeper.add_group(Arc::clone(&group)).await.unwrap();
    wait_until(|| group.status().is_terminal()).await;

    // a terminal group frees the key but cannot itself be resubmitted
    match keeper.add_group(Arc::clone(&group)).await.unwrap_err() {
        AdmissionError::NotReady { id } => assert_eq!(id, "g-once"),
        other => panic!("expected NotReady, got {other:?}"),
    }

    keeper.shutdown().await;
}

#[tokio::test]
async fn group_actuator_awaits_group_outcome() {
    let keeper = GroupKeeper::builder(fast_cfg()).build();
    keeper.run_workers().await;
    let actuator = GroupActuator::new(Arc::clone(&keeper));

    let ok = Group::builder("g-ok", "site-9", vec![], WorkFn::arc(|| async { Ok(()) })).build();
    actuator.exec(ok).await.unwrap();

    let bad = Group::builder(
        "g-bad",
        "site-9",
        vec![],
        WorkFn::arc(|| async { Err(WorkError::fatal("batch failed")) }),
    )
    .build();
    match actuator.exec(bad).await.unwrap_err() {
        ActuatorError::Failed { reason } => assert!(reason.contains("batch failed")),
        other => panic!("expected Failed, got {other:?}"),
    }

    keeper.shutdown().await;
}

#[tokio::test]
async fn export_json_reflects_runtime_state() {
    let keeper = Keeper::builder(fast_cfg()).build();
    keeper.run_workers().await;

    let json = keeper.export_json().await.unwrap();
    assert_eq!(json["status"], "running");
    assert_eq!(json["workers"], 4);
    assert!(json["fluxes"].as_array().unwrap().is_empty());

    keeper.shutdown().await;
}
