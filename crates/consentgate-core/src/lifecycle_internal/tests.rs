use super::super::*;
use crate::sink::SinkKind;
use crate::storage::{StorageLayout, VendorFileMatcher};
use crate::vendor::recording::QUEUE_FILE_NAME;
use crate::vendor::{DeepLinkStatus, RecordingVendor, VendorCall, VendorCallback};
use std::path::Path;
use tempfile::TempDir;

fn test_controller(vendor: Arc<RecordingVendor>, data_dir: &Path) -> LifecycleController {
    LifecycleController::new(
        vendor,
        "test-dev-key",
        VendorStorage::new(StorageLayout::under(data_dir), VendorFileMatcher::default()),
        Diagnostics::default(),
    )
}

fn setup() -> (LifecycleController, Arc<RecordingVendor>, TempDir) {
    let dir = TempDir::new().unwrap();
    let vendor = Arc::new(RecordingVendor::new().with_buffer_dir(dir.path().join("cache")));
    let controller = test_controller(vendor.clone(), dir.path());
    (controller, vendor, dir)
}

fn conversion() -> VendorCallback {
    VendorCallback::ConversionData {
        keys: vec!["campaign".into(), "media_source".into()],
    }
}

#[tokio::test]
async fn test_new_controller_is_closed_and_silent() {
    let (controller, vendor, _dir) = setup();
    assert_eq!(controller.state(), LifecycleState::Uninitialized);
    assert_eq!(controller.sink_kind(), SinkKind::Noop);
    assert!(!controller.is_started());
    assert!(vendor.calls().is_empty());
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let (controller, vendor, _dir) = setup();
    assert_eq!(controller.bootstrap().await.unwrap(), Transition::Applied);
    assert_eq!(controller.bootstrap().await.unwrap(), Transition::Unchanged);

    assert_eq!(vendor.count("init"), 1);
    assert_eq!(
        vendor.calls()[..2],
        [
            VendorCall::EnableCmpDataCollection { enabled: true },
            VendorCall::Init {
                key: "test-dev-key".into()
            },
        ]
    );
    assert_eq!(controller.state(), LifecycleState::BootstrappedStopped);
    assert_eq!(controller.sink_kind(), SinkKind::Noop);
    assert_eq!(vendor.count("start"), 0);
}

#[tokio::test]
async fn test_grant_from_uninitialized_bootstraps_then_starts() {
    let (controller, vendor, _dir) = setup();
    assert_eq!(controller.grant().await.unwrap(), Transition::Applied);

    let ops: Vec<_> = vendor.calls().iter().map(|c| c.operation()).collect();
    assert_eq!(
        ops,
        vec!["enable_cmp_data_collection", "init", "stop", "start"]
    );
    assert_eq!(vendor.calls()[2], VendorCall::Stop { halt: false });
    let view = controller.view();
    assert_eq!(view.state, LifecycleState::Started);
    assert_eq!(view.sink_kind(), SinkKind::Vendor);
    assert_eq!(controller.diagnostics().metrics.snapshot().starts, 1);
}

#[tokio::test]
async fn test_grant_twice_starts_once() {
    let (controller, vendor, _dir) = setup();
    controller.grant().await.unwrap();
    assert_eq!(controller.grant().await.unwrap(), Transition::Unchanged);
    assert_eq!(vendor.count("start"), 1);
    assert_eq!(vendor.count("init"), 1);
}

#[tokio::test]
async fn test_revoke_when_not_started_is_noop() {
    let (controller, vendor, _dir) = setup();
    assert_eq!(controller.revoke(true).await.unwrap(), Transition::Unchanged);
    controller.bootstrap().await.unwrap();
    assert_eq!(controller.revoke(true).await.unwrap(), Transition::Unchanged);
    assert_eq!(vendor.count("stop"), 0);
    assert_eq!(controller.diagnostics().metrics.snapshot().stops, 0);
}

#[tokio::test]
async fn test_events_follow_the_active_sink() {
    let (controller, vendor, _dir) = setup();
    let params = EventParams::new();

    controller.log_event("before", &params).await.unwrap();
    controller.set_user_id("u1").await.unwrap();
    assert!(vendor.logged_events().is_empty());
    assert_eq!(vendor.count("set_customer_user_id"), 0);
    assert_eq!(controller.diagnostics().metrics.snapshot().blocked_calls, 2);

    controller.grant().await.unwrap();
    controller.log_event("during", &params).await.unwrap();
    controller.log_revenue("4.99", "EUR", &params).await.unwrap();

    controller.revoke(false).await.unwrap();
    controller.log_event("after", &params).await.unwrap();

    assert_eq!(
        vendor.logged_events(),
        vec!["during".to_string(), crate::sink::REVENUE_EVENT.to_string()]
    );
}

#[tokio::test]
async fn test_revoke_with_purge_removes_cached_vendor_files() {
    let (controller, vendor, dir) = setup();
    controller.grant().await.unwrap();
    controller.revoke(false).await.unwrap();

    // Vendor caches while halted, which the gate cannot prevent.
    controller.log_test_event("leaky_event").await.unwrap();
    let queue = dir.path().join("cache").join(QUEUE_FILE_NAME);
    assert!(queue.exists());
    assert!(controller
        .check_cached_state()
        .await
        .starts_with("Found 1 vendor cache files"));

    controller.grant().await.unwrap();
    controller.revoke(true).await.unwrap();
    assert!(!queue.exists());
    assert_eq!(controller.check_cached_state().await, "No vendor cache files");
    assert_eq!(controller.diagnostics().metrics.snapshot().purged_files, 1);
    assert_eq!(vendor.count("stop"), 4);
}

#[tokio::test]
async fn test_start_failure_leaves_gate_closed() {
    let (controller, vendor, _dir) = setup();
    vendor.fail_on("start");

    let err = controller.grant().await.unwrap_err();
    assert!(err.is_vendor());
    assert_eq!(controller.state(), LifecycleState::BootstrappedStopped);
    assert_eq!(controller.sink_kind(), SinkKind::Noop);
    assert_eq!(controller.diagnostics().metrics.snapshot().failures, 1);
    assert_eq!(vendor.calls().last(), Some(&VendorCall::Stop { halt: true }));

    vendor.heal("start");
    assert_eq!(controller.grant().await.unwrap(), Transition::Applied);
    assert_eq!(vendor.count("init"), 1);
}

#[tokio::test]
async fn test_init_failure_stays_uninitialized() {
    let (controller, vendor, _dir) = setup();
    vendor.fail_on("init");
    assert!(controller.bootstrap().await.is_err());
    assert_eq!(controller.state(), LifecycleState::Uninitialized);
    assert!(controller.grant().await.is_err());
    assert_eq!(vendor.count("start"), 0);
}

#[tokio::test]
async fn test_stop_failure_still_closes_gate() {
    let (controller, vendor, _dir) = setup();
    controller.grant().await.unwrap();
    vendor.fail_on("stop");

    let err = controller.revoke(true).await.unwrap_err();
    assert!(err.is_vendor());
    assert_eq!(controller.state(), LifecycleState::BootstrappedStopped);
    assert_eq!(controller.sink_kind(), SinkKind::Noop);

    controller
        .log_event("blocked", &EventParams::new())
        .await
        .unwrap();
    assert!(vendor.logged_events().is_empty());
}

#[tokio::test]
async fn test_tripwire_fires_only_while_closed() {
    let (controller, vendor, _dir) = setup();
    let tripwire = controller.diagnostics().tripwire.clone();

    controller.bootstrap().await.unwrap();
    assert!(vendor.emit(conversion()));
    assert_eq!(tripwire.hits(), 1);

    vendor.emit(VendorCallback::DeepLink {
        status: DeepLinkStatus::NotFound,
    });
    assert_eq!(tripwire.hits(), 1);

    controller.grant().await.unwrap();
    vendor.emit(conversion());
    vendor.emit(VendorCallback::DeepLink {
        status: DeepLinkStatus::Found {
            deep_link: "app://promo".into(),
        },
    });
    assert_eq!(tripwire.hits(), 1);

    controller.revoke(false).await.unwrap();
    vendor.emit(VendorCallback::AppOpenAttribution {
        keys: vec!["af_dp".into()],
    });
    assert_eq!(tripwire.hits(), 2);
    assert_eq!(
        controller
            .diagnostics()
            .bus
            .with_tag(crate::diag::tripwire::TAG_TRIPWIRE)
            .len(),
        2
    );
}

#[tokio::test]
async fn test_state_subscription_replays_latest() {
    let (controller, _vendor, _dir) = setup();
    controller.grant().await.unwrap();

    let mut rx = controller.subscribe_state();
    assert_eq!(*rx.borrow_and_update(), LifecycleState::Started);

    controller.revoke(false).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), LifecycleState::BootstrappedStopped);
}

#[tokio::test]
async fn test_probes_bypass_the_gate() {
    let (controller, vendor, _dir) = setup();
    controller.log_test_event("probe").await.unwrap();
    controller.log_test_revenue().await.unwrap();
    controller.set_test_user_id("probe_user").await.unwrap();

    assert_eq!(vendor.logged_events().len(), 2);
    assert_eq!(vendor.count("set_customer_user_id"), 1);
    assert_eq!(controller.diagnostics().metrics.snapshot().blocked_calls, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_torn_view() {
    let (controller, _vendor, _dir) = setup();
    let controller = Arc::new(controller);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..3 {
        let controller = controller.clone();
        let stop = stop.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = 0u64;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let view = controller.view();
                assert_eq!(view.is_started(), view.sink_kind() == SinkKind::Vendor);
                seen += 1;
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    for _ in 0..50 {
        controller.grant().await.unwrap();
        controller.revoke(false).await.unwrap();
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    let metrics = controller.diagnostics().metrics.snapshot();
    assert_eq!(metrics.starts, 50);
    assert_eq!(metrics.stops, 50);
}

#[tokio::test]
async fn test_grant_then_revoke_ends_stopped_with_noop_sink() {
    let (controller, vendor, _dir) = setup();
    controller.grant().await.unwrap();
    controller.revoke(true).await.unwrap();

    assert_eq!(controller.state(), LifecycleState::BootstrappedStopped);
    assert_eq!(controller.sink_kind(), SinkKind::Noop);
    assert!(!vendor.is_transmitting());
    assert_eq!(vendor.count("start"), 1);
    assert_eq!(vendor.calls().last(), Some(&VendorCall::Stop { halt: true }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grant_and_revoke_land_in_a_terminal_state() {
    for round in 0..20 {
        let dir = TempDir::new().unwrap();
        let vendor = Arc::new(
            RecordingVendor::new()
                .with_latency(std::time::Duration::from_millis(2))
                .with_buffer_dir(dir.path().join("cache")),
        );
        let controller = Arc::new(test_controller(vendor.clone(), dir.path()));
        if round % 2 == 1 {
            controller.grant().await.unwrap();
        }

        let granting = tokio::spawn({
            let controller = controller.clone();
            async move { controller.grant().await }
        });
        let revoking = tokio::spawn({
            let controller = controller.clone();
            async move { controller.revoke(true).await }
        });
        granting.await.unwrap().unwrap();
        revoking.await.unwrap().unwrap();

        let view = controller.view();
        assert!(matches!(
            view.state,
            LifecycleState::Started | LifecycleState::BootstrappedStopped
        ));
        assert_eq!(view.is_started(), view.sink_kind() == SinkKind::Vendor);
        assert_eq!(view.is_started(), vendor.is_transmitting());
        assert_eq!(controller.is_started(), controller.sink_kind() == SinkKind::Vendor);
    }
}
