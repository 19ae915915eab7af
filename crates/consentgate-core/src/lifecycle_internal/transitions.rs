use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::super::{GateView, LifecycleController, LifecycleState, Transition, TAG_GATE};
use super::listener::InstrumentationListener;
use crate::diag::Metrics;
use crate::error::{GateError, GateResult};
use crate::storage::PurgeReport;
use crate::vendor::{VendorConsent, VendorError};

pub(crate) const TAG_PURGE: &str = "purge";
pub(crate) const TAG_FAILURE: &str = "failure";

/// Swap in the view for `next`, provided nobody published since `current`
/// was loaded.
fn publish(
    controller: &LifecycleController,
    current: &Arc<GateView>,
    next: LifecycleState,
) -> GateResult<()> {
    let sink = match next {
        LifecycleState::Started => controller.vendor_sink.clone(),
        LifecycleState::Uninitialized | LifecycleState::BootstrappedStopped => {
            controller.noop_sink.clone()
        }
    };
    let previous = controller
        .view
        .compare_and_swap(current, Arc::new(GateView { state: next, sink }));
    if !Arc::ptr_eq(&previous, current) {
        error!(expected = ?current.state, found = ?previous.state, "gate view changed outside transition lock");
        return Err(GateError::StateConflict {
            expected: current.state,
            found: previous.state,
        });
    }
    controller.state_tx.send_replace(next);
    debug!(from = ?current.state, to = ?next, "gate view published");
    Ok(())
}

fn vendor_failure(controller: &LifecycleController, operation: &str, err: VendorError) -> GateError {
    Metrics::incr(&controller.diag.metrics.failures);
    error!(operation, error = %err, "vendor call failed");
    controller
        .diag
        .bus
        .post(TAG_FAILURE, format!("{operation} failed: {err}"));
    GateError::vendor(operation, err)
}

pub(crate) async fn bootstrap_impl(controller: &LifecycleController) -> GateResult<Transition> {
    let current = controller.view.load_full();
    if current.state != LifecycleState::Uninitialized {
        debug!(state = ?current.state, "bootstrap skipped: vendor already initialized");
        return Ok(Transition::Unchanged);
    }

    controller
        .vendor
        .enable_cmp_data_collection(true)
        .await
        .map_err(|e| vendor_failure(controller, "enable_cmp_data_collection", e))?;

    let listener = Arc::new(InstrumentationListener::new(
        &controller.view,
        controller.diag.clone(),
    ));
    controller
        .vendor
        .init(&controller.dev_key, listener)
        .await
        .map_err(|e| vendor_failure(controller, "init", e))?;

    publish(controller, &current, LifecycleState::BootstrappedStopped)?;
    info!("vendor bootstrapped, listener registered, transmission off");
    controller
        .diag
        .bus
        .post(TAG_GATE, "bootstrapped (listener only, not started)");
    Ok(Transition::Applied)
}

pub(crate) async fn grant_impl(controller: &LifecycleController) -> GateResult<Transition> {
    if controller.view.load().state == LifecycleState::Started {
        debug!("grant skipped: already started");
        return Ok(Transition::Unchanged);
    }

    let began = Instant::now();
    bootstrap_impl(controller).await?;
    let current = controller.view.load_full();

    // A previous revoke left the vendor halted.
    controller
        .vendor
        .stop(false)
        .await
        .map_err(|e| vendor_failure(controller, "stop", e))?;

    if let Err(e) = controller.vendor.start().await {
        let err = vendor_failure(controller, "start", e);
        if let Err(halt) = controller.vendor.stop(true).await {
            warn!(error = %halt, "could not re-halt vendor after failed start");
        }
        return Err(err);
    }

    publish(controller, &current, LifecycleState::Started)?;
    Metrics::incr(&controller.diag.metrics.starts);

    let elapsed_ms = began.elapsed().as_millis() as u64;
    info!(elapsed_ms, "vendor started, gate open");
    controller
        .diag
        .bus
        .post(TAG_GATE, format!("started in {elapsed_ms} ms"));
    Ok(Transition::Applied)
}

pub(crate) async fn revoke_impl(
    controller: &LifecycleController,
    purge: bool,
) -> GateResult<Transition> {
    let current = controller.view.load_full();
    if current.state != LifecycleState::Started {
        debug!(state = ?current.state, "revoke skipped: not started");
        return Ok(Transition::Unchanged);
    }

    let began = Instant::now();
    // Close the gate before the vendor hears about it.
    publish(controller, &current, LifecycleState::BootstrappedStopped)?;
    Metrics::incr(&controller.diag.metrics.stops);

    let stopped = controller
        .vendor
        .stop(true)
        .await
        .map_err(|e| vendor_failure(controller, "stop", e));

    if purge {
        purge_vendor_state(controller).await;
    }

    let elapsed_ms = began.elapsed().as_millis() as u64;
    info!(elapsed_ms, purge, "vendor stopped, gate closed");
    controller
        .diag
        .bus
        .post(TAG_GATE, format!("stopped in {elapsed_ms} ms (purge={purge})"));

    stopped.map(|()| Transition::Applied)
}

pub(crate) async fn set_consent_data_impl(
    controller: &LifecycleController,
    consent: VendorConsent,
) -> GateResult<()> {
    controller
        .vendor
        .set_consent_data(consent)
        .await
        .map_err(|e| vendor_failure(controller, "set_consent_data", e))?;
    info!(
        gdpr_subject = consent.gdpr_subject,
        data_usage = consent.data_usage,
        ad_personalization = consent.ad_personalization,
        "vendor consent data set"
    );
    Ok(())
}

async fn purge_vendor_state(controller: &LifecycleController) -> PurgeReport {
    let report = controller.storage.purge().await;
    let metrics = &controller.diag.metrics;
    Metrics::add(&metrics.purged_files, report.deleted as u64);
    Metrics::add(&metrics.purge_failures, report.failures.len() as u64);

    if report.is_complete() {
        info!(deleted = report.deleted, "vendor storage purged");
        controller
            .diag
            .bus
            .post(TAG_PURGE, format!("deleted {} vendor files", report.deleted));
    } else {
        warn!(
            deleted = report.deleted,
            failures = report.failures.len(),
            "vendor storage purge incomplete"
        );
        controller.diag.bus.post(
            TAG_PURGE,
            format!(
                "deleted {} vendor files, {} failed",
                report.deleted,
                report.failures.len()
            ),
        );
    }
    report
}
