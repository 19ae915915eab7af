use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use consentgate_core::diag::BusEvent;
use consentgate_core::vendor::VendorCall;
use consentgate_core::{
    ConsentStore, ConsentType, CoordinatorHandle, DecisionRecord, EventParams, Gate, GateConfig,
    LifecycleState, MemoryConsentStore, MetricsSnapshot, RecordingVendor, SdkRegistry, SinkKind,
};
use serde::Serialize;
use tracing::{info, warn};

use super::simulate_script::{Script, Step};
use crate::cli::args::SimulateArgs;
use crate::exit_codes;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct StepOutcome {
    index: usize,
    step: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    name: Option<String>,
    generated_at: DateTime<Utc>,
    final_state: LifecycleState,
    sink: SinkKind,
    decisions: Vec<DecisionRecord>,
    steps: Vec<StepOutcome>,
    metrics: MetricsSnapshot,
    vendor_calls: Vec<VendorCall>,
    events: Vec<BusEvent>,
    cache: String,
}

pub async fn run(args: SimulateArgs) -> Result<i32> {
    let registry = match SdkRegistry::from_path(&args.policy) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("✘ Policy invalid: {}: {e}", args.policy.display());
            return Ok(exit_codes::POLICY_ERROR);
        }
    };
    let script = Script::load(&args.script)?;

    // Keep the temp dir alive for the whole run.
    let temp_dir;
    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => {
            temp_dir = tempfile::tempdir().context("failed to create temp data dir")?;
            temp_dir.path().to_path_buf()
        }
    };

    let mut config = GateConfig::from_env()
        .with_data_dir(&data_dir)
        .with_purge_on_revoke(!args.no_purge);
    if let Some(gdpr) = args.gdpr {
        config = config.with_gdpr(gdpr);
    }
    let cache_dir = config.storage_layout().cache_dir;

    let vendor = Arc::new(RecordingVendor::new().with_buffer_dir(cache_dir));
    let store = Arc::new(MemoryConsentStore::new());
    let gate = Gate::new(config, registry, vendor.clone(), store.clone());
    let handle = gate.start();

    info!(
        script = %args.script.display(),
        steps = script.steps.len(),
        data_dir = %data_dir.display(),
        "simulation started"
    );

    let mut decisions: Vec<DecisionRecord> = Vec::new();
    let mut outcomes = Vec::with_capacity(script.steps.len());
    let mut saw_vendor_error = false;

    settle(&gate, &handle, &mut decisions).await?;
    for (index, step) in script.steps.iter().enumerate() {
        let outcome = run_step(&gate, &vendor, &store, script.user_id.as_deref(), step).await;
        let (ok, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(e) => {
                saw_vendor_error |= e.is_vendor();
                warn!(index, error = %e, "step failed");
                (false, Some(e.to_string()))
            }
        };
        if matches!(step, Step::Consent(_) | Step::Cmp(_)) {
            settle(&gate, &handle, &mut decisions).await?;
        }
        outcomes.push(StepOutcome {
            index,
            step: describe(step),
            ok,
            detail,
        });
    }

    handle.shutdown().await;

    let controller = gate.controller();
    let report = SimulationReport {
        name: script.name,
        generated_at: Utc::now(),
        final_state: controller.state(),
        sink: controller.sink_kind(),
        decisions,
        steps: outcomes,
        metrics: gate.diagnostics().metrics.snapshot(),
        vendor_calls: vendor.calls(),
        events: gate.diagnostics().bus.snapshot(),
        cache: controller.check_cached_state().await,
    };

    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?,
        None => println!("{json}"),
    }

    if report.metrics.tripwire_hits > 0 {
        eprintln!(
            "✘ Tripwire fired {} time(s): vendor activity while the gate was closed",
            report.metrics.tripwire_hits
        );
        return Ok(exit_codes::TRIPWIRE);
    }
    if saw_vendor_error {
        return Ok(exit_codes::VENDOR_ERROR);
    }
    Ok(exit_codes::SUCCESS)
}

async fn run_step(
    gate: &Gate,
    vendor: &RecordingVendor,
    store: &MemoryConsentStore,
    user_id: Option<&str>,
    step: &Step,
) -> consentgate_core::GateResult<Option<String>> {
    let controller = gate.controller();
    match step {
        Step::Consent(raw) => {
            let (granted, unknown) = ConsentType::decode_lossy(raw);
            for value in &unknown {
                warn!(value = %value, "dropping unknown consent category in script");
            }
            store.update(granted, user_id.map(str::to_string)).await?;
            Ok(None)
        }
        Step::Cmp(cmp) => {
            gate.cmp().update((*cmp).into());
            Ok(None)
        }
        Step::Settle(ms) => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(None)
        }
        Step::LogEvent(name) => {
            controller.log_event(name, &EventParams::new()).await?;
            Ok(None)
        }
        Step::LogRevenue(r) => {
            controller
                .log_revenue(&r.revenue, &r.currency, &EventParams::new())
                .await?;
            Ok(None)
        }
        Step::UserId(id) => {
            controller.set_user_id(id).await?;
            Ok(None)
        }
        Step::ProbeEvent(name) => {
            controller.log_test_event(name).await?;
            Ok(None)
        }
        Step::Callback(callback) => {
            if vendor.emit(callback.clone()) {
                Ok(None)
            } else {
                Ok(Some("no listener registered (vendor never initialized)".to_string()))
            }
        }
        Step::CheckCache => Ok(Some(controller.check_cached_state().await)),
    }
}

/// Wait until the coordinator has acted on the current signal values.
async fn settle(
    gate: &Gate,
    handle: &CoordinatorHandle,
    decisions: &mut Vec<DecisionRecord>,
) -> Result<()> {
    let granted = gate.consent().current().await.granted;
    let cmp = gate.cmp().current();
    let mut rx = handle.last_decision();
    let record = tokio::time::timeout(
        SETTLE_TIMEOUT,
        rx.wait_for(|d| {
            d.as_ref()
                .is_some_and(|d| d.granted == granted && d.cmp == cmp)
        }),
    )
    .await
    .context("coordinator did not settle in time")?
    .context("coordinator stopped")?
    .clone();

    if let Some(record) = record {
        if decisions.last().map(|d| d.seq) != Some(record.seq) {
            decisions.push(record);
        }
    }
    Ok(())
}

fn describe(step: &Step) -> String {
    match step {
        Step::Consent(raw) => format!("consent {}", raw.join(",")),
        Step::Cmp(c) => format!(
            "cmp ready={} tcf={} jurisdiction={:?}",
            c.ready, c.has_transparency_string, c.jurisdiction
        ),
        Step::Settle(ms) => format!("settle {ms}ms"),
        Step::LogEvent(name) => format!("log_event {name}"),
        Step::LogRevenue(r) => format!("log_revenue {} {}", r.revenue, r.currency),
        Step::UserId(_) => "user_id".to_string(),
        Step::ProbeEvent(name) => format!("probe_event {name}"),
        Step::Callback(cb) => format!("callback {}", cb.name()),
        Step::CheckCache => "check_cache".to_string(),
    }
}
