//! Reactive glue from live consent signals to lifecycle transitions.
//!
//! The loop watches the consent store and the CMP source, re-evaluates on
//! every distinct `(granted, cmp)` pair and drives the controller. Watch
//! channels keep only the newest value, so changes that arrive while a
//! transition is in flight are coalesced and the loop acts on the latest
//! state once it is free again.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cmp::CmpSnapshot;
use crate::config::GateConfig;
use crate::consent::{format_set, ConsentSnapshot, ConsentType};
use crate::error::{GateError, GateResult};
use crate::lifecycle::LifecycleController;
use crate::mapper::{self, AuthorizationDecision};
use crate::registry::{SdkId, SdkRegistry};
use crate::vendor::VendorConsent;

pub const TAG_DECISION: &str = "decision";
pub const TAG_POLICY: &str = "policy";

/// How the GDPR-subject flag is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GdprResolver {
    Always,
    Never,
    /// Use the CMP's jurisdiction flag. Unresolved counts as a subject.
    #[default]
    FromCmp,
}

impl GdprResolver {
    pub fn is_subject(&self, cmp: &CmpSnapshot) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::FromCmp => cmp.jurisdiction_applies.resolve(true),
        }
    }
}

impl fmt::Display for GdprResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::FromCmp => "from_cmp",
        })
    }
}

impl FromStr for GdprResolver {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "from_cmp" | "from-cmp" | "cmp" => Ok(Self::FromCmp),
            other => Err(GateError::Config {
                message: format!("unknown gdpr mode '{other}' (expected always, never or from_cmp)"),
            }),
        }
    }
}

/// One evaluated signal combination and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRecord {
    /// Evaluation counter, starting at 1.
    pub seq: u64,
    pub decision: AuthorizationDecision,
    pub granted: BTreeSet<ConsentType>,
    pub cmp: CmpSnapshot,
    pub gdpr_subject: bool,
    /// The resulting transition completed without error.
    pub applied: bool,
}

/// Consent coordinator for one vendor SDK.
pub struct Coordinator {
    controller: Arc<LifecycleController>,
    sdk: SdkId,
    required: BTreeSet<ConsentType>,
    gdpr: GdprResolver,
    purge_on_revoke: bool,
    consent_rx: watch::Receiver<ConsentSnapshot>,
    cmp_rx: watch::Receiver<CmpSnapshot>,
}

impl Coordinator {
    /// The required consent set is resolved from `registry` once, here.
    pub fn new(
        controller: Arc<LifecycleController>,
        registry: &SdkRegistry,
        sdk: SdkId,
        consent_rx: watch::Receiver<ConsentSnapshot>,
        cmp_rx: watch::Receiver<CmpSnapshot>,
    ) -> Self {
        Self {
            controller,
            sdk,
            required: registry.required_consent(sdk),
            gdpr: GdprResolver::default(),
            purge_on_revoke: true,
            consent_rx,
            cmp_rx,
        }
    }

    pub fn from_config(
        config: &GateConfig,
        controller: Arc<LifecycleController>,
        registry: &SdkRegistry,
        consent_rx: watch::Receiver<ConsentSnapshot>,
        cmp_rx: watch::Receiver<CmpSnapshot>,
    ) -> Self {
        Self::new(controller, registry, config.vendor, consent_rx, cmp_rx)
            .with_gdpr(config.gdpr)
            .with_purge_on_revoke(config.purge_on_revoke)
    }

    pub fn with_gdpr(mut self, gdpr: GdprResolver) -> Self {
        self.gdpr = gdpr;
        self
    }

    pub fn with_purge_on_revoke(mut self, purge: bool) -> Self {
        self.purge_on_revoke = purge;
        self
    }

    pub fn required(&self) -> &BTreeSet<ConsentType> {
        &self.required
    }

    /// Decision for one signal combination. No side effects.
    pub fn evaluate(&self, granted: &BTreeSet<ConsentType>, cmp: &CmpSnapshot) -> AuthorizationDecision {
        mapper::effective(
            granted,
            &self.required,
            self.gdpr.is_subject(cmp),
            cmp.ready,
            cmp.has_transparency_string,
        )
    }

    /// Spawn the coordination loop on the current tokio runtime.
    pub fn start(self) -> CoordinatorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (decision_tx, decision_rx) = watch::channel(None);
        let task_handle = tokio::spawn(self.run(shutdown_rx, decision_tx));
        CoordinatorHandle {
            shutdown_tx,
            task_handle,
            decision_rx,
        }
    }

    async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        decision_tx: watch::Sender<Option<DecisionRecord>>,
    ) {
        info!(
            sdk = %self.sdk,
            required = %format_set(&self.required),
            gdpr = %self.gdpr,
            "coordinator started"
        );
        if self.required.is_empty() {
            warn!(
                sdk = %self.sdk,
                "policy requires no consent for this sdk; it will start on CMP state alone (unconfigured policy?)"
            );
            self.controller.diagnostics().bus.post(
                TAG_POLICY,
                format!("{} has an empty consent requirement", self.sdk),
            );
        }

        let mut last: Option<(BTreeSet<ConsentType>, CmpSnapshot)> = None;
        let mut seq = 0u64;

        loop {
            let granted = self.consent_rx.borrow_and_update().granted.clone();
            let cmp = *self.cmp_rx.borrow_and_update();
            let key = (granted, cmp);

            if last.as_ref() == Some(&key) {
                debug!("signal repeat without a distinct combination, skipped");
            } else {
                seq += 1;
                let record = self.apply(seq, &key.0, key.1).await;
                decision_tx.send_replace(Some(record));
                last = Some(key);
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!(sdk = %self.sdk, "coordinator shutting down");
                    break;
                }
                changed = self.consent_rx.changed() => {
                    if changed.is_err() {
                        warn!("consent source closed, coordinator stopping");
                        break;
                    }
                }
                changed = self.cmp_rx.changed() => {
                    if changed.is_err() {
                        warn!("cmp source closed, coordinator stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn apply(&self, seq: u64, granted: &BTreeSet<ConsentType>, cmp: CmpSnapshot) -> DecisionRecord {
        let gdpr_subject = self.gdpr.is_subject(&cmp);
        let decision = self.evaluate(granted, &cmp);
        info!(
            seq,
            allow = decision.allow,
            reason = ?decision.reason,
            granted = %format_set(granted),
            gdpr_subject,
            cmp_ready = cmp.ready,
            has_transparency_string = cmp.has_transparency_string,
            "consent decision"
        );
        self.controller.diagnostics().bus.post(
            TAG_DECISION,
            format!("allow={} ({:?})", decision.allow, decision.reason),
        );

        let result = if decision.allow {
            self.open(granted, gdpr_subject).await
        } else {
            self.controller.revoke(self.purge_on_revoke).await.map(|_| ())
        };
        if let Err(e) = &result {
            error!(seq, allow = decision.allow, error = %e, "transition failed, waiting for next signal change");
        }

        DecisionRecord {
            seq,
            decision,
            granted: granted.clone(),
            cmp,
            gdpr_subject,
            applied: result.is_ok(),
        }
    }

    async fn open(&self, granted: &BTreeSet<ConsentType>, gdpr_subject: bool) -> GateResult<()> {
        self.controller.bootstrap().await?;
        self.controller
            .set_consent_data(VendorConsent {
                gdpr_subject,
                data_usage: true,
                ad_personalization: granted.contains(&ConsentType::Personalization),
            })
            .await?;
        self.controller.grant().await?;
        Ok(())
    }
}

/// Handle to a running coordinator. Dropping it stops the loop.
pub struct CoordinatorHandle {
    shutdown_tx: watch::Sender<bool>,
    task_handle: JoinHandle<()>,
    decision_rx: watch::Receiver<Option<DecisionRecord>>,
}

impl CoordinatorHandle {
    /// Stop the loop and wait for it. An in-flight transition completes.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task_handle.await {
            error!(error = %e, "coordinator task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Latest applied decision, `None` until the first evaluation finishes.
    pub fn last_decision(&self) -> watch::Receiver<Option<DecisionRecord>> {
        self.decision_rx.clone()
    }
}
