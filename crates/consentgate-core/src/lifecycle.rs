//! Vendor SDK lifecycle controller.
//!
//! Owns the vendor handle, the lifecycle state and the active sink. The
//! state and the sink are published together as one immutable [`GateView`],
//! so a reader can never observe `Started` with the no-op sink or the
//! vendor sink while stopped.
//!
//! ```text
//!                 bootstrap()                    grant()
//! Uninitialized ─────────────▶ BootstrappedStopped ───────▶ Started
//!       │                              ▲                      │
//!       └──────── grant() ─────────────┼──────────────────────┘
//!                                      └──── revoke(purge) ───┘
//! ```
//!
//! Transitions are serialized by an async mutex; reads never wait on it.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::warn;

use crate::config::GateConfig;
use crate::diag::{Diagnostics, Metrics};
use crate::error::GateResult;
use crate::sink::{AnalyticsSink, NoopSink, SinkKind, VendorSink};
use crate::storage::VendorStorage;
use crate::vendor::{EventParams, VendorConsent, VendorSdk};

#[path = "lifecycle_internal/mod.rs"]
mod lifecycle_internal;

/// Event bus tag for lifecycle transitions.
pub const TAG_GATE: &str = "gate";

/// Vendor SDK lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Vendor never initialized; no listener registered.
    Uninitialized,
    /// Listener registered, data transmission off.
    BootstrappedStopped,
    /// Data transmission on.
    Started,
}

/// Result of an idempotent lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Applied,
    Unchanged,
}

/// State and sink, published atomically.
#[derive(Clone)]
pub struct GateView {
    pub state: LifecycleState,
    pub sink: Arc<dyn AnalyticsSink>,
}

impl GateView {
    pub fn is_started(&self) -> bool {
        self.state == LifecycleState::Started
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.sink.kind()
    }
}

impl fmt::Debug for GateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateView")
            .field("state", &self.state)
            .field("sink", &self.sink.kind())
            .finish()
    }
}

/// Consent-gated controller for one vendor SDK.
pub struct LifecycleController {
    vendor: Arc<dyn VendorSdk>,
    dev_key: String,
    storage: VendorStorage,
    diag: Diagnostics,
    view: Arc<ArcSwap<GateView>>,
    noop_sink: Arc<dyn AnalyticsSink>,
    vendor_sink: Arc<dyn AnalyticsSink>,
    transition: Mutex<()>,
    state_tx: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    /// Create a controller. The vendor is not touched until `bootstrap` or
    /// `grant`.
    pub fn new(
        vendor: Arc<dyn VendorSdk>,
        dev_key: impl Into<String>,
        storage: VendorStorage,
        diag: Diagnostics,
    ) -> Self {
        let noop_sink: Arc<dyn AnalyticsSink> = Arc::new(NoopSink::new(diag.tripwire.clone()));
        let vendor_sink: Arc<dyn AnalyticsSink> = Arc::new(VendorSink::new(vendor.clone()));
        let view = Arc::new(ArcSwap::from_pointee(GateView {
            state: LifecycleState::Uninitialized,
            sink: noop_sink.clone(),
        }));
        let (state_tx, _rx) = watch::channel(LifecycleState::Uninitialized);
        Self {
            vendor,
            dev_key: dev_key.into(),
            storage,
            diag,
            view,
            noop_sink,
            vendor_sink,
            transition: Mutex::new(()),
            state_tx,
        }
    }

    /// Create a controller from gate configuration.
    pub fn from_config(config: &GateConfig, vendor: Arc<dyn VendorSdk>, diag: Diagnostics) -> Self {
        Self::new(vendor, config.dev_key.clone(), config.vendor_storage(), diag)
    }

    /// Register instrumentation with the vendor, exactly once.
    pub async fn bootstrap(&self) -> GateResult<Transition> {
        let _guard = self.transition.lock().await;
        lifecycle_internal::transitions::bootstrap_impl(self).await
    }

    /// Authorization became true: start the vendor and open the gate.
    pub async fn grant(&self) -> GateResult<Transition> {
        let _guard = self.transition.lock().await;
        lifecycle_internal::transitions::grant_impl(self).await
    }

    /// Authorization became false: close the gate, stop the vendor and
    /// optionally purge its on-disk state.
    pub async fn revoke(&self, purge: bool) -> GateResult<Transition> {
        let _guard = self.transition.lock().await;
        lifecycle_internal::transitions::revoke_impl(self, purge).await
    }

    /// Forward consent flags to the vendor's own consent API.
    pub async fn set_consent_data(&self, consent: VendorConsent) -> GateResult<()> {
        let _guard = self.transition.lock().await;
        lifecycle_internal::transitions::set_consent_data_impl(self, consent).await
    }

    pub async fn log_event(&self, name: &str, params: &EventParams) -> GateResult<()> {
        let view = self.view();
        let result = view.sink.log_event(name, params).await;
        self.observe_call("log_event", result)
    }

    pub async fn set_user_id(&self, user_id: &str) -> GateResult<()> {
        let view = self.view();
        let result = view.sink.set_user_id(user_id).await;
        self.observe_call("set_user_id", result)
    }

    pub async fn log_revenue(
        &self,
        revenue: &str,
        currency: &str,
        params: &EventParams,
    ) -> GateResult<()> {
        let view = self.view();
        let result = view.sink.log_revenue(revenue, currency, params).await;
        self.observe_call("log_revenue", result)
    }

    /// Inventory of vendor files on disk. Read-only, never fails.
    pub async fn check_cached_state(&self) -> String {
        lifecycle_internal::probes::check_cached_state_impl(self).await
    }

    /// Call the vendor's `log_event` directly, bypassing the sink.
    ///
    /// Probes whether the vendor itself honours `stop`; not for
    /// application use.
    pub async fn log_test_event(&self, name: &str) -> GateResult<()> {
        lifecycle_internal::probes::log_test_event_impl(self, name).await
    }

    /// Direct vendor revenue event, bypassing the sink.
    pub async fn log_test_revenue(&self) -> GateResult<()> {
        lifecycle_internal::probes::log_test_revenue_impl(self).await
    }

    /// Direct vendor user id call, bypassing the sink.
    pub async fn set_test_user_id(&self, user_id: &str) -> GateResult<()> {
        lifecycle_internal::probes::set_test_user_id_impl(self, user_id).await
    }

    /// Current published view. Lock-free.
    pub fn view(&self) -> Arc<GateView> {
        self.view.load_full()
    }

    pub fn state(&self) -> LifecycleState {
        self.view.load().state
    }

    pub fn is_started(&self) -> bool {
        self.view.load().is_started()
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.view.load().sink.kind()
    }

    /// Live lifecycle state, replayed to new subscribers.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn storage(&self) -> &VendorStorage {
        &self.storage
    }

    fn observe_call(&self, api: &str, result: GateResult<()>) -> GateResult<()> {
        if let Err(e) = &result {
            Metrics::incr(&self.diag.metrics.failures);
            warn!(api, error = %e, "vendor call through sink failed");
        }
        result
    }
}
