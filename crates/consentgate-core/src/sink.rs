//! Event-delivery targets behind the application-facing logging API.
//!
//! Application code never checks authorization itself: it calls the
//! controller, which forwards to whichever sink is active.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::diag::Tripwire;
use crate::error::{GateError, GateResult};
use crate::vendor::{EventParams, VendorSdk};

/// Vendor event name used for revenue.
pub const REVENUE_EVENT: &str = "af_purchase";
pub const REVENUE_KEY: &str = "af_revenue";
pub const CURRENCY_KEY: &str = "af_currency";

/// Which implementation a sink is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Noop,
    Vendor,
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    async fn log_event(&self, name: &str, params: &EventParams) -> GateResult<()>;

    async fn set_user_id(&self, user_id: &str) -> GateResult<()>;

    async fn log_revenue(
        &self,
        revenue: &str,
        currency: &str,
        params: &EventParams,
    ) -> GateResult<()>;
}

/// Sink used while consent is denied. Never reaches the vendor.
#[derive(Debug, Clone)]
pub struct NoopSink {
    tripwire: Tripwire,
}

impl NoopSink {
    pub fn new(tripwire: Tripwire) -> Self {
        Self { tripwire }
    }
}

#[async_trait]
impl AnalyticsSink for NoopSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Noop
    }

    async fn log_event(&self, name: &str, _params: &EventParams) -> GateResult<()> {
        self.tripwire.gate_mismatch(&format!("log_event({name})"));
        Ok(())
    }

    async fn set_user_id(&self, _user_id: &str) -> GateResult<()> {
        self.tripwire.gate_mismatch("set_user_id");
        Ok(())
    }

    async fn log_revenue(
        &self,
        revenue: &str,
        currency: &str,
        _params: &EventParams,
    ) -> GateResult<()> {
        self.tripwire
            .gate_mismatch(&format!("log_revenue({revenue} {currency})"));
        Ok(())
    }
}

/// Sink used while consent is granted. Wraps every vendor call.
pub struct VendorSink {
    vendor: Arc<dyn VendorSdk>,
}

impl VendorSink {
    pub fn new(vendor: Arc<dyn VendorSdk>) -> Self {
        Self { vendor }
    }
}

#[async_trait]
impl AnalyticsSink for VendorSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Vendor
    }

    async fn log_event(&self, name: &str, params: &EventParams) -> GateResult<()> {
        info!(event = name, "vendor log_event");
        self.vendor
            .log_event(name, params)
            .await
            .map_err(|e| GateError::vendor("log_event", e))
    }

    async fn set_user_id(&self, user_id: &str) -> GateResult<()> {
        info!("vendor set_customer_user_id");
        self.vendor
            .set_customer_user_id(user_id)
            .await
            .map_err(|e| GateError::vendor("set_customer_user_id", e))
    }

    async fn log_revenue(
        &self,
        revenue: &str,
        currency: &str,
        params: &EventParams,
    ) -> GateResult<()> {
        info!(revenue, currency, "vendor log_revenue");
        let mut params = params.clone();
        params.insert(REVENUE_KEY.to_string(), revenue.to_string());
        params.insert(CURRENCY_KEY.to_string(), currency.to_string());
        self.vendor
            .log_event(REVENUE_EVENT, &params)
            .await
            .map_err(|e| GateError::vendor("log_revenue", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::vendor::{RecordingVendor, VendorCall};

    #[tokio::test]
    async fn test_noop_sink_never_touches_vendor() {
        let diag = Diagnostics::default();
        let sink = NoopSink::new(diag.tripwire.clone());
        sink.log_event("x", &EventParams::new()).await.unwrap();
        sink.set_user_id("u1").await.unwrap();
        sink.log_revenue("9.99", "USD", &EventParams::new())
            .await
            .unwrap();
        assert_eq!(diag.metrics.snapshot().blocked_calls, 3);
        assert_eq!(diag.metrics.snapshot().tripwire_hits, 0);
    }

    #[tokio::test]
    async fn test_vendor_sink_revenue_params() {
        let vendor = Arc::new(RecordingVendor::new());
        let sink = VendorSink::new(vendor.clone());
        let mut params = EventParams::new();
        params.insert("sku".into(), "pro".into());
        sink.log_revenue("9.99", "USD", &params).await.unwrap();

        match &vendor.calls()[0] {
            VendorCall::LogEvent { name, params } => {
                assert_eq!(name, REVENUE_EVENT);
                assert_eq!(params[REVENUE_KEY], "9.99");
                assert_eq!(params[CURRENCY_KEY], "USD");
                assert_eq!(params["sku"], "pro");
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vendor_sink_maps_failures() {
        let vendor = Arc::new(RecordingVendor::new());
        vendor.fail_on("log_event");
        let sink = VendorSink::new(vendor);
        let err = sink.log_event("x", &EventParams::new()).await.unwrap_err();
        assert!(err.is_vendor());
    }
}
