use chrono::Utc;
use tracing::{info, warn};

use super::super::LifecycleController;
use crate::error::{GateError, GateResult};
use crate::sink::{CURRENCY_KEY, REVENUE_EVENT, REVENUE_KEY};
use crate::vendor::EventParams;

pub(crate) const TAG_PROBE: &str = "probe";

const TEST_REVENUE: &str = "9.99";
const TEST_CURRENCY: &str = "USD";

pub(crate) async fn check_cached_state_impl(controller: &LifecycleController) -> String {
    let inventory = controller.storage.inventory().await;
    info!(started = controller.is_started(), "vendor cache inventory:\n{inventory}");
    inventory
}

fn test_params() -> EventParams {
    let mut params = EventParams::new();
    params.insert("test_param".to_string(), "test_value".to_string());
    params.insert(
        "timestamp".to_string(),
        Utc::now().timestamp_millis().to_string(),
    );
    params
}

fn probe_result(
    controller: &LifecycleController,
    operation: &str,
    result: Result<(), crate::vendor::VendorError>,
) -> GateResult<()> {
    match result {
        Ok(()) => {
            controller.diag.bus.post(
                TAG_PROBE,
                format!("{operation} sent (started={})", controller.is_started()),
            );
            Ok(())
        }
        Err(e) => {
            warn!(operation, error = %e, "probe call failed");
            Err(GateError::vendor(operation, e))
        }
    }
}

pub(crate) async fn log_test_event_impl(
    controller: &LifecycleController,
    name: &str,
) -> GateResult<()> {
    warn!(
        event = name,
        started = controller.is_started(),
        "probe: direct vendor log_event, bypassing the gate"
    );
    let result = controller.vendor.log_event(name, &test_params()).await;
    probe_result(controller, "log_event", result)
}

pub(crate) async fn log_test_revenue_impl(controller: &LifecycleController) -> GateResult<()> {
    warn!(
        revenue = TEST_REVENUE,
        currency = TEST_CURRENCY,
        started = controller.is_started(),
        "probe: direct vendor revenue event, bypassing the gate"
    );
    let mut params = test_params();
    params.insert(REVENUE_KEY.to_string(), TEST_REVENUE.to_string());
    params.insert(CURRENCY_KEY.to_string(), TEST_CURRENCY.to_string());
    let result = controller.vendor.log_event(REVENUE_EVENT, &params).await;
    probe_result(controller, "log_revenue", result)
}

pub(crate) async fn set_test_user_id_impl(
    controller: &LifecycleController,
    user_id: &str,
) -> GateResult<()> {
    warn!(
        started = controller.is_started(),
        "probe: direct vendor set_customer_user_id, bypassing the gate"
    );
    let result = controller.vendor.set_customer_user_id(user_id).await;
    probe_result(controller, "set_customer_user_id", result)
}
