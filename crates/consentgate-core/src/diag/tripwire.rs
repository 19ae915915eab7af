//! Policy-violation detector.

use std::sync::Arc;

use tracing::{error, warn};

use super::event_bus::EventBus;
use super::metrics::Metrics;

pub const TAG_TRIPWIRE: &str = "tripwire";
pub const TAG_BLOCKED: &str = "blocked";

/// Fires when vendor activity is seen while the gate is closed.
#[derive(Debug, Clone)]
pub struct Tripwire {
    metrics: Arc<Metrics>,
    bus: Arc<EventBus>,
}

impl Tripwire {
    pub fn new(metrics: Arc<Metrics>, bus: Arc<EventBus>) -> Self {
        Self { metrics, bus }
    }

    /// The vendor produced data while de-authorized. This is a violation.
    pub fn vendor_activity(&self, source: &str, detail: &str) {
        error!(source, detail, "TRIPWIRE: vendor activity while gate is closed");
        Metrics::incr(&self.metrics.tripwire_hits);
        self.bus
            .post(TAG_TRIPWIRE, format!("{source} while stopped: {detail}"));
    }

    /// An application call hit the no-op sink. Expected while de-authorized,
    /// recorded so operators can see what would have leaked.
    pub fn gate_mismatch(&self, api: &str) {
        warn!(api, "blocked call to vendor while gate is closed");
        Metrics::incr(&self.metrics.blocked_calls);
        self.bus.post(TAG_BLOCKED, format!("blocked {api}"));
    }

    pub fn hits(&self) -> u64 {
        self.metrics.snapshot().tripwire_hits
    }
}
