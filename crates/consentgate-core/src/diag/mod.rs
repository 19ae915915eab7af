//! Passive observers: event log, counters, tripwire.
//!
//! Nothing in here feeds back into the decision logic.

use std::sync::Arc;

pub mod event_bus;
pub mod metrics;
pub mod tripwire;

pub use event_bus::{BusEvent, EventBus, DEFAULT_CAPACITY};
pub use metrics::{Metrics, MetricsSnapshot};
pub use tripwire::Tripwire;

/// Shared handles to all observers.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub bus: Arc<EventBus>,
    pub metrics: Arc<Metrics>,
    pub tripwire: Tripwire,
}

impl Diagnostics {
    pub fn new(bus_capacity: usize) -> Self {
        let bus = Arc::new(EventBus::new(bus_capacity));
        let metrics = Arc::new(Metrics::new());
        let tripwire = Tripwire::new(metrics.clone(), bus.clone());
        Self {
            bus,
            metrics,
            tripwire,
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
