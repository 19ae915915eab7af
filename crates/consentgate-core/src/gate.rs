//! Process wiring: one config, one vendor, one coordinator.

use std::sync::Arc;

use crate::cmp::CmpSignalSource;
use crate::config::GateConfig;
use crate::coordinator::{Coordinator, CoordinatorHandle};
use crate::diag::Diagnostics;
use crate::lifecycle::LifecycleController;
use crate::registry::SdkRegistry;
use crate::store::ConsentStore;
use crate::vendor::VendorSdk;

/// Assembled gate. Owns the signal sources and the controller; the
/// coordinator is started separately so callers control its lifetime.
pub struct Gate {
    config: GateConfig,
    registry: SdkRegistry,
    diagnostics: Diagnostics,
    controller: Arc<LifecycleController>,
    consent: Arc<dyn ConsentStore>,
    cmp: Arc<CmpSignalSource>,
}

impl Gate {
    pub fn new(
        config: GateConfig,
        registry: SdkRegistry,
        vendor: Arc<dyn VendorSdk>,
        consent: Arc<dyn ConsentStore>,
    ) -> Self {
        let diagnostics = Diagnostics::new(config.event_bus_capacity);
        let controller = Arc::new(LifecycleController::from_config(
            &config,
            vendor,
            diagnostics.clone(),
        ));
        Self {
            config,
            registry,
            diagnostics,
            controller,
            consent,
            cmp: Arc::new(CmpSignalSource::new()),
        }
    }

    /// Spawn the coordinator on the current runtime.
    pub fn start(&self) -> CoordinatorHandle {
        Coordinator::from_config(
            &self.config,
            self.controller.clone(),
            &self.registry,
            self.consent.subscribe(),
            self.cmp.subscribe(),
        )
        .start()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn registry(&self) -> &SdkRegistry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    pub fn consent(&self) -> &Arc<dyn ConsentStore> {
        &self.consent
    }

    pub fn cmp(&self) -> &Arc<CmpSignalSource> {
        &self.cmp
    }
}
