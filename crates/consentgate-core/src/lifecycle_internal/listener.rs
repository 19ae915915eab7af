use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use tracing::{info, warn};

use super::super::{GateView, LifecycleState};
use crate::diag::Diagnostics;
use crate::vendor::{DeepLinkStatus, VendorCallback, VendorListener};

pub(crate) const TAG_CALLBACK: &str = "callback";

/// Listener registered with the vendor at bootstrap.
///
/// Reads the published view on every callback; data arriving while the gate
/// is not open trips the wire. Holds the view weakly: the vendor owns the
/// listener and the view owns the vendor sink.
pub(crate) struct InstrumentationListener {
    view: Weak<ArcSwap<GateView>>,
    diag: Diagnostics,
}

impl InstrumentationListener {
    pub(crate) fn new(view: &Arc<ArcSwap<GateView>>, diag: Diagnostics) -> Self {
        Self {
            view: Arc::downgrade(view),
            diag,
        }
    }

    fn state(&self) -> LifecycleState {
        self.view
            .upgrade()
            .map_or(LifecycleState::Uninitialized, |view| view.load().state)
    }
}

fn describe(callback: &VendorCallback) -> String {
    match callback {
        VendorCallback::ConversionData { keys } | VendorCallback::AppOpenAttribution { keys } => {
            format!("keys=[{}]", keys.join(", "))
        }
        VendorCallback::ConversionDataFailure { error }
        | VendorCallback::AttributionFailure { error } => format!("error={error}"),
        VendorCallback::DeepLink { status } => match status {
            DeepLinkStatus::Found { deep_link } => format!("found {deep_link}"),
            DeepLinkStatus::NotFound => "not found".to_string(),
            DeepLinkStatus::Error { message } => format!("error={message}"),
        },
    }
}

impl VendorListener for InstrumentationListener {
    fn on_callback(&self, callback: VendorCallback) {
        let state = self.state();
        let source = callback.name();
        let detail = describe(&callback);

        if callback.carries_data() && state != LifecycleState::Started {
            self.diag.tripwire.vendor_activity(source, &detail);
            return;
        }

        if callback.carries_data() {
            info!(source, detail = %detail, "vendor callback");
        } else {
            warn!(source, detail = %detail, state = ?state, "vendor callback without data");
        }
        self.diag
            .bus
            .post(TAG_CALLBACK, format!("{source}: {detail}"));
    }
}
