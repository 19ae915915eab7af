//! Consent-gated activation for third-party marketing SDKs.
//!
//! No data reaches the vendor SDK until the user's consent, the CMP state
//! and the per-vendor policy together authorize it, and buffered vendor
//! state is purged the moment that authorization is withdrawn.
//!
//! - [`mapper`]: pure reduction of all signals to one decision
//! - [`lifecycle`]: bootstrap/grant/revoke state machine with sink swap
//! - [`coordinator`]: latest-wins loop from live signals to transitions
//! - [`diag`]: event bus, counters and the tripwire
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use consentgate_core::{
//!     CmpSnapshot, ConsentStore, ConsentType, Gate, GateConfig, MemoryConsentStore,
//!     RecordingVendor, SdkRegistry, Tri,
//! };
//!
//! # async fn example() -> consentgate_core::GateResult<()> {
//! let registry = SdkRegistry::from_path("sdk_policy.json".as_ref())?;
//! let store = Arc::new(MemoryConsentStore::new());
//! let gate = Gate::new(
//!     GateConfig::from_env(),
//!     registry,
//!     Arc::new(RecordingVendor::new()),
//!     store.clone(),
//! );
//! let handle = gate.start();
//!
//! gate.cmp().update(CmpSnapshot::ready(Tri::True));
//! store
//!     .update([ConsentType::Marketing].into_iter().collect(), None)
//!     .await?;
//!
//! // Routed to the vendor only while authorized.
//! gate.controller()
//!     .log_event("level_complete", &Default::default())
//!     .await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CONSENTGATE_VENDOR` | Vendor id (default: `APPSFLYER`) |
//! | `CONSENTGATE_DEV_KEY` | Vendor integration key |
//! | `CONSENTGATE_GDPR` | `always`, `never` or `from_cmp` (default) |
//! | `CONSENTGATE_PURGE_ON_REVOKE` | Purge vendor files on revoke (default: true) |
//! | `CONSENTGATE_EVENT_CAPACITY` | Event bus ring size (default: 200) |
//! | `CONSENTGATE_DATA_DIR` | Application data directory |

pub mod cmp;
pub mod config;
pub mod consent;
pub mod coordinator;
pub mod diag;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod mapper;
pub mod registry;
pub mod sink;
pub mod storage;
pub mod store;
pub mod vendor;

// Re-export main types
pub use cmp::{CmpSignalSource, CmpSnapshot, Tri};
pub use config::GateConfig;
pub use consent::{ConsentSnapshot, ConsentType};
pub use coordinator::{Coordinator, CoordinatorHandle, DecisionRecord, GdprResolver};
pub use diag::{Diagnostics, EventBus, Metrics, MetricsSnapshot, Tripwire};
pub use error::{GateError, GateResult};
pub use gate::Gate;
pub use lifecycle::{GateView, LifecycleController, LifecycleState, Transition};
pub use mapper::{effective, AuthorizationDecision, DecisionReason};
pub use registry::{ExecutionContext, SdkConfig, SdkId, SdkRegistry, POLICY_FILE_NAME};
pub use sink::{AnalyticsSink, NoopSink, SinkKind, VendorSink};
pub use storage::{PurgeReport, StorageLayout, VendorFile, VendorFileMatcher, VendorStorage};
pub use store::{ConsentStore, FileConsentStore, MemoryConsentStore};
pub use vendor::{
    EventParams, RecordingVendor, VendorCallback, VendorConsent, VendorError, VendorListener,
    VendorSdk,
};
