//! Gate configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::coordinator::GdprResolver;
use crate::diag::DEFAULT_CAPACITY;
use crate::registry::SdkId;
use crate::storage::{StorageLayout, VendorFileMatcher, VendorStorage};

/// Placeholder integration key used when none is configured.
pub const DEFAULT_DEV_KEY: &str = "DEV_KEY_PLACEHOLDER";

/// Consent gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Vendor the gate drives.
    #[serde(default = "default_vendor")]
    pub vendor: SdkId,

    /// Vendor integration key passed to `init`.
    #[serde(default = "default_dev_key")]
    pub dev_key: String,

    /// GDPR-subject resolution.
    #[serde(default)]
    pub gdpr: GdprResolver,

    /// Delete vendor files whenever consent is revoked.
    #[serde(default = "default_purge_on_revoke")]
    pub purge_on_revoke: bool,

    /// Event bus ring size.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Application data directory holding `cache/`, `files/` and
    /// `shared_prefs/`. Defaults to the working directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Vendor file naming convention.
    #[serde(default)]
    pub vendor_markers: VendorFileMatcher,
}

fn default_vendor() -> SdkId {
    SdkId::AppsFlyer
}

fn default_dev_key() -> String {
    DEFAULT_DEV_KEY.to_string()
}

fn default_purge_on_revoke() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            vendor: default_vendor(),
            dev_key: default_dev_key(),
            gdpr: GdprResolver::default(),
            purge_on_revoke: default_purge_on_revoke(),
            event_bus_capacity: default_event_bus_capacity(),
            data_dir: None,
            vendor_markers: VendorFileMatcher::default(),
        }
    }
}

impl GateConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CONSENTGATE_VENDOR` | Vendor id (`APPSFLYER`, `ADJUST`, `BRANCH`) |
    /// | `CONSENTGATE_DEV_KEY` | Vendor integration key |
    /// | `CONSENTGATE_GDPR` | `always`, `never` or `from_cmp` |
    /// | `CONSENTGATE_PURGE_ON_REVOKE` | Purge vendor files on revoke |
    /// | `CONSENTGATE_EVENT_CAPACITY` | Event bus ring size |
    /// | `CONSENTGATE_DATA_DIR` | Application data directory |
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            vendor: std::env::var("CONSENTGATE_VENDOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_vendor),
            dev_key: std::env::var("CONSENTGATE_DEV_KEY").unwrap_or_else(|_| default_dev_key()),
            gdpr: std::env::var("CONSENTGATE_GDPR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            purge_on_revoke: std::env::var("CONSENTGATE_PURGE_ON_REVOKE")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or_else(|_| default_purge_on_revoke()),
            event_bus_capacity: std::env::var("CONSENTGATE_EVENT_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(default_event_bus_capacity),
            data_dir: std::env::var("CONSENTGATE_DATA_DIR").ok().map(PathBuf::from),
            vendor_markers: VendorFileMatcher::default(),
        }
    }

    /// Set the vendor integration key.
    pub fn with_dev_key(mut self, key: impl Into<String>) -> Self {
        self.dev_key = key.into();
        self
    }

    /// Set the application data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set GDPR-subject resolution.
    pub fn with_gdpr(mut self, gdpr: GdprResolver) -> Self {
        self.gdpr = gdpr;
        self
    }

    pub fn with_purge_on_revoke(mut self, purge: bool) -> Self {
        self.purge_on_revoke = purge;
        self
    }

    pub fn with_vendor(mut self, vendor: SdkId) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::under(self.data_dir.clone().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn vendor_storage(&self) -> VendorStorage {
        VendorStorage::new(self.storage_layout(), self.vendor_markers.clone())
    }
}
