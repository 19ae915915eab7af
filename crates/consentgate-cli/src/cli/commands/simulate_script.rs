//! Scenario scripts for `consentgate simulate`.
//!
//! ```yaml
//! steps:
//!   - cmp: { ready: true, has_transparency_string: true, jurisdiction: true }
//!   - consent: [MARKETING]
//!   - log_event: level_complete
//!   - consent: []
//!   - probe_event: leak_check
//!   - callback: { kind: conversion_data, keys: [campaign] }
//!   - settle: 50
//!   - check_cache
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use consentgate_core::{CmpSnapshot, Tri, VendorCallback};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Each step is a one-key map (`- consent: [..]`) or a bare name (`- check_cache`).
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Replace the granted categories. Unknown names are dropped.
    Consent(Vec<String>),
    Cmp(CmpStep),
    /// Sleep for this many milliseconds.
    Settle(u64),
    LogEvent(String),
    LogRevenue(RevenueStep),
    UserId(String),
    /// Direct vendor call that bypasses the gate.
    ProbeEvent(String),
    /// Fire a vendor callback at the registered listener.
    Callback(VendorCallback),
    CheckCache,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CmpStep {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub has_transparency_string: bool,
    /// Omit when the CMP has not resolved the jurisdiction.
    #[serde(default)]
    pub jurisdiction: Option<bool>,
}

impl From<CmpStep> for CmpSnapshot {
    fn from(step: CmpStep) -> Self {
        CmpSnapshot {
            ready: step.ready,
            has_transparency_string: step.has_transparency_string,
            jurisdiction_applies: step.jurisdiction.map_or(Tri::Unknown, Tri::from),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevenueStep {
    pub revenue: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Script {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let script: Script = serde_yaml::from_str(text).context("invalid scenario script")?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
    }
}
