//! Declarative per-vendor policy.
//!
//! Loaded once at startup from a JSON manifest:
//!
//! ```json
//! {
//!   "version": "1",
//!   "sdks": [
//!     { "id": "APPSFLYER", "requiredConsent": ["ANALYTICS", "MARKETING"],
//!       "initOrder": 10, "thread": "BACKGROUND" }
//!   ]
//! }
//! ```
//!
//! Unknown ids and consent strings are skipped per entry, an unknown thread
//! falls back to `BACKGROUND`. Only a manifest that is not valid JSON of this
//! shape fails the load.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consent::{format_set, ConsentType};
use crate::error::{GateError, GateResult};

/// Default manifest file name.
pub const POLICY_FILE_NAME: &str = "sdk_policy.json";

/// Vendor integrations the gate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SdkId {
    #[serde(rename = "APPSFLYER")]
    AppsFlyer,
    Adjust,
    Branch,
}

impl SdkId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppsFlyer => "APPSFLYER",
            Self::Adjust => "ADJUST",
            Self::Branch => "BRANCH",
        }
    }
}

impl fmt::Display for SdkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SdkId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPSFLYER" => Ok(Self::AppsFlyer),
            "ADJUST" => Ok(Self::Adjust),
            "BRANCH" => Ok(Self::Branch),
            other => Err(GateError::Config {
                message: format!("unknown sdk id '{other}'"),
            }),
        }
    }
}

/// Execution context a vendor integration must run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionContext {
    Foreground,
    #[default]
    Background,
}

impl ExecutionContext {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "FOREGROUND" => Some(Self::Foreground),
            "BACKGROUND" => Some(Self::Background),
            _ => None,
        }
    }
}

/// Policy for one vendor integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkConfig {
    pub id: SdkId,
    pub required_consent: BTreeSet<ConsentType>,
    pub init_order: i32,
    pub execution_context: ExecutionContext,
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    version: String,
    sdks: Vec<SdkRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdkRow {
    id: String,
    #[serde(default)]
    required_consent: Vec<String>,
    #[serde(default)]
    init_order: i32,
    #[serde(default = "default_thread")]
    thread: String,
}

fn default_thread() -> String {
    "BACKGROUND".to_string()
}

/// Immutable, init-ordered collection of vendor policies.
#[derive(Debug, Clone, Default)]
pub struct SdkRegistry {
    version: String,
    configs: Vec<SdkConfig>,
    index: HashMap<SdkId, usize>,
    warnings: Vec<String>,
}

impl SdkRegistry {
    /// Build a registry from already-decoded configs.
    ///
    /// Configs are stably sorted by `init_order`; on duplicate ids the first
    /// declaration wins.
    pub fn new(configs: Vec<SdkConfig>) -> Self {
        Self::build("inline".to_string(), configs, Vec::new())
    }

    fn build(version: String, configs: Vec<SdkConfig>, mut warnings: Vec<String>) -> Self {
        let mut kept: Vec<SdkConfig> = Vec::with_capacity(configs.len());
        for config in configs {
            if kept.iter().any(|c| c.id == config.id) {
                let msg = format!("duplicate policy entry for {}; keeping the first", config.id);
                warn!(sdk = %config.id, "duplicate policy entry ignored");
                warnings.push(msg);
                continue;
            }
            kept.push(config);
        }
        kept.sort_by_key(|c| c.init_order);

        let index = kept.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        Self {
            version,
            configs: kept,
            index,
            warnings,
        }
    }

    /// Decode a policy manifest.
    pub fn from_json_str(text: &str) -> GateResult<Self> {
        let file: PolicyFile = serde_json::from_str(text).map_err(|e| GateError::Policy {
            message: format!("malformed policy manifest: {e}"),
        })?;

        let mut warnings = Vec::new();
        let mut configs = Vec::with_capacity(file.sdks.len());

        for row in file.sdks {
            let id = match row.id.parse::<SdkId>() {
                Ok(id) => id,
                Err(_) => {
                    warn!(id = %row.id, "skipping policy entry with unknown sdk id");
                    warnings.push(format!("unknown sdk id '{}' skipped", row.id));
                    continue;
                }
            };

            let (required_consent, unknown) = ConsentType::decode_lossy(&row.required_consent);
            for raw in unknown {
                warn!(sdk = %id, value = %raw, "dropping unknown consent category");
                warnings.push(format!("{id}: unknown consent '{raw}' dropped"));
            }

            let execution_context = ExecutionContext::parse(&row.thread).unwrap_or_else(|| {
                warn!(sdk = %id, thread = %row.thread, "unknown thread kind, using BACKGROUND");
                warnings.push(format!(
                    "{id}: unknown thread '{}' replaced by BACKGROUND",
                    row.thread
                ));
                ExecutionContext::Background
            });

            if required_consent.is_empty() {
                warn!(sdk = %id, "policy requires no consent; vendor starts whenever the CMP permits");
                warnings.push(format!("{id}: requiredConsent is empty"));
            }

            configs.push(SdkConfig {
                id,
                required_consent,
                init_order: row.init_order,
                execution_context,
            });
        }

        let registry = Self::build(file.version, configs, warnings);
        info!(
            version = %registry.version,
            sdks = registry.configs.len(),
            warnings = registry.warnings.len(),
            "sdk policy loaded"
        );
        Ok(registry)
    }

    /// Read and decode a manifest from disk.
    pub fn from_path(path: &Path) -> GateResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GateError::Policy {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&text)
    }

    /// All configs in init order.
    pub fn all(&self) -> &[SdkConfig] {
        &self.configs
    }

    pub fn get(&self, id: SdkId) -> Option<&SdkConfig> {
        self.index.get(&id).map(|&i| &self.configs[i])
    }

    /// Required consent for a vendor; empty when the vendor has no entry.
    pub fn required_consent(&self, id: SdkId) -> BTreeSet<ConsentType> {
        match self.get(id) {
            Some(config) => {
                info!(sdk = %id, requires = %format_set(&config.required_consent), "sdk policy resolved");
                config.required_consent.clone()
            }
            None => {
                warn!(sdk = %id, "no policy entry for sdk; treating as requiring no consent");
                BTreeSet::new()
            }
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Diagnostics collected while loading.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"{
        "version": "2",
        "sdks": [
            { "id": "BRANCH", "requiredConsent": ["MARKETING"], "initOrder": 30 },
            { "id": "APPSFLYER", "requiredConsent": ["ANALYTICS", "MARKETING"], "initOrder": 10, "thread": "FOREGROUND" },
            { "id": "ADJUST", "requiredConsent": ["ANALYTICS", "MIND_READING"], "initOrder": 20, "thread": "SIDEWAYS" },
            { "id": "MYSTERY_SDK", "requiredConsent": ["ANALYTICS"], "initOrder": 0 }
        ],
        "comment": "ignored"
    }"#;

    #[test]
    fn test_load_sorts_by_init_order() {
        let registry = SdkRegistry::from_json_str(POLICY).unwrap();
        let ids: Vec<SdkId> = registry.all().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![SdkId::AppsFlyer, SdkId::Adjust, SdkId::Branch]);
        assert_eq!(registry.version(), "2");
    }

    #[test]
    fn test_unknown_values_are_dropped_not_fatal() {
        let registry = SdkRegistry::from_json_str(POLICY).unwrap();

        let adjust = registry.get(SdkId::Adjust).unwrap();
        assert_eq!(
            adjust.required_consent,
            BTreeSet::from([ConsentType::Analytics])
        );
        assert_eq!(adjust.execution_context, ExecutionContext::Background);

        let af = registry.get(SdkId::AppsFlyer).unwrap();
        assert_eq!(af.execution_context, ExecutionContext::Foreground);

        let warnings = registry.warnings().join("\n");
        assert!(warnings.contains("MYSTERY_SDK"));
        assert!(warnings.contains("MIND_READING"));
        assert!(warnings.contains("SIDEWAYS"));
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let registry =
            SdkRegistry::from_json_str(r#"{"version":"1","sdks":[{"id":"APPSFLYER"}]}"#).unwrap();
        let af = registry.get(SdkId::AppsFlyer).unwrap();
        assert_eq!(af.init_order, 0);
        assert_eq!(af.execution_context, ExecutionContext::Background);
        assert!(af.required_consent.is_empty());
        assert!(registry
            .warnings()
            .iter()
            .any(|w| w.contains("requiredConsent is empty")));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let err = SdkRegistry::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, GateError::Policy { .. }));

        let err = SdkRegistry::from_json_str(r#"{"sdks": []}"#).unwrap_err();
        assert!(matches!(err, GateError::Policy { .. }));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let registry = SdkRegistry::from_json_str(
            r#"{"version":"1","sdks":[
                {"id":"APPSFLYER","requiredConsent":["ANALYTICS"],"initOrder":5},
                {"id":"APPSFLYER","requiredConsent":["MARKETING"],"initOrder":1}
            ]}"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(SdkId::AppsFlyer).unwrap().required_consent,
            BTreeSet::from([ConsentType::Analytics])
        );
    }

    #[test]
    fn test_equal_init_order_is_stable() {
        let registry = SdkRegistry::new(vec![
            SdkConfig {
                id: SdkId::Branch,
                required_consent: BTreeSet::new(),
                init_order: 1,
                execution_context: ExecutionContext::Background,
            },
            SdkConfig {
                id: SdkId::Adjust,
                required_consent: BTreeSet::new(),
                init_order: 1,
                execution_context: ExecutionContext::Background,
            },
        ]);
        let ids: Vec<SdkId> = registry.all().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![SdkId::Branch, SdkId::Adjust]);
    }

    #[test]
    fn test_missing_entry_requires_nothing() {
        let registry = SdkRegistry::new(Vec::new());
        assert!(registry.get(SdkId::AppsFlyer).is_none());
        assert!(registry.required_consent(SdkId::AppsFlyer).is_empty());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(POLICY_FILE_NAME);
        std::fs::write(&path, POLICY).unwrap();
        let registry = SdkRegistry::from_path(&path).unwrap();
        assert_eq!(registry.len(), 3);

        let err = SdkRegistry::from_path(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, GateError::Policy { .. }));
    }
}
