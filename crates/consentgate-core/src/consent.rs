//! Consent categories and the immutable consent snapshot.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A consent category the user can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentType {
    Analytics,
    Marketing,
    Personalization,
}

impl ConsentType {
    pub const ALL: [ConsentType; 3] = [
        ConsentType::Analytics,
        ConsentType::Marketing,
        ConsentType::Personalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytics => "ANALYTICS",
            Self::Marketing => "MARKETING",
            Self::Personalization => "PERSONALIZATION",
        }
    }

    /// Decode wire names, dropping anything unknown.
    ///
    /// Returns the decoded set and the rejected raw values so callers can
    /// warn about them. Duplicates collapse.
    pub fn decode_lossy<I, S>(values: I) -> (BTreeSet<ConsentType>, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut granted = BTreeSet::new();
        let mut unknown = Vec::new();
        for raw in values {
            match raw.as_ref().parse::<ConsentType>() {
                Ok(t) => {
                    granted.insert(t);
                }
                Err(_) => unknown.push(raw.as_ref().to_string()),
            }
        }
        (granted, unknown)
    }
}

impl fmt::Display for ConsentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw value that does not name a known consent category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consent category '{0}'")]
pub struct UnknownConsentType(pub String);

impl FromStr for ConsentType {
    type Err = UnknownConsentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANALYTICS" => Ok(Self::Analytics),
            "MARKETING" => Ok(Self::Marketing),
            "PERSONALIZATION" => Ok(Self::Personalization),
            other => Err(UnknownConsentType(other.to_string())),
        }
    }
}

/// The user's consent choices at one point in time.
///
/// Never mutated; every change publishes a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentSnapshot {
    pub user_id: Option<String>,
    pub granted: BTreeSet<ConsentType>,
    pub timestamp: DateTime<Utc>,
}

impl ConsentSnapshot {
    pub fn new(granted: BTreeSet<ConsentType>, user_id: Option<String>) -> Self {
        Self {
            user_id,
            granted,
            timestamp: Utc::now(),
        }
    }

    /// Default-deny snapshot: nothing granted, anonymous.
    pub fn empty() -> Self {
        Self::new(BTreeSet::new(), None)
    }

    pub fn has(&self, consent: ConsentType) -> bool {
        self.granted.contains(&consent)
    }
}

impl Default for ConsentSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Render a consent set for logs, e.g. `[ANALYTICS, MARKETING]`.
pub fn format_set(set: &BTreeSet<ConsentType>) -> String {
    let names: Vec<&str> = set.iter().map(ConsentType::as_str).collect();
    format!("[{}]", names.join(", "))
}
