//! Consent-management-platform readiness signal.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Three-valued flag for facts the CMP may not have resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tri {
    True,
    False,
    #[default]
    Unknown,
}

impl Tri {
    /// Collapse to a bool, choosing `unknown_as` when unresolved.
    pub fn resolve(self, unknown_as: bool) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Unknown => unknown_as,
        }
    }
}

impl From<bool> for Tri {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// CMP state as last reported. Replaced wholesale on every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CmpSnapshot {
    /// The CMP finished initializing.
    #[serde(default)]
    pub ready: bool,
    /// The CMP produced a usable transparency string (e.g. a TCF string).
    #[serde(default)]
    pub has_transparency_string: bool,
    /// Whether a consent framework jurisdiction applies to this user.
    #[serde(default)]
    pub jurisdiction_applies: Tri,
}

impl CmpSnapshot {
    /// Initial state: not ready, no string, jurisdiction unknown.
    pub fn initial() -> Self {
        Self::default()
    }

    /// A fully initialized CMP for the given jurisdiction.
    pub fn ready(jurisdiction_applies: Tri) -> Self {
        Self {
            ready: true,
            has_transparency_string: true,
            jurisdiction_applies,
        }
    }
}

/// Live CMP signal with replay-latest semantics.
///
/// New subscribers immediately observe the current snapshot.
#[derive(Debug)]
pub struct CmpSignalSource {
    tx: watch::Sender<CmpSnapshot>,
}

impl CmpSignalSource {
    pub fn new() -> Self {
        Self::with_initial(CmpSnapshot::initial())
    }

    pub fn with_initial(initial: CmpSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<CmpSnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> CmpSnapshot {
        *self.tx.borrow()
    }

    /// Publish a new snapshot. Identical values do not wake subscribers.
    pub fn update(&self, snapshot: CmpSnapshot) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        debug!(
            ready = snapshot.ready,
            has_transparency_string = snapshot.has_transparency_string,
            jurisdiction = ?snapshot.jurisdiction_applies,
            changed,
            "cmp signal updated"
        );
    }
}

impl Default for CmpSignalSource {
    fn default() -> Self {
        Self::new()
    }
}
