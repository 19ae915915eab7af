//! Consent persistence.
//!
//! Stores publish every accepted update as a fresh [`ConsentSnapshot`] on a
//! watch channel; the coordinator only ever sees the latest one.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::consent::{format_set, ConsentSnapshot, ConsentType};
use crate::error::{GateError, GateResult};

/// Default consent file name.
pub const CONSENT_FILE_NAME: &str = "consent.json";

/// Source of the user's consent choices.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Latest published snapshot.
    async fn current(&self) -> ConsentSnapshot;

    /// Replace the granted set and user id, publishing a new snapshot.
    async fn update(
        &self,
        granted: BTreeSet<ConsentType>,
        user_id: Option<String>,
    ) -> GateResult<ConsentSnapshot>;

    fn subscribe(&self) -> watch::Receiver<ConsentSnapshot>;
}

/// In-memory store. Starts with nothing granted.
#[derive(Debug)]
pub struct MemoryConsentStore {
    tx: watch::Sender<ConsentSnapshot>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConsentSnapshot::empty());
        Self { tx }
    }
}

impl Default for MemoryConsentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsentStore for MemoryConsentStore {
    async fn current(&self) -> ConsentSnapshot {
        self.tx.borrow().clone()
    }

    async fn update(
        &self,
        granted: BTreeSet<ConsentType>,
        user_id: Option<String>,
    ) -> GateResult<ConsentSnapshot> {
        let snapshot = ConsentSnapshot::new(granted, user_id);
        debug!(granted = %format_set(&snapshot.granted), "consent updated");
        self.tx.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    fn subscribe(&self) -> watch::Receiver<ConsentSnapshot> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsentFile {
    #[serde(default)]
    granted: Vec<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// JSON-file-backed store.
///
/// ```json
/// { "granted": ["ANALYTICS", "MARKETING"], "userId": "u-123" }
/// ```
#[derive(Debug)]
pub struct FileConsentStore {
    path: PathBuf,
    tx: watch::Sender<ConsentSnapshot>,
    write_lock: Mutex<()>,
}

impl FileConsentStore {
    /// Open the store, loading `path` if it exists.
    ///
    /// Unknown categories in the file are dropped with a warning. A file that
    /// is not valid JSON is a storage error.
    pub async fn open(path: impl Into<PathBuf>) -> GateResult<Self> {
        let path = path.into();
        let initial = match fs::read_to_string(&path).await {
            Ok(text) => decode(&path, &text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no consent file, starting with nothing granted");
                ConsentSnapshot::empty()
            }
            Err(e) => {
                return Err(GateError::Storage {
                    message: format!("failed to read {}: {e}", path.display()),
                })
            }
        };
        info!(
            path = %path.display(),
            granted = %format_set(&initial.granted),
            "consent store opened"
        );
        let (tx, _rx) = watch::channel(initial);
        Ok(Self {
            path,
            tx,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &ConsentSnapshot) -> GateResult<()> {
        let file = ConsentFile {
            granted: snapshot
                .granted
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            user_id: snapshot.user_id.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| GateError::Storage {
            message: format!("failed to encode consent: {e}"),
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn decode(path: &Path, text: &str) -> GateResult<ConsentSnapshot> {
    let file: ConsentFile = serde_json::from_str(text).map_err(|e| GateError::Storage {
        message: format!("invalid consent file {}: {e}", path.display()),
    })?;
    let (granted, unknown) = ConsentType::decode_lossy(&file.granted);
    for raw in &unknown {
        warn!(value = %raw, path = %path.display(), "dropping unknown consent category");
    }
    Ok(ConsentSnapshot::new(granted, file.user_id))
}

#[async_trait]
impl ConsentStore for FileConsentStore {
    async fn current(&self) -> ConsentSnapshot {
        self.tx.borrow().clone()
    }

    async fn update(
        &self,
        granted: BTreeSet<ConsentType>,
        user_id: Option<String>,
    ) -> GateResult<ConsentSnapshot> {
        let _guard = self.write_lock.lock().await;
        let snapshot = ConsentSnapshot::new(granted, user_id);
        self.persist(&snapshot).await?;
        debug!(
            path = %self.path.display(),
            granted = %format_set(&snapshot.granted),
            "consent persisted"
        );
        self.tx.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    fn subscribe(&self) -> watch::Receiver<ConsentSnapshot> {
        self.tx.subscribe()
    }
}
