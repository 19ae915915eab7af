//! On-disk vendor state: inventory and purge.
//!
//! The vendor SDK buffers requests in the application's cache, files and
//! shared-preferences directories. Purging deletes every entry matching the
//! vendor's naming convention so queued events cannot flush on a later
//! restart.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//!   cache/          # request queues
//!   files/          # persisted state
//!   shared_prefs/   # key-value preference files
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{GateError, GateResult};

/// Which storage area an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageArea {
    Cache,
    Files,
    Prefs,
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Files => "files",
            Self::Prefs => "prefs",
        })
    }
}

/// Directories the vendor may write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub cache_dir: PathBuf,
    pub files_dir: PathBuf,
    pub prefs_dir: PathBuf,
}

impl StorageLayout {
    /// Conventional layout under an application data directory.
    pub fn under(data_dir: impl AsRef<Path>) -> Self {
        let base = data_dir.as_ref();
        Self {
            cache_dir: base.join("cache"),
            files_dir: base.join("files"),
            prefs_dir: base.join("shared_prefs"),
        }
    }

    fn areas(&self) -> [(StorageArea, &Path); 3] {
        [
            (StorageArea::Cache, self.cache_dir.as_path()),
            (StorageArea::Files, self.files_dir.as_path()),
            (StorageArea::Prefs, self.prefs_dir.as_path()),
        ]
    }
}

/// Vendor naming convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorFileMatcher {
    /// Substrings matched ignoring ASCII case, in every area.
    pub insensitive: Vec<String>,
    /// Substrings matched exactly, outside the preferences area.
    pub sensitive: Vec<String>,
}

impl VendorFileMatcher {
    pub fn new(insensitive: Vec<String>, sensitive: Vec<String>) -> Self {
        let insensitive = insensitive.into_iter().map(|s| s.to_lowercase()).collect();
        Self {
            insensitive,
            sensitive,
        }
    }

    pub fn matches(&self, area: StorageArea, name: &str) -> bool {
        let lower = name.to_lowercase();
        if self
            .insensitive
            .iter()
            .any(|needle| lower.contains(&needle.to_lowercase()))
        {
            return true;
        }
        area != StorageArea::Prefs && self.sensitive.iter().any(|needle| name.contains(needle))
    }
}

impl Default for VendorFileMatcher {
    fn default() -> Self {
        Self::new(vec!["appsflyer".to_string()], vec!["AF_".to_string()])
    }
}

/// A vendor-named entry found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorFile {
    pub area: StorageArea,
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

/// One entry that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a purge. Always produced, even under partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub deleted: usize,
    pub failures: Vec<PurgeFailure>,
}

impl PurgeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scanner and purger for vendor files.
#[derive(Debug, Clone)]
pub struct VendorStorage {
    layout: StorageLayout,
    matcher: VendorFileMatcher,
}

impl VendorStorage {
    pub fn new(layout: StorageLayout, matcher: VendorFileMatcher) -> Self {
        Self { layout, matcher }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// List every vendor-named entry. Missing directories count as empty.
    pub async fn scan(&self) -> GateResult<Vec<VendorFile>> {
        let mut found = Vec::new();
        for (area, dir) in self.layout.areas() {
            let listing = self.list_area(area, dir).await;
            if let Some(failure) = listing.error {
                return Err(GateError::Storage {
                    message: failure.error,
                });
            }
            found.extend(listing.files);
        }
        Ok(found)
    }

    async fn list_area(&self, area: StorageArea, dir: &Path) -> AreaListing {
        let mut listing = AreaListing::default();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return listing,
            Err(e) => {
                listing.error = Some(PurgeFailure {
                    path: dir.to_path_buf(),
                    error: format!("failed to list {}: {e}", dir.display()),
                });
                return listing;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        area = %area,
                        dir = %dir.display(),
                        listed = listing.files.len(),
                        error = %e,
                        "storage listing stopped early"
                    );
                    listing.error = Some(PurgeFailure {
                        path: dir.to_path_buf(),
                        error: format!("failed to read entry in {}: {e}", dir.display()),
                    });
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.matcher.matches(area, &name) {
                continue;
            }
            let (size, modified, is_dir) = match entry.metadata().await {
                Ok(meta) => (
                    meta.len(),
                    meta.modified().ok().map(DateTime::<Utc>::from),
                    meta.is_dir(),
                ),
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "metadata unavailable");
                    (0, None, false)
                }
            };
            listing.files.push(VendorFile {
                area,
                path: entry.path(),
                name,
                size,
                modified,
                is_dir,
            });
        }
        listing.files.sort_by(|a, b| a.name.cmp(&b.name));
        listing
    }

    /// Delete every vendor-named entry.
    ///
    /// Per-entry failures are recorded in the report; the batch always runs
    /// to the end. An area that cannot be fully listed still has the entries
    /// read so far deleted.
    pub async fn purge(&self) -> PurgeReport {
        let mut report = PurgeReport::default();
        for (area, dir) in self.layout.areas() {
            let partial = purge_listing(self.list_area(area, dir).await).await;
            report.deleted += partial.deleted;
            report.failures.extend(partial.failures);
        }
        report
    }

    /// Human-readable inventory. Never fails: errors become part of the text.
    pub async fn inventory(&self) -> String {
        match self.scan().await {
            Ok(files) => format_inventory(&files),
            Err(e) => format!("Error checking cache: {e}"),
        }
    }
}

/// Entries read from one area. `error` is set when listing stopped early;
/// `files` then holds what was read before the failure.
#[derive(Debug, Default)]
struct AreaListing {
    files: Vec<VendorFile>,
    error: Option<PurgeFailure>,
}

async fn purge_listing(listing: AreaListing) -> PurgeReport {
    let mut report = purge_entries(&listing.files).await;
    if let Some(failure) = listing.error {
        warn!(path = %failure.path.display(), error = %failure.error, "storage area not fully listed");
        report.failures.push(failure);
    }
    report
}

pub(crate) async fn purge_entries(files: &[VendorFile]) -> PurgeReport {
    let mut report = PurgeReport::default();
    for file in files {
        let result = if file.is_dir {
            fs::remove_dir_all(&file.path).await
        } else {
            fs::remove_file(&file.path).await
        };
        match result {
            Ok(()) => {
                report.deleted += 1;
                debug!(area = %file.area, name = %file.name, "deleted vendor file");
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "failed to delete vendor file");
                report.failures.push(PurgeFailure {
                    path: file.path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    report
}

pub fn format_inventory(files: &[VendorFile]) -> String {
    if files.is_empty() {
        return "No vendor cache files".to_string();
    }
    let lines: Vec<String> = files
        .iter()
        .map(|f| {
            let modified = f
                .modified
                .map(|m| m.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "  • [{}] {} ({} bytes, modified {})",
                f.area, f.name, f.size, modified
            )
        })
        .collect();
    format!("Found {} vendor cache files:\n{}", files.len(), lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (VendorStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = VendorStorage::new(
            StorageLayout::under(temp_dir.path()),
            VendorFileMatcher::default(),
        );
        (storage, temp_dir)
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"queued").unwrap();
    }

    #[test]
    fn test_matcher_rules() {
        let m = VendorFileMatcher::default();
        assert!(m.matches(StorageArea::Cache, "AppsFlyer_queue"));
        assert!(m.matches(StorageArea::Files, "AF_install.dat"));
        assert!(!m.matches(StorageArea::Files, "af_install.dat"));
        assert!(!m.matches(StorageArea::Prefs, "AF_prefs.xml"));
        assert!(m.matches(StorageArea::Prefs, "appsflyer-data.xml"));
        assert!(!m.matches(StorageArea::Cache, "image_cache"));
    }

    #[tokio::test]
    async fn test_scan_missing_dirs_is_empty() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.scan().await.unwrap().is_empty());
        assert_eq!(storage.inventory().await, "No vendor cache files");
    }

    #[tokio::test]
    async fn test_purge_removes_only_vendor_files() {
        let (storage, _dir) = create_test_storage();
        let layout = storage.layout().clone();
        touch(&layout.cache_dir.join("appsflyer_queue.jsonl"));
        touch(&layout.cache_dir.join("thumbnails.bin"));
        touch(&layout.files_dir.join("AF_state").join("inner.bin"));
        touch(&layout.prefs_dir.join("appsflyer-data.xml"));
        touch(&layout.prefs_dir.join("settings.xml"));

        let inventory = storage.inventory().await;
        assert!(inventory.starts_with("Found 3 vendor cache files"));

        let report = storage.purge().await;
        assert_eq!(report.deleted, 3);
        assert!(report.is_complete());
        assert!(storage.scan().await.unwrap().is_empty());
        assert!(layout.cache_dir.join("thumbnails.bin").exists());
        assert!(layout.prefs_dir.join("settings.xml").exists());
    }

    #[tokio::test]
    async fn test_partial_failure_is_counted_not_raised() {
        let (storage, dir) = create_test_storage();
        touch(&storage.layout().cache_dir.join("appsflyer_a"));
        let mut files = storage.scan().await.unwrap();
        files.push(VendorFile {
            area: StorageArea::Cache,
            path: dir.path().join("cache").join("appsflyer_vanished"),
            name: "appsflyer_vanished".to_string(),
            size: 0,
            modified: None,
            is_dir: false,
        });

        let report = purge_entries(&files).await;
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_unlistable_area_becomes_error_text() {
        let temp_dir = TempDir::new().unwrap();
        let not_a_dir = temp_dir.path().join("plain_file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let storage = VendorStorage::new(
            StorageLayout {
                cache_dir: not_a_dir.clone(),
                files_dir: temp_dir.path().join("files"),
                prefs_dir: temp_dir.path().join("prefs"),
            },
            VendorFileMatcher::default(),
        );
        assert!(storage.inventory().await.starts_with("Error checking cache"));
        let report = storage.purge().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, not_a_dir);
    }

    #[tokio::test]
    async fn test_partially_listed_area_still_purges_read_entries() {
        let (storage, dir) = create_test_storage();
        let cache_dir = storage.layout().cache_dir.clone();
        touch(&cache_dir.join("appsflyer_queue.jsonl"));
        touch(&cache_dir.join("AF_pending.bin"));
        let listing = AreaListing {
            files: storage.scan().await.unwrap(),
            error: Some(PurgeFailure {
                path: cache_dir.clone(),
                error: "failed to read entry".to_string(),
            }),
        };
        assert_eq!(listing.files.len(), 2);

        let report = purge_listing(listing).await;
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, cache_dir);
        assert!(!dir.path().join("cache").join("AF_pending.bin").exists());
    }
}
