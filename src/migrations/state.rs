//! # Migration Version State
//!
//! The version store holds a single record per deployment: the last version
//! a migration run reached. It is read at the start of every run and written
//! once after every successful step, so after a crash it always names a
//! version that was actually reached.

use super::errors::{StoreError, StoreResult};
use super::runner::RunnerConfig;
use super::version::MigrationVersion;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// The persisted version record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Highest version reached; 0 when nothing is applied
    pub current_version: MigrationVersion,

    /// Reserved for coordinating concurrent runners; kept but never enforced
    #[serde(default)]
    pub locked: bool,

    /// Caller-owned data, carried through updates untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// OS user that last moved the version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl VersionRecord {
    /// Record for a store that has never been migrated
    pub fn initial() -> Self {
        Self {
            current_version: MigrationVersion::ZERO,
            locked: false,
            metadata: None,
            updated_at: None,
            updated_by: None,
        }
    }

    fn advanced_to(mut self, version: MigrationVersion) -> Self {
        self.current_version = version;
        self.updated_at = Some(Utc::now());
        self.updated_by = Some(whoami::username());
        self
    }
}

impl Default for VersionRecord {
    fn default() -> Self {
        Self::initial()
    }
}

/// Persistent record of the last applied migration version
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Read the record, creating it with version 0 if it does not exist yet.
    async fn record(&self) -> StoreResult<VersionRecord>;

    /// Point update of `current_version`. `locked` and `metadata` are kept.
    async fn set_version(&self, version: MigrationVersion) -> StoreResult<()>;

    async fn get_version(&self) -> StoreResult<MigrationVersion> {
        Ok(self.record().await?.current_version)
    }
}

/// Version store kept as a JSON document at `<data_dir>/<collection>.json`.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(data_dir: impl AsRef<Path>, collection_name: &str) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{}.json", collection_name)),
        }
    }

    /// Store named by `config.collection_name`.
    pub fn for_config(data_dir: impl AsRef<Path>, config: &RunnerConfig) -> Self {
        Self::new(data_dir, &config.collection_name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> StoreResult<Option<VersionRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    /// Atomic write: temp file, then rename over the record.
    async fn write(&self, record: &VersionRecord) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(record).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: format!("Failed to serialize record: {}", e),
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Write {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let temp_file = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_file, content)
            .await
            .map_err(|e| StoreError::Write {
                path: temp_file.clone(),
                source: e,
            })?;

        tokio::fs::rename(&temp_file, &self.path)
            .await
            .map_err(|e| StoreError::Write {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl VersionStore for FileVersionStore {
    async fn record(&self) -> StoreResult<VersionRecord> {
        if let Some(record) = self.read().await? {
            return Ok(record);
        }

        let record = VersionRecord::initial();
        self.write(&record).await?;
        tracing::info!(path = %self.path.display(), "Created version record");
        Ok(record)
    }

    async fn set_version(&self, version: MigrationVersion) -> StoreResult<()> {
        let record = self.read().await?.unwrap_or_default().advanced_to(version);
        self.write(&record).await
    }
}

/// Version store held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    record: Mutex<Option<VersionRecord>>,
    writes: AtomicUsize,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts at `version`, as if earlier runs had reached it.
    pub fn at(version: MigrationVersion) -> Self {
        Self {
            record: Mutex::new(Some(VersionRecord {
                current_version: version,
                ..VersionRecord::initial()
            })),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set_version` calls that succeeded
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn record(&self) -> StoreResult<VersionRecord> {
        let mut record = self.record.lock().await;
        Ok(record.get_or_insert_with(VersionRecord::initial).clone())
    }

    async fn set_version(&self, version: MigrationVersion) -> StoreResult<()> {
        let mut record = self.record.lock().await;
        let next = record.take().unwrap_or_default().advanced_to(version);
        *record = Some(next);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn v(s: &str) -> MigrationVersion {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_uninitialized_store_starts_at_zero() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVersionStore::new(temp_dir.path(), "migrations");
        assert!(!store.path().exists());

        assert_eq!(store.get_version().await.unwrap(), MigrationVersion::ZERO);
        assert!(store.path().exists());

        let record = store.record().await.unwrap();
        assert!(!record.locked);
        assert!(record.metadata.is_none());
    }

    #[tokio::test]
    async fn test_set_version_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVersionStore::new(temp_dir.path(), "schema_version");

        store.set_version(v("1.1")).await.unwrap();
        assert_eq!(store.get_version().await.unwrap(), v("1.1"));

        let reopened = FileVersionStore::new(temp_dir.path(), "schema_version");
        let record = reopened.record().await.unwrap();
        assert_eq!(record.current_version, v("1.1"));
        assert!(record.updated_at.is_some());
        assert!(record.updated_by.is_some());
    }

    #[tokio::test]
    async fn test_set_version_preserves_locked_and_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVersionStore::new(temp_dir.path(), "migrations");
        std::fs::write(
            store.path(),
            r#"{"currentVersion": 1.0, "locked": true, "metadata": {"owner": "ops"}}"#,
        )
        .unwrap();

        store.set_version(v("1.2")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["currentVersion"], serde_json::json!(1.2));
        assert_eq!(raw["locked"], serde_json::json!(true));
        assert_eq!(raw["metadata"]["owner"], serde_json::json!("ops"));
    }

    #[tokio::test]
    async fn test_store_named_by_runner_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = RunnerConfig {
            collection_name: "schema_version".to_string(),
            ..RunnerConfig::default()
        };

        let store = FileVersionStore::for_config(temp_dir.path(), &config);
        assert_eq!(store.path(), temp_dir.path().join("schema_version.json"));

        store.set_version(v("1.0")).await.unwrap();
        let other = FileVersionStore::for_config(temp_dir.path(), &RunnerConfig::default());
        assert_eq!(other.get_version().await.unwrap(), MigrationVersion::ZERO);
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVersionStore::new(temp_dir.path(), "migrations");
        std::fs::write(store.path(), "not json").unwrap();

        let err = store.get_version().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_counts_writes() {
        let store = MemoryVersionStore::at(v("1.0"));
        assert_eq!(store.get_version().await.unwrap(), v("1.0"));
        assert_eq!(store.write_count(), 0);

        store.set_version(v("1.1")).await.unwrap();
        assert_eq!(store.get_version().await.unwrap(), v("1.1"));
        assert_eq!(store.write_count(), 1);
    }
}
