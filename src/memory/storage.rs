//! Durable session storage
//!
//! The store only needs full-record overwrite, enumerate-on-startup and
//! delete-by-key, so that is the whole trait.

use super::models::SessionRecord;
use crate::error::{ContextError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Longest session ID stored under its own name
const MAX_PLAIN_FILE_STEM: usize = 128;

/// Key-value persistence for session records
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Overwrite the stored record for `record.session_id`
    async fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Load every stored record
    async fn load_all(&self) -> Result<Vec<SessionRecord>>;

    /// Remove a record; returns whether one existed
    async fn delete(&self, session_id: &str) -> Result<bool>;
}

/// One pretty-printed JSON file per session
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Open (and create if needed) the storage directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            ContextError::Storage(format!("Failed to create storage dir '{}': {}", dir.display(), e))
        })?;
        info!("Session storage at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `session_id`
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }
}

/// Marks hashed stems; plain stems never contain a `.`
const HASHED_STEM_PREFIX: &str = "sha256.";

/// Session IDs that are not plain file names are stored under their SHA-256
fn file_stem(session_id: &str) -> String {
    let plain = !session_id.is_empty()
        && session_id.len() <= MAX_PLAIN_FILE_STEM
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if plain {
        session_id.to_string()
    } else {
        format!("{}{}", HASHED_STEM_PREFIX, hex::encode(Sha256::digest(session_id.as_bytes())))
    }
}

#[async_trait]
impl SessionStorage for JsonFileStorage {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        let path = self.path_for(&record.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record)?;

        let mut tmp_file = fs::File::create(&tmp_path).await.map_err(|e| {
            ContextError::Storage(format!("Failed to create temp file '{}': {}", tmp_path.display(), e))
        })?;
        tmp_file.write_all(&body).await.map_err(|e| {
            ContextError::Storage(format!("Failed to write temp file '{}': {}", tmp_path.display(), e))
        })?;
        tmp_file.sync_all().await.map_err(|e| {
            ContextError::Storage(format!("Failed to sync temp file '{}': {}", tmp_path.display(), e))
        })?;
        drop(tmp_file);

        fs::rename(&tmp_path, &path).await.map_err(|e| {
            ContextError::Storage(format!(
                "Failed to rename '{}' to '{}': {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        debug!("Saved session {} ({} turns)", record.session_id, record.messages.len());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<SessionRecord>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            ContextError::Storage(format!("Failed to read storage dir '{}': {}", self.dir.display(), e))
        })?;

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable session file {}: {}", path.display(), e);
                    continue;
                }
            };

            match serde_json::from_slice::<SessionRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed session file {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} sessions from {}", records.len(), self.dir.display());
        Ok(records)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ContextError::Storage(format!(
                "Failed to delete '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Process-local storage for tests and ephemeral deployments
#[derive(Default)]
pub struct InMemoryStorage {
    records: DashMap<String, SessionRecord>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed storage with existing records
    pub fn with_records(records: impl IntoIterator<Item = SessionRecord>) -> Self {
        let storage = Self::new();
        for record in records {
            storage.records.insert(record.session_id.clone(), record);
        }
        storage
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.records.get(session_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemoryStorage {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        self.records.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.records.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::models::Turn;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str) -> SessionRecord {
        let mut record = SessionRecord::new(id);
        record.messages.push(Turn::new("coder", "hello", json!({"response": "hi"})));
        record.agents_used.insert("coder".to_string());
        record
    }

    #[test]
    fn test_file_stem_hashes_unsafe_ids() {
        assert_eq!(file_stem("session-42_a"), "session-42_a");

        let hashed = file_stem("../etc/passwd");
        let digest = hashed.strip_prefix(HASHED_STEM_PREFIX).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hashed, file_stem("../etc/passwd"));
        assert!(file_stem("").starts_with(HASHED_STEM_PREFIX));
    }

    #[tokio::test]
    async fn test_hex_id_does_not_collide_with_hashed_id() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::open(dir.path()).await.unwrap();

        let unsafe_id = "team/alpha";
        let digest = file_stem(unsafe_id).strip_prefix(HASHED_STEM_PREFIX).unwrap().to_string();
        assert_eq!(file_stem(&digest), digest);
        assert_ne!(storage.path_for(&digest), storage.path_for(unsafe_id));

        storage.save(&record(unsafe_id)).await.unwrap();
        storage.save(&record(&digest)).await.unwrap();

        let mut ids: Vec<String> = storage.load_all().await.unwrap().into_iter().map(|r| r.session_id).collect();
        ids.sort();
        let mut expected = vec![digest.clone(), unsafe_id.to_string()];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(storage.delete(&digest).await.unwrap());
        assert!(storage.path_for(unsafe_id).exists());
    }

    #[tokio::test]
    async fn test_json_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::open(dir.path()).await.unwrap();

        storage.save(&record("alpha")).await.unwrap();
        storage.save(&record("user/with spaces")).await.unwrap();

        let mut loaded = storage.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], record_with_time("alpha", &loaded[0]));
        assert_eq!(loaded[1].session_id, "user/with spaces");
        assert!(storage.path_for("alpha").exists());
    }

    fn record_with_time(id: &str, like: &SessionRecord) -> SessionRecord {
        let mut expected = record(id);
        expected.created_at = like.created_at;
        expected.messages[0].timestamp = like.messages[0].timestamp;
        expected
    }

    #[tokio::test]
    async fn test_json_storage_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::open(dir.path()).await.unwrap();

        let mut rec = record("alpha");
        storage.save(&rec).await.unwrap();
        rec.summary = Some("summary".to_string());
        storage.save(&rec).await.unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].summary.as_deref(), Some("summary"));
    }

    #[tokio::test]
    async fn test_json_storage_skips_malformed_files() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::open(dir.path()).await.unwrap();
        storage.save(&record("good")).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].session_id, "good");
    }

    #[tokio::test]
    async fn test_json_storage_delete() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::open(dir.path()).await.unwrap();
        storage.save(&record("alpha")).await.unwrap();

        assert!(storage.delete("alpha").await.unwrap());
        assert!(!storage.delete("alpha").await.unwrap());
        assert!(storage.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        storage.save(&record("alpha")).await.unwrap();
        assert_eq!(storage.len(), 1);
        assert!(storage.get("alpha").is_some());
        assert!(storage.delete("alpha").await.unwrap());
        assert!(!storage.delete("alpha").await.unwrap());
        assert!(storage.is_empty());
    }
}
