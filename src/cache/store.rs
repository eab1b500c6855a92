//! Persistent resource store
//!
//! Holds the last successfully fetched payload per [`CacheKey`]. The file
//! backend survives restarts; the memory backend exists for tests and
//! throwaway runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::data::{CacheKey, CacheRecord};

/// Placeholder written for an absent key field
const NULL_SEGMENT: &str = "_";

/// Longest escaped sub-id kept verbatim in a file name
///
/// Leaves room for the resource, round and extension under the usual
/// 255-byte file name limit.
const MAX_SUB_ID_SEGMENT: usize = 160;

/// Prefix of a digested sub-id; escaped sub-ids never contain `~`
const DIGEST_PREFIX: char = '~';

/// Errors that can occur when reading or writing stored records
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read/write error
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be (de)serialized
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable key/record table with upsert semantics
///
/// At most one record exists per distinct key. Absent key fields match other
/// absent fields, never act as wildcards.
#[async_trait]
pub trait ResourceStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError>;

    /// Inserts the record, or replaces the one stored under the same key
    async fn upsert(&self, record: &CacheRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed
    async fn delete_by_key(&self, key: &CacheKey) -> Result<bool, StoreError>;

    /// Returns how many records were removed
    async fn delete_by_season_year(&self, season: i32) -> Result<usize, StoreError>;

    /// Returns how many records were removed
    async fn delete_all(&self) -> Result<usize, StoreError>;
}

/// Stores one JSON file per key on disk
///
/// Layout: `{root}/{season}/{resource}.{round}.{sub_id}.json`, with `_`
/// standing in for absent fields. Sub-ids are percent-escaped (including `_`,
/// `.` and `%`), so an escaped value can never equal the placeholder and two
/// keys map to the same path only when they are equal. Overlong sub-ids are
/// named by digest instead.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a FileStore in the XDG cache directory
    ///
    /// Uses `~/.cache/paddock/` on Linux. Returns `None` if the cache
    /// directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "paddock")?;
        Some(Self::with_dir(project_dirs.cache_dir().join("resources")))
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn season_dir(&self, season: Option<i32>) -> PathBuf {
        match season {
            Some(season) => self.root.join(season.to_string()),
            None => self.root.join(NULL_SEGMENT),
        }
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        let round = key
            .round
            .map(|r| r.to_string())
            .unwrap_or_else(|| NULL_SEGMENT.to_string());
        let sub_id = key
            .sub_id
            .as_deref()
            .map(escape_segment)
            .unwrap_or_else(|| NULL_SEGMENT.to_string());

        self.season_dir(key.season)
            .join(format!("{}.{}.{}.json", key.resource.as_str(), round, sub_id))
    }

    /// Whether `name` is a season directory this store created
    fn is_season_dir_name(name: &str) -> bool {
        name == NULL_SEGMENT || name.parse::<i32>().is_ok()
    }
}

#[async_trait]
impl ResourceStore for FileStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError> {
        let content = match fs::read_to_string(self.record_path(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CacheRecord = serde_json::from_str(&content)?;
        // Digested names can in principle be shared by two keys.
        if record.key != *key {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn upsert(&self, record: &CacheRecord) -> Result<(), StoreError> {
        let dir = self.season_dir(record.key.season);
        fs::create_dir_all(&dir).await?;

        let json = serde_json::to_vec(record)?;

        // Rename is atomic, so concurrent writers (even across processes)
        // leave exactly one complete file behind.
        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, self.record_path(&record.key)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete_by_key(&self, key: &CacheKey) -> Result<bool, StoreError> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_by_season_year(&self, season: i32) -> Result<usize, StoreError> {
        let dir = self.season_dir(Some(season));
        let removed = count_records(&dir).await?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let is_ours = name.to_str().is_some_and(Self::is_season_dir_name);
            if is_ours && entry.file_type().await?.is_dir() {
                removed += count_records(&entry.path()).await?;
                fs::remove_dir_all(entry.path()).await?;
            }
        }
        Ok(removed)
    }
}

/// Counts record files in a season directory; a missing directory has none
async fn count_records(dir: &Path) -> Result<usize, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

/// File name segment for a sub-id
///
/// Percent-encodes the value and additionally escapes `_`, `.` and `~`, so the
/// result never equals the placeholder or adds a field separator. Segments
/// longer than [`MAX_SUB_ID_SEGMENT`] are replaced by a SHA-256 digest; the
/// full key is still kept inside the record.
fn escape_segment(value: &str) -> String {
    let escaped = urlencoding::encode(value)
        .replace('_', "%5F")
        .replace('.', "%2E")
        .replace('~', "%7E");
    if escaped.len() <= MAX_SUB_ID_SEGMENT {
        return escaped;
    }
    let digest = Sha256::digest(value.as_bytes());
    format!("{}{}", DIGEST_PREFIX, hex::encode(digest))
}

/// Map-backed store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<CacheKey, CacheRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &CacheRecord) -> Result<(), StoreError> {
        self.records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn delete_by_key(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.records.remove(key).is_some())
    }

    async fn delete_by_season_year(&self, season: i32) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|key, _| key.season != Some(season));
        Ok(before.saturating_sub(self.records.len()))
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self.records.len();
        self.records.clear();
        Ok(removed)
    }
}
