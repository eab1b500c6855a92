//! Short-lived in-process cache in front of the persistent store

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::data::CacheKey;

/// A payload held in memory until `expires_at`
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub payload: Arc<Value>,
    /// When the payload was originally fetched from upstream
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Process-local map from key to payload with a fixed TTL
///
/// Entries are never persisted. Expired entries are dropped on read and by
/// [`MemoryCache::evict_expired`].
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, MemoryEntry>,
    ttl: chrono::Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650)),
        }
    }

    /// Returns the entry for `key` if it has not expired at `now`
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<MemoryEntry> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn insert(
        &self,
        key: CacheKey,
        payload: Arc<Value>,
        fetched_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            key,
            MemoryEntry {
                payload,
                fetched_at,
                expires_at,
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry whose key belongs to `season`
    pub fn evict_season(&self, season: i32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.season != Some(season));
        before.saturating_sub(self.entries.len())
    }

    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
