//! Cache orchestrator
//!
//! Composes the memory cache, in-flight coalescer, persistent store and
//! upstream fetcher behind a single [`Orchestrator::resolve`] call. This is
//! the only surface the rest of the application uses to obtain upstream data.
//!
//! Resolution order for a non-forced call:
//!
//! 1. memory cache hit → return
//! 2. fetch already in flight for the key → wait for its result
//! 3. fresh record in the store → cache in memory, return
//! 4. fetch upstream → persist, cache in memory, return; on failure fall back
//!    to whatever record the store holds, however old
//!
//! A forced call skips 1–3 but still never runs alongside another fetch for
//! the same key.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::freshness::FreshnessPolicy;
use super::inflight::{Claim, InFlight};
use super::memory::MemoryCache;
use super::store::{FileStore, ResourceStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::data::{CacheKey, CacheRecord, Endpoints, FetchError, HttpFetcher, InvalidKey, Upstream};
use crate::sweep::SweepHandle;

/// Where a resolved payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// In-process memory cache
    Memory,
    /// Fresh record from the persistent store
    Store,
    /// Fetched from upstream by this resolution
    Network,
    /// Upstream failed; served the last stored record regardless of age
    Stale,
}

/// A successfully resolved payload
#[derive(Debug, Clone)]
pub struct Resolved {
    pub payload: Arc<Value>,
    /// When the payload was fetched from upstream
    pub fetched_at: DateTime<Utc>,
    pub source: Source,
}

impl Resolved {
    /// True when the payload was served only because upstream failed
    pub fn is_stale(&self) -> bool {
        self.source == Source::Stale
    }
}

/// Errors returned by [`Orchestrator::resolve`]
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Upstream failed and nothing was ever stored for the key
    #[error("{key} is unavailable: {source}")]
    Unavailable {
        key: CacheKey,
        #[source]
        source: FetchError,
    },

    /// The key has no upstream URL
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    /// The task running the fetch went away without reporting a result
    #[error("fetch for {key} was abandoned before it settled")]
    Abandoned { key: CacheKey },
}

pub type ResolveResult = Result<Resolved, ResolveError>;

/// State of the stored record for a key, judged without the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Fresh,
    Stale,
    Missing,
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StoreState::Fresh => "fresh",
            StoreState::Stale => "stale",
            StoreState::Missing => "missing",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while building an orchestrator from configuration
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not determine a cache directory; set one explicitly")]
    NoCacheDir,

    #[error("could not create HTTP client: {0}")]
    Http(#[from] FetchError),
}

struct Inner {
    store: Arc<dyn ResourceStore>,
    upstream: Arc<dyn Upstream>,
    endpoints: Endpoints,
    memory: Arc<MemoryCache>,
    inflight: InFlight<CacheKey, ResolveResult>,
    freshness: FreshnessPolicy,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
}

/// Shared handle to the cache; clones refer to the same state
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.inner.store)
            .field("endpoints", &self.inner.endpoints)
            .field("memory_entries", &self.inner.memory.len())
            .field("inflight", &self.inner.inflight)
            .field("freshness", &self.inner.freshness)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        config: &CacheConfig,
        store: Arc<dyn ResourceStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self::with_clock(config, store, upstream, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &CacheConfig,
        store: Arc<dyn ResourceStore>,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                upstream,
                endpoints: Endpoints::new(config.base_url.clone(), config.page_limit),
                memory: Arc::new(MemoryCache::new(config.memory_ttl)),
                inflight: InFlight::new(),
                freshness: FreshnessPolicy::new(config.freshness_hours),
                sweep_interval: config.sweep_interval,
                clock,
            }),
        }
    }

    /// Builds an orchestrator backed by a [`FileStore`] and [`HttpFetcher`]
    pub fn from_config(config: &CacheConfig) -> Result<Self, BuildError> {
        let store = match &config.cache_dir {
            Some(dir) => FileStore::with_dir(dir.clone()),
            None => FileStore::new().ok_or(BuildError::NoCacheDir)?,
        };
        let upstream = HttpFetcher::new(config.fetch_timeout)?;
        Ok(Self::new(config, Arc::new(store), Arc::new(upstream)))
    }

    /// Returns the payload for `key`
    ///
    /// # Arguments
    /// * `key` - The resource to resolve
    /// * `force_refresh` - Skip the memory cache and freshness check and go to
    ///   upstream
    ///
    /// # Returns
    /// * `Ok(Resolved)` - Payload, possibly stale if upstream failed
    /// * `Err(ResolveError)` - Upstream failed and nothing was stored, or the
    ///   key has no upstream URL
    pub async fn resolve(&self, key: &CacheKey, force_refresh: bool) -> ResolveResult {
        let url = self.inner.endpoints.url_for(key)?;

        if !force_refresh {
            if let Some(entry) = self.inner.memory.get(key, self.inner.clock.now()) {
                debug!(%key, "memory cache hit");
                return Ok(Resolved {
                    payload: entry.payload,
                    fetched_at: entry.fetched_at,
                    source: Source::Memory,
                });
            }
        }

        loop {
            match self.inner.inflight.get_or_create(key.clone()) {
                Claim::Existing(ticket) if !force_refresh => {
                    debug!(%key, "joining in-flight fetch");
                    return self.settled(key, ticket.await);
                }
                Claim::Existing(ticket) => {
                    debug!(%key, "forced refresh waiting for in-flight fetch");
                    let _ = ticket.await;
                }
                Claim::Created { ticket, resolver } => {
                    // The fetch runs on its own task so it completes even if
                    // every caller waiting on it is dropped.
                    let this = self.clone();
                    let owned_key = key.clone();
                    let url = url.clone();
                    tokio::spawn(async move {
                        let result = this.load(&owned_key, &url, force_refresh).await;
                        this.inner.inflight.settle(&owned_key, resolver, result);
                    });
                    return self.settled(key, ticket.await);
                }
            }
        }
    }

    /// Whether the stored record for `key` is within the freshness window
    ///
    /// Never touches the network. A missing or unreadable record is not fresh.
    pub async fn is_fresh(&self, key: &CacheKey) -> bool {
        self.store_state(key).await == StoreState::Fresh
    }

    /// Classifies the stored record for `key`; an unreadable record is missing
    pub async fn store_state(&self, key: &CacheKey) -> StoreState {
        match self.read_store(key).await {
            Some(record)
                if self
                    .inner
                    .freshness
                    .is_fresh(record.fetched_at, self.inner.clock.now()) =>
            {
                StoreState::Fresh
            }
            Some(_) => StoreState::Stale,
            None => StoreState::Missing,
        }
    }

    /// Removes every stored record and memory entry
    pub async fn purge_all(&self) -> Result<usize, StoreError> {
        self.inner.memory.clear();
        let removed = self.inner.store.delete_all().await?;
        info!(removed, "purged all cached resources");
        Ok(removed)
    }

    /// Removes stored records and memory entries belonging to `season`
    pub async fn purge_season(&self, season: i32) -> Result<usize, StoreError> {
        let evicted = self.inner.memory.evict_season(season);
        let removed = self.inner.store.delete_by_season_year(season).await?;
        info!(season, removed, evicted, "purged cached season");
        Ok(removed)
    }

    /// Removes the stored record and memory entry for a single key
    pub async fn purge_key(&self, key: &CacheKey) -> Result<bool, StoreError> {
        self.inner.memory.remove(key);
        let removed = self.inner.store.delete_by_key(key).await?;
        info!(%key, removed, "purged cached resource");
        Ok(removed)
    }

    /// Starts a background task that drops expired memory entries every
    /// configured `sweep_interval`
    ///
    /// Returns `None` when the interval is zero.
    pub fn spawn_sweeper(&self) -> Option<SweepHandle> {
        let interval = self.inner.sweep_interval;
        if interval.is_zero() {
            return None;
        }
        Some(SweepHandle::spawn(
            Arc::clone(&self.inner.memory),
            Arc::clone(&self.inner.clock),
            interval,
        ))
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.inner.memory
    }

    /// Number of upstream fetches currently running
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }

    fn settled(&self, key: &CacheKey, outcome: Option<ResolveResult>) -> ResolveResult {
        outcome.unwrap_or_else(|| Err(ResolveError::Abandoned { key: key.clone() }))
    }

    /// Steps 3 and 4: store freshness check, then upstream with stale fallback
    async fn load(&self, key: &CacheKey, url: &str, force_refresh: bool) -> ResolveResult {
        if !force_refresh {
            if let Some(record) = self.read_store(key).await {
                if self
                    .inner
                    .freshness
                    .is_fresh(record.fetched_at, self.inner.clock.now())
                {
                    debug!(%key, "serving fresh store record");
                    return Ok(self.remember(record, Source::Store));
                }
            }
        }

        info!(%key, url, force_refresh, "fetching from upstream");
        match self.inner.upstream.fetch(url).await {
            Ok(payload) => {
                let record = CacheRecord {
                    key: key.clone(),
                    payload,
                    fetched_at: self.inner.clock.now(),
                };
                if let Err(e) = self.inner.store.upsert(&record).await {
                    warn!(%key, error = %e, "failed to persist fetched payload");
                }
                Ok(self.remember(record, Source::Network))
            }
            Err(err) => match self.read_store(key).await {
                Some(record) => {
                    warn!(
                        %key,
                        error = %err,
                        fetched_at = %record.fetched_at,
                        "upstream failed, serving stored record"
                    );
                    Ok(self.remember(record, Source::Stale))
                }
                None => {
                    warn!(%key, error = %err, "upstream failed and nothing is stored");
                    Err(ResolveError::Unavailable {
                        key: key.clone(),
                        source: err,
                    })
                }
            },
        }
    }

    /// Store read where errors count as "no record"
    async fn read_store(&self, key: &CacheKey) -> Option<CacheRecord> {
        match self.inner.store.get(key).await {
            Ok(record) => record,
            Err(e) => {
                warn!(%key, error = %e, "store read failed, treating as missing");
                None
            }
        }
    }

    fn remember(&self, record: CacheRecord, source: Source) -> Resolved {
        let payload = Arc::new(record.payload);
        self.inner.memory.insert(
            record.key,
            Arc::clone(&payload),
            record.fetched_at,
            self.inner.clock.now(),
        );
        Resolved {
            payload,
            fetched_at: record.fetched_at,
            source,
        }
    }
}
