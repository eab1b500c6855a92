//! Ergast-compatible motorsport API client
//!
//! This module maps cache keys to upstream URLs and performs the single GET
//! request behind every cache miss. It is the only code that talks to the
//! network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{CacheKey, ResourceType};

/// Base URL for the Jolpica mirror of the Ergast API
pub const DEFAULT_BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Page size requested from the API (it defaults to 30 rows otherwise)
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Errors that can occur when fetching from the upstream API
///
/// Every variant is transient from the cache's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The API answered with a non-success status
    #[error("request to {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Connection or protocol failure
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The response body was not JSON
    #[error("response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Source of upstream JSON documents
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetches `url` and returns its JSON body without interpreting it
    async fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}

/// HTTP implementation of [`Upstream`] with a fixed request timeout
///
/// No retries happen here; a failed request is reported once.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("paddock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::from_reqwest("<client>", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        serde_json::from_str(&text).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// A key that has no corresponding upstream URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key} cannot be fetched: {reason}")]
pub struct InvalidKey {
    pub key: CacheKey,
    pub reason: &'static str,
}

/// URL templates for each resource type
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
    page_limit: u32,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT)
    }
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>, page_limit: u32) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            page_limit,
        }
    }

    /// Builds the upstream URL for `key`
    ///
    /// # Returns
    /// * `Ok(String)` - Absolute URL including the page limit
    /// * `Err(InvalidKey)` - If the key is missing a field its resource needs,
    ///   or carries one the resource cannot use
    pub fn url_for(&self, key: &CacheKey) -> Result<String, InvalidKey> {
        let invalid = |reason| InvalidKey {
            key: key.clone(),
            reason,
        };

        let season = match (key.resource, key.season) {
            (ResourceType::Schedule, None) if key.round.is_none() => "current".to_string(),
            (_, Some(season)) => season.to_string(),
            (_, None) => return Err(invalid("a season is required")),
        };

        // Dot segments would be resolved away by the URL parser and fetch
        // another key's document.
        if let Some(id) = &key.sub_id {
            if id.chars().all(|c| c == '.') {
                return Err(invalid("sub-id must be a non-empty path segment other than dots"));
            }
        }

        let path = match key.resource {
            ResourceType::Schedule => {
                if key.round.is_some() || key.sub_id.is_some() {
                    return Err(invalid("schedule is season-wide"));
                }
                format!("/{}", season)
            }
            ResourceType::Drivers | ResourceType::Constructors => {
                let collection = if key.resource == ResourceType::Drivers {
                    "drivers"
                } else {
                    "constructors"
                };
                let mut path = format!("/{}{}/{}", season, round_segment(key.round), collection);
                if let Some(id) = &key.sub_id {
                    path.push('/');
                    path.push_str(&urlencoding::encode(id));
                }
                path
            }
            ResourceType::DriverStandings | ResourceType::ConstructorStandings => {
                if key.sub_id.is_some() {
                    return Err(invalid("standings take no sub-id"));
                }
                let table = if key.resource == ResourceType::DriverStandings {
                    "driverStandings"
                } else {
                    "constructorStandings"
                };
                format!("/{}{}/{}", season, round_segment(key.round), table)
            }
            ResourceType::Results => {
                let round = key.round.ok_or_else(|| invalid("results need a round"))?;
                match &key.sub_id {
                    Some(driver) => format!(
                        "/{}/{}/drivers/{}/results",
                        season,
                        round,
                        urlencoding::encode(driver)
                    ),
                    None => format!("/{}/{}/results", season, round),
                }
            }
            ResourceType::Qualifying | ResourceType::Sprint => {
                let round = key.round.ok_or_else(|| invalid("a round is required"))?;
                if key.sub_id.is_some() {
                    return Err(invalid("round classifications take no sub-id"));
                }
                format!("/{}/{}/{}", season, round, key.resource.as_str())
            }
        };

        Ok(format!(
            "{}{}.json?limit={}",
            self.base_url, path, self.page_limit
        ))
    }
}

fn round_segment(round: Option<u32>) -> String {
    round.map(|r| format!("/{}", r)).unwrap_or_default()
}
