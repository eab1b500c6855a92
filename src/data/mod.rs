//! Core data models for the resource cache
//!
//! This module contains the composite cache key, the persisted record shape
//! and the upstream client used to fetch motorsport statistics.

pub mod ergast;

pub use ergast::{Endpoints, FetchError, HttpFetcher, InvalidKey, Upstream};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of upstream data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Race calendar for a season
    Schedule,
    /// Drivers entered in a season (or round)
    Drivers,
    /// Constructors entered in a season (or round)
    Constructors,
    /// Drivers' championship standings
    DriverStandings,
    /// Constructors' championship standings
    ConstructorStandings,
    /// Race classification for a round
    Results,
    /// Qualifying classification for a round
    Qualifying,
    /// Sprint classification for a round
    Sprint,
}

impl ResourceType {
    pub const ALL: [ResourceType; 8] = [
        ResourceType::Schedule,
        ResourceType::Drivers,
        ResourceType::Constructors,
        ResourceType::DriverStandings,
        ResourceType::ConstructorStandings,
        ResourceType::Results,
        ResourceType::Qualifying,
        ResourceType::Sprint,
    ];

    /// Stable lowercase name, also used in on-disk file names
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Schedule => "schedule",
            ResourceType::Drivers => "drivers",
            ResourceType::Constructors => "constructors",
            ResourceType::DriverStandings => "driver_standings",
            ResourceType::ConstructorStandings => "constructor_standings",
            ResourceType::Results => "results",
            ResourceType::Qualifying => "qualifying",
            ResourceType::Sprint => "sprint",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a resource type name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type '{0}'")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    /// Parses a resource type, accepting a few common aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "schedule" | "calendar" => Ok(ResourceType::Schedule),
            "drivers" => Ok(ResourceType::Drivers),
            "constructors" | "teams" => Ok(ResourceType::Constructors),
            "driver_standings" | "standings" => Ok(ResourceType::DriverStandings),
            "constructor_standings" => Ok(ResourceType::ConstructorStandings),
            "results" => Ok(ResourceType::Results),
            "qualifying" => Ok(ResourceType::Qualifying),
            "sprint" => Ok(ResourceType::Sprint),
            _ => Err(UnknownResourceType(s.to_string())),
        }
    }
}

/// Composite identifier of a cached resource
///
/// Absent fields compare equal to each other, so `{schedule, 2025, None, None}`
/// always names the same record no matter how often it is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub resource: ResourceType,
    pub season: Option<i32>,
    pub round: Option<u32>,
    pub sub_id: Option<String>,
}

impl CacheKey {
    /// Key for a whole-season resource
    pub fn season(resource: ResourceType, season: i32) -> Self {
        Self {
            resource,
            season: Some(season),
            round: None,
            sub_id: None,
        }
    }

    /// Key for a single-round resource
    pub fn round(resource: ResourceType, season: i32, round: u32) -> Self {
        Self {
            resource,
            season: Some(season),
            round: Some(round),
            sub_id: None,
        }
    }

    pub fn with_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sub_id = Some(sub_id.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        match self.season {
            Some(season) => write!(f, "/{}", season)?,
            None => f.write_str("/-")?,
        }
        match self.round {
            Some(round) => write!(f, "/{}", round)?,
            None => f.write_str("/-")?,
        }
        match &self.sub_id {
            Some(sub_id) => write!(f, "/{}", sub_id),
            None => f.write_str("/-"),
        }
    }
}

/// Last successfully fetched payload for a key
///
/// Records are always replaced whole; nothing edits a stored payload in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: CacheKey,
    /// Upstream JSON document, stored as received
    pub payload: Value,
    /// When the payload was fetched from upstream
    pub fetched_at: DateTime<Utc>,
}
