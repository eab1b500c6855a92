//! Command-line interface parsing for the paddock binary
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into a [`CacheConfig`] and a [`CacheKey`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::config::CacheConfig;
use crate::data::ergast::{DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT, DEFAULT_TIMEOUT_SECS};
use crate::data::{CacheKey, ResourceType};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified resource type is not recognized
    #[error(
        "Invalid resource type: '{0}'. Valid types: schedule, drivers, constructors, \
         driver_standings, constructor_standings, results, qualifying, sprint"
    )]
    InvalidResource(String),
}

/// Paddock - cached access to motorsport statistics
#[derive(Parser, Debug)]
#[command(name = "paddock")]
#[command(about = "Cached, coalesced access to the motorsport statistics API")]
#[command(version)]
pub struct Cli {
    /// Directory for stored API responses (defaults to the XDG cache directory)
    #[arg(long, env = "PADDOCK_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Hours a stored response is served without contacting the API
    #[arg(long, env = "PADDOCK_FRESHNESS_HOURS", default_value_t = 24.0, global = true)]
    pub freshness_hours: f64,

    /// Root URL of the Ergast-compatible API
    #[arg(long, env = "PADDOCK_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Upstream request timeout in seconds
    #[arg(long, env = "PADDOCK_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "PADDOCK_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a resource and print its JSON payload
    ///
    /// Examples:
    ///   paddock get schedule --season 2025
    ///   paddock get results --season 2025 --round 3
    ///   paddock get drivers --season 2025 --force
    Get {
        #[command(flatten)]
        target: KeyArgs,

        /// Ignore cached data and fetch from the API
        #[arg(long)]
        force: bool,
    },

    /// Report whether a stored resource is still fresh
    Fresh {
        #[command(flatten)]
        target: KeyArgs,
    },

    /// Delete stored resources
    Purge {
        /// Only delete resources for this season
        #[arg(long)]
        season: Option<i32>,
    },
}

/// Arguments identifying one cached resource
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Resource type (schedule, drivers, constructors, driver_standings,
    /// constructor_standings, results, qualifying, sprint)
    #[arg(value_parser = parse_resource_arg)]
    pub resource: ResourceType,

    /// Season year; omit for the current schedule
    #[arg(long)]
    pub season: Option<i32>,

    /// Round number within the season
    #[arg(long)]
    pub round: Option<u32>,

    /// Driver or constructor id
    #[arg(long = "id")]
    pub sub_id: Option<String>,
}

impl KeyArgs {
    pub fn to_key(&self) -> CacheKey {
        CacheKey {
            resource: self.resource,
            season: self.season,
            round: self.round,
            sub_id: self.sub_id.clone(),
        }
    }
}

/// Parses a resource type argument into a ResourceType.
///
/// # Arguments
/// * `s` - The resource string from CLI
///
/// # Returns
/// * `Ok(ResourceType)` if the string names a known resource type
/// * `Err(CliError::InvalidResource)` if it doesn't
pub fn parse_resource_arg(s: &str) -> Result<ResourceType, CliError> {
    s.parse().map_err(|_| CliError::InvalidResource(s.to_string()))
}

impl Cli {
    /// Builds the cache configuration from parsed CLI arguments
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            freshness_hours: self.freshness_hours,
            fetch_timeout: Duration::from_secs(self.timeout_secs),
            base_url: self.base_url.clone(),
            page_limit: DEFAULT_PAGE_LIMIT,
            cache_dir: self.cache_dir.clone(),
            ..CacheConfig::default()
        }
    }
}
