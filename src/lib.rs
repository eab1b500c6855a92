//! Paddock resource cache
//!
//! Caches motorsport statistics from an Ergast-compatible API for the
//! prediction game. Consumers call [`Orchestrator::resolve`] and never touch
//! the store or the network directly.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod sweep;

pub use cache::{Orchestrator, ResolveError, Resolved, Source, StoreState};
pub use config::CacheConfig;
pub use data::{CacheKey, CacheRecord, ResourceType};
