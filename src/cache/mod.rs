//! Cache module for upstream API responses
//!
//! Layers, from the caller inward: an in-process memory cache with a short
//! TTL, an in-flight coalescer so concurrent callers share one fetch, and a
//! persistent store whose records are served while fresh and used as a
//! fallback when the upstream API is unavailable.

pub mod freshness;
pub mod inflight;
mod memory;
mod orchestrator;
mod store;

pub use freshness::{is_fresh, FreshnessPolicy};
pub use inflight::{Claim, InFlight, Ticket};
pub use memory::{MemoryCache, MemoryEntry};
pub use orchestrator::{
    BuildError, Orchestrator, ResolveError, ResolveResult, Resolved, Source, StoreState,
};
pub use store::{FileStore, MemoryStore, ResourceStore, StoreError};
