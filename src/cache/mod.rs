//! Query cache with rule-based invalidation.
//!
//! This module provides an in-memory caching mechanism that:
//! - Caches query results keyed by resource type + normalized filters
//! - Serves an entry only while it is fresh; there is no TTL
//! - Marks dependent views stale when a mutation commits, using a static rule table
//! - Notifies subscribers so on-screen views can refetch

mod key;
mod layer;
mod result;
mod rules;

pub use key::{CacheKey, Filters, ResourceType};
pub use layer::{CacheLayer, Invalidated};
pub use result::{CacheResult, CacheSource, Freshness};
pub use rules::Mutation;
