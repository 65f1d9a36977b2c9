//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

use super::key::{CacheKey, ResourceType};
use super::result::{CacheResult, Freshness};
use super::rules::Mutation;
use crate::api::error::{ApiError, Result};

/// Notification sent to subscribers when cached views go stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidated {
  /// Mutation that caused the invalidation, if any
  pub mutation: Option<Mutation>,
  pub resources: Vec<ResourceType>,
  /// Number of entries marked stale
  pub entries: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
  /// None while the first fetch for the key is in flight
  payload: Option<Value>,
  freshness: Freshness,
  fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheState {
  entries: HashMap<CacheKey, CacheEntry>,
  /// Per-resource invalidation counter. A fetch that started under an older
  /// epoch finished after an invalidation and must not be stored as fresh.
  epochs: HashMap<ResourceType, u64>,
}

impl CacheState {
  fn epoch(&self, resource: ResourceType) -> u64 {
    self.epochs.get(&resource).copied().unwrap_or(0)
  }
}

/// In-memory query cache keyed by resource type and filters.
///
/// Entries never expire on their own; they are only replaced by a fetch or
/// marked stale by invalidation. Stale entries are never served.
#[derive(Clone)]
pub struct CacheLayer {
  state: Arc<Mutex<CacheState>>,
  events: broadcast::Sender<Invalidated>,
}

impl Default for CacheLayer {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheLayer {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      state: Arc::new(Mutex::new(CacheState::default())),
      events,
    }
  }

  fn state(&self) -> Result<MutexGuard<'_, CacheState>> {
    self
      .state
      .lock()
      .map_err(|e| ApiError::Storage(format!("Cache lock poisoned: {}", e)))
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Fresh entry - return it without calling the fetcher
  /// 2. Missing or stale - call the fetcher and store the result
  /// 3. Fetcher error - leave the cache as it was and return the error
  pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let epoch = {
      let mut state = self.state()?;

      if let Some(entry) = state.entries.get(key) {
        if let (Freshness::Fresh, Some(payload), Some(fetched_at)) =
          (entry.freshness, &entry.payload, entry.fetched_at)
        {
          debug!(%key, "cache hit");
          let data = serde_json::from_value(payload.clone())?;
          return Ok(CacheResult::from_cache(data, fetched_at));
        }
      }

      debug!(%key, "cache miss");
      state
        .entries
        .entry(key.clone())
        .or_insert(CacheEntry {
          payload: None,
          freshness: Freshness::Fetching,
          fetched_at: None,
        })
        .freshness = Freshness::Fetching;

      state.epoch(key.resource_type())
    };

    match fetcher().await {
      Ok(data) => {
        let payload = serde_json::to_value(&data)?;
        let mut state = self.state()?;

        let freshness = if state.epoch(key.resource_type()) == epoch {
          Freshness::Fresh
        } else {
          debug!(%key, "invalidated while fetching, storing as stale");
          Freshness::Stale
        };

        state.entries.insert(
          key.clone(),
          CacheEntry {
            payload: Some(payload),
            freshness,
            fetched_at: Some(Utc::now()),
          },
        );

        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        let mut state = self.state()?;

        let remove = match state.entries.get_mut(key) {
          Some(entry) if entry.payload.is_none() => true,
          Some(entry) => {
            if entry.freshness == Freshness::Fetching {
              entry.freshness = Freshness::Stale;
            }
            false
          }
          None => false,
        };
        if remove {
          state.entries.remove(key);
        }

        Err(e)
      }
    }
  }

  /// Mark every entry covered by the mutation's rule as stale.
  ///
  /// Returns the number of entries affected.
  pub fn invalidate(&self, mutation: Mutation) -> Result<usize> {
    self.mark_stale(mutation.invalidates(), Some(mutation))
  }

  /// Mark every entry of one resource type as stale.
  pub fn invalidate_resource(&self, resource: ResourceType) -> Result<usize> {
    self.mark_stale(&[resource], None)
  }

  fn mark_stale(&self, resources: &[ResourceType], mutation: Option<Mutation>) -> Result<usize> {
    let entries = {
      let mut state = self.state()?;

      for resource in resources {
        *state.epochs.entry(*resource).or_insert(0) += 1;
      }

      let mut count = 0;
      for (key, entry) in state.entries.iter_mut() {
        if resources.contains(&key.resource_type()) {
          entry.freshness = Freshness::Stale;
          count += 1;
        }
      }
      count
    };

    debug!(?mutation, ?resources, entries, "invalidated cache entries");

    // No subscribers is fine
    let _ = self.events.send(Invalidated {
      mutation,
      resources: resources.to_vec(),
      entries,
    });

    Ok(entries)
  }

  /// Drop every entry, e.g. after logout.
  pub fn clear(&self) -> Result<()> {
    let mut state = self.state()?;
    state.entries.clear();
    for resource in ResourceType::ALL {
      *state.epochs.entry(resource).or_insert(0) += 1;
    }
    Ok(())
  }

  /// Receive a notification every time entries are invalidated.
  pub fn subscribe(&self) -> broadcast::Receiver<Invalidated> {
    self.events.subscribe()
  }

  /// Freshness of an entry without fetching.
  pub fn peek(&self, key: &CacheKey) -> Result<Option<Freshness>> {
    Ok(self.state()?.entries.get(key).map(|e| e.freshness))
  }

  /// Number of entries in any state. Reports 0 if the lock is poisoned.
  pub fn len(&self) -> usize {
    self.state().map(|s| s.entries.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl std::fmt::Debug for CacheLayer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheLayer")
      .field("entries", &self.len())
      .finish_non_exhaustive()
  }
}
