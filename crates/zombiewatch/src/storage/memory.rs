//! In-process sorted-set backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::scored_set::ScoredSet;
use super::SortedSetBackend;
use crate::error::Result;

/// Sorted sets held in memory, one per key.
///
/// Each key has its own lock, so operations on different drivers never
/// contend beyond the brief map lookup.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sets: RwLock<HashMap<String, Arc<Mutex<ScoredSet>>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, key: &str) -> Option<Arc<Mutex<ScoredSet>>> {
        self.sets.read().get(key).cloned()
    }

    /// Drop the entry for `key` unless a concurrent add refilled it.
    fn forget_if_empty(&self, key: &str) {
        let mut sets = self.sets.write();
        if sets.get(key).is_some_and(|set| set.lock().is_empty()) {
            sets.remove(key);
        }
    }
}

#[async_trait]
impl SortedSetBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, key: &str, member: &str, score: i64) -> Result<bool> {
        // Insert under the map lock so an emptied set can't be forgotten
        // between lookup and insert.
        let found = self
            .sets
            .read()
            .get(key)
            .map(|set| set.lock().insert(member, score));
        let inserted = found.unwrap_or_else(|| {
            self.sets
                .write()
                .entry(key.to_string())
                .or_default()
                .lock()
                .insert(member, score)
        });
        trace!(key, score, inserted, "memory add");
        Ok(inserted)
    }

    async fn range_by_score(&self, key: &str, min_score: i64) -> Result<Vec<String>> {
        let Some(set) = self.existing(key) else {
            return Ok(Vec::new());
        };
        let members = set
            .lock()
            .range_from(min_score)
            .map(ToString::to_string)
            .collect();
        Ok(members)
    }

    async fn remove_range_by_rank(&self, key: &str, keep: usize) -> Result<usize> {
        let Some(set) = self.existing(key) else {
            return Ok(0);
        };
        let (removed, emptied) = {
            let mut set = set.lock();
            (set.retain_top(keep), set.is_empty())
        };
        if emptied {
            self.forget_if_empty(key);
        }
        Ok(removed)
    }

    async fn cardinality(&self, key: &str) -> Result<usize> {
        Ok(self.existing(key).map_or(0, |set| set.lock().len()))
    }
}
