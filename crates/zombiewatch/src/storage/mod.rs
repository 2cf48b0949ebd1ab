//! Persistence backends for the location store.
//!
//! The store only needs an ordered key-value structure: per key, a set of
//! unique string members each carrying an integer score. [`SortedSetBackend`]
//! captures that contract; [`MemoryBackend`] and [`SqliteBackend`] implement it
//! with identical semantics.

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod scored_set;
pub mod sqlite;

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryBackend;
pub use scored_set::ScoredSet;
pub use sqlite::SqliteBackend;

/// An ordered set-of-members-per-key store.
///
/// Within one key, members are unique and ranked ascending by
/// `(score, member)`.
#[async_trait]
pub trait SortedSetBackend: Send + Sync + Debug {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Add `member` with `score` under `key`.
    ///
    /// Returns `true` if the member was new. Adding a member that is already
    /// present changes nothing and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn add(&self, key: &str, member: &str, score: i64) -> Result<bool>;

    /// Members of `key` with a score of at least `min_score`, ascending by
    /// `(score, member)`. An unknown key yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn range_by_score(&self, key: &str, min_score: i64) -> Result<Vec<String>>;

    /// Remove all members of `key` except the `keep` highest-ranked ones.
    ///
    /// Returns the number of members removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn remove_range_by_rank(&self, key: &str, keep: usize) -> Result<usize>;

    /// Number of members stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn cardinality(&self, key: &str) -> Result<usize>;
}

/// Which backend implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Persist to a `SQLite` database file.
    #[default]
    Sqlite,
    /// Keep everything in process memory.
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Open the configured backend.
///
/// # Errors
///
/// Returns an error if the `SQLite` database cannot be opened.
pub fn open_backend(kind: BackendKind, database_path: &Path) -> Result<Arc<dyn SortedSetBackend>> {
    match kind {
        BackendKind::Sqlite => Ok(Arc::new(SqliteBackend::open(database_path)?)),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Sqlite.to_string(), "sqlite");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }

    #[test]
    fn test_backend_kind_default() {
        assert_eq!(BackendKind::default(), BackendKind::Sqlite);
    }

    #[test]
    fn test_backend_kind_deserialize() {
        let kind: BackendKind = serde_json::from_str(r#""memory""#).unwrap();
        assert_eq!(kind, BackendKind::Memory);
    }

    #[test]
    fn test_open_memory_backend() {
        let backend = open_backend(BackendKind::Memory, Path::new("unused")).unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[tokio::test]
    async fn test_backends_agree() {
        let backends: Vec<Arc<dyn SortedSetBackend>> = vec![
            Arc::new(MemoryBackend::new()),
            Arc::new(SqliteBackend::open_in_memory().unwrap()),
        ];
        for backend in backends {
            backend.add("foo", "b", 5).await.unwrap();
            backend.add("foo", "a", 5).await.unwrap();
            backend.add("foo", "c", 1).await.unwrap();
            backend.add("foo", "c", 1).await.unwrap();
            backend.remove_range_by_rank("foo", 2).await.unwrap();

            let members = backend.range_by_score("foo", i64::MIN).await.unwrap();
            assert_eq!(members, vec!["a", "b"], "backend {}", backend.name());

            // Ties at the boundary score evict the smallest member first
            for member in ["y", "x", "z"] {
                backend.add("bar", member, 5).await.unwrap();
            }
            let removed = backend.remove_range_by_rank("bar", 2).await.unwrap();
            assert_eq!(removed, 1, "backend {}", backend.name());
            let members = backend.range_by_score("bar", i64::MIN).await.unwrap();
            assert_eq!(members, vec!["y", "z"], "backend {}", backend.name());
        }
    }
}
