//! Bounded, time-ordered per-driver location store.
//!
//! Each driver key maps to a sorted set whose members are location content
//! keys scored by their Unix timestamp. After every append the set is trimmed
//! to the `retention` most recent entries. Insert and trim are two separate
//! backend calls: concurrent appends for one driver may briefly exceed the
//! bound, and the last trim to finish restores it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::location::{Coordinates, Location};
use crate::storage::SortedSetBackend;

/// Location history storage keyed by driver.
#[derive(Debug, Clone)]
pub struct LocationStore {
    backend: Arc<dyn SortedSetBackend>,
    clock: Arc<dyn Clock>,
    retention: usize,
    timeout: Duration,
}

impl LocationStore {
    /// Create a store over `backend`.
    ///
    /// `retention` is the maximum number of entries kept per driver; zero
    /// keeps nothing. Every backend call is bounded by `timeout`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SortedSetBackend>,
        clock: Arc<dyn Clock>,
        retention: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            clock,
            retention,
            timeout,
        }
    }

    /// The clock used to resolve query windows.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The per-driver retention bound.
    #[must_use]
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Record a location for `driver_key`, then evict entries beyond the
    /// retention bound.
    ///
    /// Appending a `(coordinates, timestamp)` pair that is already stored is
    /// a no-op apart from the trim.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn append(
        &self,
        driver_key: &str,
        coordinates: Coordinates,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let location = Location::new(coordinates, timestamp);
        let member = location.content_key()?;

        debug!(driver_id = driver_key, location = %member, "Save new driver location");
        let inserted = self
            .bounded("save driver location", self.backend.add(driver_key, &member, location.score()))
            .await?;

        let evicted = self
            .bounded(
                "clean old driver locations",
                self.backend.remove_range_by_rank(driver_key, self.retention),
            )
            .await?;
        debug!(driver_id = driver_key, inserted, evicted, "Cleaned old driver locations");

        Ok(())
    }

    /// Locations of `driver_key` recorded within `window` of now, ascending by
    /// timestamp and then by content key.
    ///
    /// An unknown driver or an empty window yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out, or if any stored
    /// record cannot be decoded.
    pub async fn query(&self, driver_key: &str, window: Duration) -> Result<Vec<Location>> {
        let min_score = self.min_score(window);
        debug!(driver_id = driver_key, min_score, "Get driver locations by time range");

        let records = self
            .bounded(
                "get driver locations",
                self.backend.range_by_score(driver_key, min_score),
            )
            .await?;
        info!(
            driver_id = driver_key,
            locations_num = records.len(),
            "Retrieved driver locations"
        );

        records
            .iter()
            .map(|record| Location::from_content_key(record))
            .collect()
    }

    /// Number of entries currently stored for `driver_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn count(&self, driver_key: &str) -> Result<usize> {
        self.bounded("count driver locations", self.backend.cardinality(driver_key))
            .await
    }

    fn min_score(&self, window: Duration) -> i64 {
        let now = self.clock.now();
        chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .map_or(i64::MIN, |since| since.timestamp())
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::timeout(format!("{operation} via {}", self.backend.name())))?
    }
}
