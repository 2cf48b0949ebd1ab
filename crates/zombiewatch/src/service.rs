//! Driver-facing operations shared by the HTTP server, the ingestion workers
//! and the CLI.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::location::{Coordinates, Location};
use crate::storage::open_backend;
use crate::store::LocationStore;
use crate::zombie::{DriverStatus, ZombieClassifier};

/// Location tracking and zombie classification for drivers.
#[derive(Debug, Clone)]
pub struct DriverService {
    store: LocationStore,
    classifier: ZombieClassifier,
}

impl DriverService {
    /// Create a service over `store` that classifies with `classifier`.
    #[must_use]
    pub fn new(store: LocationStore, classifier: ZombieClassifier) -> Self {
        Self { store, classifier }
    }

    /// Open the configured backend and build a service over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub fn open(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let backend = open_backend(config.storage.backend, &config.database_path())?;
        info!(
            backend = backend.name(),
            retention = config.retention(),
            "Opened location store"
        );
        let store = LocationStore::new(
            backend,
            clock,
            config.retention(),
            config.operation_timeout(),
        );
        Ok(Self::new(
            store,
            ZombieClassifier::new(config.zombie_predicate()),
        ))
    }

    /// The underlying location store.
    #[must_use]
    pub fn store(&self) -> &LocationStore {
        &self.store
    }

    /// The classifier applied by [`Self::status`].
    #[must_use]
    pub fn classifier(&self) -> &ZombieClassifier {
        &self.classifier
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.store.clock()
    }

    /// Record that `driver_id` is at `coordinates` now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn update_location(&self, driver_id: &str, coordinates: Coordinates) -> Result<()> {
        let now = self.clock().now();
        self.store.append(driver_id, coordinates, now).await
    }

    /// Locations of `driver_id` from the last `window`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn locations(&self, driver_id: &str, window: Duration) -> Result<Vec<Location>> {
        self.store.query(driver_id, window).await
    }

    /// Whether `driver_id` is a zombie, judged over the classifier's window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn status(&self, driver_id: &str) -> Result<DriverStatus> {
        let history = self
            .store
            .query(driver_id, self.classifier.time_window())
            .await?;
        Ok(self.classifier.evaluate(driver_id, &history))
    }
}
