//! Core location types for zombiewatch.
//!
//! A [`Location`] is a coordinate sample stamped with a second-precision UTC
//! instant. Its canonical JSON form doubles as the storage content key: two
//! samples with the same coordinates and timestamp serialize identically and
//! collapse into one stored entry, and samples sharing a timestamp are ordered
//! by that serialized form.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A point on the earth's surface, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Create a new coordinate pair.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A driver position at a point in time.
///
/// Serializes as `{"latitude": .., "longitude": .., "updated_at": ".."}`,
/// which is both the stored record and the HTTP response element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "LocationRecord", from = "LocationRecord")]
pub struct Location {
    /// Where the driver was.
    pub coordinates: Coordinates,
    /// When the driver was there, truncated to whole seconds.
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a location, truncating the timestamp to whole seconds.
    #[must_use]
    pub fn new(coordinates: Coordinates, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinates,
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    /// The storage score of this location: its Unix timestamp in seconds.
    #[must_use]
    pub fn score(&self) -> i64 {
        self.timestamp.timestamp()
    }

    /// Serialize into the canonical content key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinates`] for non-finite coordinates, which
    /// have no JSON form.
    pub fn content_key(&self) -> Result<String> {
        let Coordinates {
            latitude,
            longitude,
        } = self.coordinates;
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(Error::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a location from a stored content key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the record is not a valid location.
    pub fn from_content_key(record: &str) -> Result<Self> {
        serde_json::from_str(record).map_err(|source| Error::Decode {
            record: record.to_string(),
            source,
        })
    }
}

/// Flat wire form of a [`Location`]. Field order defines the content key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LocationRecord {
    latitude: f64,
    longitude: f64,
    #[serde(with = "rfc3339_seconds")]
    updated_at: DateTime<Utc>,
}

impl From<Location> for LocationRecord {
    fn from(location: Location) -> Self {
        Self {
            latitude: location.coordinates.latitude,
            longitude: location.coordinates.longitude,
            updated_at: location.timestamp,
        }
    }
}

impl From<LocationRecord> for Location {
    fn from(record: LocationRecord) -> Self {
        Self::new(
            Coordinates::new(record.latitude, record.longitude),
            record.updated_at,
        )
    }
}

mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}
