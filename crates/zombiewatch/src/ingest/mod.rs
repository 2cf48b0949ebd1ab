//! Asynchronous location ingestion.
//!
//! Location updates arrive as JSON messages on an in-process topic:
//!
//! ```json
//! {"command": "update-driver-locations", "data": {"id": "foo", "latitude": 48.86, "longitude": 2.35}}
//! ```
//!
//! [`IngestHandler`] turns one message body into a store write. Messages that
//! can never succeed (bad JSON, unknown command, missing fields) are
//! discarded; store failures are returned so the queue can redeliver.

pub mod queue;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::Result;
use crate::location::Coordinates;
use crate::service::DriverService;

pub use queue::{channel, Consumer, Delivery, MessageHandler, Publisher};

/// Command carried by location update messages.
pub const UPDATE_LOCATION_COMMAND: &str = "update-driver-locations";

/// What happened to a message that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The location was recorded.
    Applied,
    /// The message was acknowledged without effect.
    Discarded(DiscardReason),
}

/// Why a message was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The message body was empty.
    EmptyBody,
    /// The body was not a JSON object of the expected shape.
    Malformed(String),
    /// The command is not one this handler processes.
    UnsupportedCommand(String),
    /// One of `id`, `latitude` or `longitude` was missing.
    IncompleteData,
    /// The store refused the location for a reason a retry cannot fix.
    Rejected(String),
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBody => write!(f, "message has an empty body"),
            Self::Malformed(reason) => write!(f, "cannot decode message body: {reason}"),
            Self::UnsupportedCommand(command) => write!(f, "unsupported command {command:?}"),
            Self::IncompleteData => write!(
                f,
                "data is incomplete: 'id', 'latitude', 'longitude' fields must be set"
            ),
            Self::Rejected(reason) => write!(f, "location rejected: {reason}"),
        }
    }
}

/// Wire shape of a topic message.
#[derive(Debug, Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    data: RequestData,
}

#[derive(Debug, Default, Deserialize)]
struct RequestData {
    id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    command: &'a str,
    data: &'a Map<String, Value>,
}

/// Encode a topic message carrying `command` and `data`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_message(command: &str, data: &Map<String, Value>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&Envelope { command, data })?)
}

/// Applies location update messages to a [`DriverService`].
#[derive(Debug, Clone)]
pub struct IngestHandler {
    service: Arc<DriverService>,
    command: String,
}

impl IngestHandler {
    /// Create a handler accepting messages with `command`.
    #[must_use]
    pub fn new(service: Arc<DriverService>, command: impl Into<String>) -> Self {
        Self {
            service,
            command: command.into(),
        }
    }

    /// Process one message body.
    ///
    /// # Errors
    ///
    /// Returns backend errors; the message should be redelivered. Other store
    /// errors discard the message.
    pub async fn handle_message(&self, body: &[u8]) -> Result<Disposition> {
        let request = match parse_request(body) {
            Ok(request) => request,
            Err(reason) => {
                info!(%reason, "Couldn't parse message, finish processing");
                return Ok(Disposition::Discarded(reason));
            }
        };

        if request.command != self.command {
            info!(command = %request.command, "Message contains unsupported command");
            return Ok(Disposition::Discarded(DiscardReason::UnsupportedCommand(
                request.command,
            )));
        }

        let RequestData {
            id: Some(driver_id),
            latitude: Some(latitude),
            longitude: Some(longitude),
        } = request.data
        else {
            info!(
                command = %request.command,
                "{}, finish processing",
                DiscardReason::IncompleteData
            );
            return Ok(Disposition::Discarded(DiscardReason::IncompleteData));
        };

        info!(driver_id = %driver_id, "Update driver location");
        match self
            .service
            .update_location(&driver_id, Coordinates::new(latitude, longitude))
            .await
        {
            Ok(()) => Ok(Disposition::Applied),
            Err(e) if e.is_backend_error() => {
                error!(driver_id = %driver_id, error = %e, "Failed to update driver location");
                Err(e)
            }
            Err(e) => {
                info!(driver_id = %driver_id, error = %e, "Location rejected, finish processing");
                Ok(Disposition::Discarded(DiscardReason::Rejected(e.to_string())))
            }
        }
    }
}

#[async_trait]
impl MessageHandler for IngestHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<Disposition> {
        self.handle_message(&delivery.body).await
    }
}

fn parse_request(body: &[u8]) -> std::result::Result<Request, DiscardReason> {
    if body.is_empty() {
        return Err(DiscardReason::EmptyBody);
    }
    serde_json::from_slice(body).map_err(|e| DiscardReason::Malformed(e.to_string()))
}
