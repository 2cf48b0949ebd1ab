//! HTTP interface.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /drivers/:id/locations?minutes=N` | location history of the last N minutes |
//! | `GET /drivers/:id` | zombie status |
//! | `PATCH /drivers/:id/locations` | publish a location update to the ingestion topic |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::ingest::{encode_message, Publisher};
use crate::location::Location;
use crate::service::DriverService;
use crate::zombie::DriverStatus;

const MINUTES_PARAM: &str = "minutes";

/// Errors returned to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was invalid; the message is sent to the client.
    #[error("{0}")]
    BadRequest(String),
    /// Something failed on our side; details are only logged.
    #[error("internal server error: {0}")]
    Internal(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                info!(%message, "Request is invalid, return 400");
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            Self::Internal(e) => {
                error!(error = %e, "Unhandled error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Gateway {
    publisher: Publisher,
    command: Arc<str>,
}

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<DriverService>,
    gateway: Option<Gateway>,
}

impl AppState {
    /// State serving the query routes only.
    #[must_use]
    pub fn new(service: Arc<DriverService>) -> Self {
        Self {
            service,
            gateway: None,
        }
    }

    /// Also accept location updates and publish them with `command`.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Publisher, command: &str) -> Self {
        self.gateway = Some(Gateway {
            publisher,
            command: Arc::from(command),
        });
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let locations = if state.gateway.is_some() {
        get(get_locations).patch(publish_location)
    } else {
        get(get_locations)
    };

    Router::new()
        .route("/drivers/:id/locations", locations)
        .route("/drivers/:id", get(get_status))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn log_request(request: Request, next: Next) -> Response {
    info!(method = %request.method(), path = %request.uri(), "Received request");
    next.run(request).await
}

async fn get_locations(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Json<Vec<Location>>, ApiError> {
    let minutes = parse_minutes(&params)?;
    let window = Duration::from_secs(minutes.saturating_mul(60));

    info!(driver_id = %driver_id, minutes, "Request driver locations");
    let locations = state.service.locations(&driver_id, window).await?;
    Ok(Json(locations))
}

async fn get_status(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
) -> std::result::Result<Json<DriverStatus>, ApiError> {
    info!(driver_id = %driver_id, "Request driver status");
    Ok(Json(state.service.status(&driver_id).await?))
}

async fn publish_location(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    body: Bytes,
) -> std::result::Result<&'static str, ApiError> {
    let gateway = state.gateway.as_ref().ok_or(Error::QueueClosed)?;
    let data = merge_request_data(&driver_id, parse_body(&body)?);

    let message = encode_message(&gateway.command, &data)?;
    let message_id = gateway.publisher.publish(message).await?;
    info!(driver_id = %driver_id, message_id, "Published location update");

    Ok("OK")
}

fn parse_minutes(params: &[(String, String)]) -> std::result::Result<u64, ApiError> {
    let raw = params
        .iter()
        .find(|(name, _)| name == MINUTES_PARAM)
        .map(|(_, value)| value)
        .ok_or_else(|| ApiError::BadRequest("'minutes' query param is missing".to_string()))?;

    let minutes: i64 = raw.parse().map_err(|_| {
        ApiError::BadRequest("'minutes' query param must be a number".to_string())
    })?;

    u64::try_from(minutes).map_err(|_| {
        ApiError::BadRequest("'minutes' query param must not be negative".to_string())
    })
}

/// An empty body or `null` carries no fields; anything else must be an object.
fn parse_body(body: &[u8]) -> std::result::Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    serde_json::from_slice::<Option<Map<String, Value>>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|e| ApiError::BadRequest(format!("request body parsing failed: {e}")))
}

/// Body fields take precedence over the path id.
fn merge_request_data(driver_id: &str, body: Map<String, Value>) -> Map<String, Value> {
    let mut data = Map::with_capacity(body.len() + 1);
    data.insert("id".to_string(), Value::from(driver_id));
    data.extend(body);
    data
}
