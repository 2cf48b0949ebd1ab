//! Location updates travel from the HTTP gateway through the ingestion topic
//! into the store, and come back out as histories and zombie verdicts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use zombiewatch::http::{self, AppState};
use zombiewatch::ingest::{self, IngestHandler, UPDATE_LOCATION_COMMAND};
use zombiewatch::storage::SqliteBackend;
use zombiewatch::{
    DriverService, LocationStore, ManualClock, SortedSetBackend, ZombieClassifier,
    ZombiePredicate,
};

const DRIVER: &str = "foo";

fn service_with_threshold(
    backend: Arc<dyn SortedSetBackend>,
    clock: Arc<ManualClock>,
    threshold: u64,
) -> Arc<DriverService> {
    let store = LocationStore::new(backend, clock, 1000, Duration::from_secs(2));
    let classifier = ZombieClassifier::new(ZombiePredicate {
        distance_threshold_meters: threshold,
        time_window: Duration::from_secs(300),
    });
    Arc::new(DriverService::new(store, classifier))
}

async fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let status = response[9..12].parse().unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn wait_for_count(service: &DriverService, expected: usize) {
    for _ in 0..200 {
        if service.store().count(DRIVER).await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("driver never reached {expected} stored locations");
}

#[tokio::test]
async fn test_driver_becomes_zombie_depending_on_threshold() {
    let dir = std::env::temp_dir().join(format!("zombiewatch_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let backend: Arc<dyn SortedSetBackend> =
        Arc::new(SqliteBackend::open(&dir.join("locations.db")).unwrap());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2020, 11, 7, 0, 0, 0).unwrap(),
    ));

    let strict = service_with_threshold(backend.clone(), clock.clone(), 200);
    let lenient = service_with_threshold(backend, clock.clone(), 20);

    let token = CancellationToken::new();
    let (publisher, consumer) = ingest::channel(16);
    let handler = Arc::new(IngestHandler::new(strict.clone(), UPDATE_LOCATION_COMMAND));
    let workers = tokio::spawn(consumer.run(handler, 2, token.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(strict.clone()).with_publisher(publisher, UPDATE_LOCATION_COMMAND);
    let http_stop = CancellationToken::new();
    let stop = http_stop.clone();
    let server = tokio::spawn(http::serve(listener, state, async move {
        stop.cancelled().await;
    }));

    let (status, body) = request(
        addr,
        "PATCH",
        "/drivers/foo/locations",
        r#"{"latitude": 48.864193, "longitude": 2.350498}"#,
    )
    .await;
    assert_eq!((status, body.as_str()), (200, "OK"));
    wait_for_count(&strict, 1).await;

    clock.advance(chrono::Duration::seconds(5));
    let (status, _) = request(
        addr,
        "PATCH",
        "/drivers/foo/locations",
        r#"{"latitude": 48.863921, "longitude": 2.349211}"#,
    )
    .await;
    assert_eq!(status, 200);
    wait_for_count(&strict, 2).await;

    let (status, body) = request(addr, "GET", "/drivers/foo/locations?minutes=5", "").await;
    assert_eq!(status, 200);
    let locations: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        locations,
        serde_json::json!([
            {"latitude": 48.864193, "longitude": 2.350498, "updated_at": "2020-11-07T00:00:00Z"},
            {"latitude": 48.863921, "longitude": 2.349211, "updated_at": "2020-11-07T00:00:05Z"}
        ])
    );

    let (status, body) = request(addr, "GET", "/drivers/foo", "").await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"id":"foo","zombie":true}"#);

    assert!(!lenient.status(DRIVER).await.unwrap().zombie);

    let (status, body) = request(addr, "GET", "/drivers/foo/locations?minutes=abc", "").await;
    assert_eq!(status, 400);
    assert_eq!(body, "'minutes' query param must be a number");

    // Stopping the server drops the last publisher; the workers drain and exit
    http_stop.cancel();
    server.await.unwrap().unwrap();
    assert_eq!(workers.await.unwrap(), 0);
    assert!(!token.is_cancelled());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_malformed_updates_are_discarded() {
    let backend: Arc<dyn SortedSetBackend> = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2020, 11, 7, 0, 0, 0).unwrap(),
    ));
    let service = service_with_threshold(backend, clock, 500);
    let handler = IngestHandler::new(service.clone(), UPDATE_LOCATION_COMMAND);

    for body in [
        "",
        "foo",
        r#"{"command": "foo"}"#,
        r#"{"command": "update-driver-locations", "data": {"id": "foo", "latitude": 1.0}}"#,
    ] {
        let disposition = handler.handle_message(body.as_bytes()).await.unwrap();
        assert!(matches!(disposition, zombiewatch::Disposition::Discarded(_)));
    }
    assert_eq!(service.store().count(DRIVER).await.unwrap(), 0);
    assert!(service.status(DRIVER).await.unwrap().zombie);
}
