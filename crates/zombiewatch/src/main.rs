//! `zombiewatch` - CLI and server for zombiewatch
//!
//! This binary runs the location ingestion and query server, and offers
//! one-shot commands for inspecting stored driver locations.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use zombiewatch::cli::{Cli, Command, ConfigCommand, LocationsCommand, ServeCommand, StatusCommand};
use zombiewatch::http::{self, AppState};
use zombiewatch::ingest::{self, IngestHandler};
use zombiewatch::{init_logging, BackendKind, Config, DriverService, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, serve_cmd).await,
        Command::Locations(locations_cmd) => handle_locations(&config, &locations_cmd).await,
        Command::Status(status_cmd) => handle_status(&config, &status_cmd).await,
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.http.host = host;
    }
    if let Some(port) = cmd.port {
        config.http.port = port;
    }
    config.validate()?;
    let addr = config.listen_addr().await?;

    let service = Arc::new(DriverService::open(&config, Arc::new(SystemClock))?);

    let (publisher, consumer) = ingest::channel(config.ingest.queue_capacity);
    let consumer = consumer.with_retry(config.ingest.max_attempts, config.requeue_delay());
    let handler = Arc::new(IngestHandler::new(
        service.clone(),
        config.ingest.command.clone(),
    ));
    let token = CancellationToken::new();
    let mut workers = tokio::spawn(consumer.run(handler, config.ingest.workers, token.clone()));
    info!(
        topic = %config.ingest.topic,
        workers = config.ingest.workers,
        "Consuming location updates"
    );

    let state = AppState::new(service).with_publisher(publisher, &config.ingest.command);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let http_stop = CancellationToken::new();
    let stop = http_stop.clone();
    let mut server = tokio::spawn(http::serve(listener, state, async move {
        stop.cancelled().await;
    }));

    let served = tokio::select! {
        () = shutdown_signal() => None,
        joined = &mut server => Some(joined),
    };
    info!("Shutting down");
    http_stop.cancel();

    let served = match served {
        Some(joined) => Some(joined),
        None => tokio::time::timeout(config.shutdown_timeout(), &mut server)
            .await
            .ok(),
    };
    let served = match served {
        Some(joined) => joined.context("HTTP server task failed"),
        None => {
            warn!(
                timeout_secs = config.http.shutdown_timeout_secs,
                "HTTP server did not stop in time, aborting"
            );
            server.abort();
            Ok(Ok(()))
        }
    };

    // The server owned the last publisher, so the consumer now drains the
    // topic and returns on its own.
    info!("Draining ingestion topic");
    if tokio::time::timeout(config.shutdown_timeout(), &mut workers)
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.http.shutdown_timeout_secs,
            "Ingestion workers did not drain in time, stopping them"
        );
        token.cancel();
        match workers.await {
            Ok(0) => {}
            Ok(dropped) => warn!(dropped, "Location updates lost on shutdown"),
            Err(e) => error!(error = %e, "Ingestion consumer task failed"),
        }
    }

    served??;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c"),
        () = terminate => info!("Received SIGTERM"),
    }
}

fn open_service(config: &Config) -> anyhow::Result<DriverService> {
    if config.storage.backend == BackendKind::Memory {
        warn!("Memory backend configured: there are no stored locations to read");
    }
    Ok(DriverService::open(config, Arc::new(SystemClock))?)
}

async fn handle_locations(config: &Config, cmd: &LocationsCommand) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let window = Duration::from_secs(cmd.minutes.saturating_mul(60));
    let locations = service.locations(&cmd.driver, window).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&locations)?);
    } else if locations.is_empty() {
        println!(
            "No locations for driver {} in the last {} minutes",
            cmd.driver, cmd.minutes
        );
    } else {
        println!("Locations of driver {} (oldest first)", cmd.driver);
        for location in &locations {
            println!(
                "  {}  {:>11.6} {:>11.6}",
                location.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                location.coordinates.latitude,
                location.coordinates.longitude
            );
        }
    }
    Ok(())
}

async fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let status = service.status(&cmd.driver).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let predicate = service.classifier().predicate();
        println!("Driver:     {}", status.id);
        println!(
            "Zombie:     {}",
            if status.zombie { "yes" } else { "no" }
        );
        println!(
            "Criterion:  less than {} m in the last {} s",
            predicate.distance_threshold_meters,
            predicate.time_window.as_secs()
        );
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Backend:            {}", config.storage.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Locations limit:    {}", config.storage.locations_limit);
                println!(
                    "  Timeout (ms):       {}",
                    config.storage.operation_timeout_ms
                );
                println!();
                println!("[Zombie]");
                println!(
                    "  Distance (m):       {}",
                    config.zombie.distance_threshold_meters
                );
                println!("  Window (s):         {}", config.zombie.time_window_secs);
                println!();
                println!("[HTTP]");
                println!("  Listen:             {}:{}", config.http.host, config.http.port);
                println!();
                println!("[Ingest]");
                println!("  Topic:              {}", config.ingest.topic);
                println!("  Command:            {}", config.ingest.command);
                println!("  Workers:            {}", config.ingest.workers);
                println!("  Max attempts:       {}", config.ingest.max_attempts);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
