//! Herald - Push Notification Dispatch Server
//!
//! Listens for chat-event triggers over HTTP, resolves eligible recipients
//! with their notification preferences, rate-limits and coalesces per
//! (user, room), and dispatches encrypted Web Push notifications to every
//! registered browser endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use herald::config::{AppConfig, LoggingConfig};
use herald::metrics::Metrics;
use herald::notify::{Dispatcher, PushTransport, WebPushTransport, webpush};
use herald::rate_limiter::NotifyRateLimiter;
use herald::server::{AppState, HttpServer};
use herald::shutdown::{self, ShutdownHandler};
use herald::store::Store;
use herald::store::memory::MemoryStore;

/// Herald - Push Notification Dispatch Server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Generate a new VAPID key pair for the server
    GenerateKeys,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle subcommands
    if let Some(Command::GenerateKeys) = args.command {
        return generate_keys();
    }

    // Load configuration
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config,
        "Starting Herald"
    );

    // Initialize the push transport. Missing credentials are a recognized
    // deployment state, not a startup failure.
    let (transport, push_public_key) = if config.push.is_configured() {
        let public_key = webpush::ensure_vapid_key(&config.push.vapid_key_path)
            .await
            .context("Failed to load or create VAPID key")?;
        match WebPushTransport::new(&config.push) {
            Ok(t) => {
                info!(public_key = %public_key, "Web Push transport initialized");
                let transport: Arc<dyn PushTransport> = Arc::new(t);
                (Some(transport), Some(public_key))
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize Web Push transport");
                (None, None)
            }
        }
    } else {
        warn!("Push credentials not configured - notifications will not be sent");
        (None, None)
    };

    // Store binding behind the trait seams
    let store: Option<Arc<dyn Store>> = if config.store.is_configured() {
        info!("Store configured");
        Some(Arc::new(MemoryStore::new()))
    } else {
        warn!("Store credentials not configured - notifications will not be sent");
        None
    };

    // Metrics
    let metrics = if config.metrics.enabled {
        Some(Metrics::new().context("Failed to create metrics registry")?)
    } else {
        None
    };

    // Create the dispatcher
    let rate_limiter = NotifyRateLimiter::new(
        config.rate_limit.min_interval(),
        config.rate_limit.max_entries,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        transport,
        rate_limiter,
        metrics.clone(),
    ));

    if !dispatcher.is_ready() {
        warn!("Dispatcher not fully configured - triggers will be answered with soft no-ops");
    }

    // Initialize shutdown handler
    let shutdown_handler = ShutdownHandler::new();

    // Start HTTP server
    let http_server = HttpServer::new(
        config.server.clone(),
        AppState {
            dispatcher: dispatcher.clone(),
            store,
            push_public_key,
            metrics,
        },
    );

    let http_shutdown = shutdown_handler.subscribe();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Start periodic rate-limiter cleanup task
    let mut cleanup_shutdown = shutdown_handler.subscribe();
    let dispatcher_cleanup = dispatcher.clone();

    let cleanup_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                _ = cleanup_shutdown.changed() => {
                    break;
                }
                _ = interval.tick() => {
                    dispatcher_cleanup.cleanup().await;
                }
            }
        }
    });

    info!("Herald running");

    // Wait for shutdown signal
    shutdown_handler.wait_for_signal().await;

    info!("Initiating graceful shutdown");

    shutdown::graceful_shutdown(
        Duration::from_secs(config.server.shutdown_timeout_secs),
        || async {
            let _ = tokio::join!(http_handle, cleanup_handle);
        },
    )
    .await;

    info!("Herald stopped");
    Ok(())
}

/// Generate a new VAPID key pair and print to stdout.
fn generate_keys() -> Result<()> {
    let (pem, public_key) = webpush::generate_vapid_keypair()?;

    println!("Generated new VAPID key pair:\n");
    println!("Public key (base64url): {public_key}\n");
    println!("Private key (PEM):\n{pem}");
    println!("Write the private key to a file and point the configuration at it:");
    println!("  [push]");
    println!("  enabled = true");
    println!("  vapid_key_path = \"/var/lib/herald/vapid.pem\"");
    println!();
    println!("Or set via environment variable:");
    println!("  export HERALD_PUSH_VAPID_KEY_PATH=\"/var/lib/herald/vapid.pem\"");
    println!();
    println!("Share the public key with the frontend so browsers can subscribe");
    println!("(it is also served at GET /push-key).");

    Ok(())
}

/// Initialize the tracing subscriber based on configuration.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
        "off" => {
            // No logging
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}
