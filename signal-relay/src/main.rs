//! Signaling relay server.
//!
//! An axum WebSocket server that lets WebRTC peers in the same room exchange
//! offers, answers and candidates. Session descriptions are never inspected;
//! the relay only reads the routing header of each message.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080, loopback origins only
//! cargo run --bin signal-relay
//!
//! # Run on custom address, allowing one web origin
//! cargo run --bin signal-relay -- --bind 127.0.0.1:9000 \
//!     --allowed-origins https://app.example.com
//!
//! # Or via environment variables
//! ADDR=:9000 WS_ALLOWED_ORIGINS='*' cargo run --bin signal-relay
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signal_relay::config::{RelayCliArgs, RelayConfig};
use signal_relay::hub::Hub;
use signal_relay::relay;

/// Time given to outbound tasks to send close frames on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        origins = %config.origin_policy,
        mailbox = config.mailbox_capacity,
        "starting signaling relay"
    );

    let hub = Arc::new(Hub::with_config(config.hub_config()));

    let server =
        relay::start_server_with_hub(&config.bind_addr, Arc::clone(&hub), config.server_options());
    match server.await {
        Ok((bound_addr, mut handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            tokio::select! {
                result = &mut handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "relay server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(rooms = hub.room_count(), clients = hub.client_count(), "shutting down");
                    hub.close_all();
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                    handle.abort();
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
