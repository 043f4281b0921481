//! Occupancy server: HTTP API plus WebSocket push channel.
//!
//! Configuration comes from the environment:
//!
//! | Variable                       | Default          |
//! |--------------------------------|------------------|
//! | `GATORPARK_HTTP_ADDR`          | `127.0.0.1:3000` |
//! | `GATORPARK_PUSH_ADDR`          | `127.0.0.1:3001` |
//! | `GATORPARK_BROADCAST_CAPACITY` | `256`            |
//! | `GATORPARK_SEED_FILE`          | built-in campus  |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use gatorpark_core::{GarageRegistry, OccupancyStore};
use gatorpark_sync::{BroadcastHub, ServerConfig, SyncServer};
use log::{error, info, warn};

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_usize(name: &str, default: usize) -> usize {
    match env::var(name) {
        Ok(v) => v.parse::<usize>().unwrap_or_else(|_| {
            warn!("Ignoring {name}={v}: not a number, using {default}");
            default
        }),
        Err(_) => default,
    }
}

fn config_from_env() -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        http_addr: env_string("GATORPARK_HTTP_ADDR", &defaults.http_addr),
        push_addr: env_string("GATORPARK_PUSH_ADDR", &defaults.push_addr),
        broadcast_capacity: env_usize("GATORPARK_BROADCAST_CAPACITY", defaults.broadcast_capacity),
        seed_file: env::var_os("GATORPARK_SEED_FILE").map(PathBuf::from),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config_from_env();
    info!("Starting gatorpark-server...");

    let registry = match &config.seed_file {
        Some(path) => match GarageRegistry::load(path) {
            Ok(registry) => registry,
            Err(e) => {
                error!("Cannot load garage catalog: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => GarageRegistry::campus_default(),
    };
    info!("Serving {} garages", registry.len());

    let hub = Arc::new(BroadcastHub::new(config.broadcast_capacity));
    let store = Arc::new(OccupancyStore::new(&registry, hub.clone()));

    match SyncServer::new(config, store, hub).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server stopped: {e}");
            ExitCode::FAILURE
        }
    }
}
