//! HTTP boundary of the occupancy system.
//!
//! ```text
//!  GET  /garages                   ──▶ OccupancyStore::snapshot
//!  POST /garages/:name/:action     ──▶ OccupancyStore::apply ──▶ BroadcastHub
//!  GET  /stats                     ──▶ store + hub counters
//!  ws://<push_addr>                ◀── PushServer (one JSON garage per frame)
//! ```
//!
//! The gateway keeps no state of its own. Everything it returns comes from
//! the store or the hub handed to it at construction.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use gatorpark_core::{Action, Garage, OccupancyStore, StoreError};

use crate::broadcast::BroadcastHub;
use crate::protocol::OUTCOME_HEADER;
use crate::push::PushServer;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the HTTP read/mutation API
    pub http_addr: String,
    /// Address for the WebSocket push channel
    pub push_addr: String,
    /// Events buffered per observer before the oldest are dropped
    pub broadcast_capacity: usize,
    /// JSON seed catalog (None = built-in campus garages)
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:3000".to_string(),
            push_addr: "127.0.0.1:3001".to_string(),
            broadcast_capacity: 256,
            seed_file: None,
        }
    }
}

/// Errors that stop the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handles shared by every request.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<OccupancyStore>,
    pub hub: Arc<BroadcastHub>,
}

impl GatewayState {
    pub fn new(store: Arc<OccupancyStore>, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }
}

/// Counters exposed on `GET /stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub applied: u64,
    pub rejected: u64,
    pub not_found: u64,
    pub published: u64,
    pub dropped: u64,
    pub observers: usize,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/garages", get(list_garages))
        .route("/garages/:name/:action", post(mutate_garage))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn list_garages(State(state): State<GatewayState>) -> Json<Vec<Garage>> {
    Json(state.store.snapshot())
}

async fn mutate_garage(
    State(state): State<GatewayState>,
    Path((name, action)): Path<(String, String)>,
) -> Response {
    let action: Action = match action.parse() {
        Ok(action) => action,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.store.apply(&name, action) {
        Ok(mutation) => (
            [(OUTCOME_HEADER, mutation.tag.as_str())],
            Json(mutation.garage),
        )
            .into_response(),
        Err(StoreError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stats(State(state): State<GatewayState>) -> Json<StatsReport> {
    let store = state.store.stats();
    let hub = state.hub.stats();
    Json(StatsReport {
        applied: store.applied,
        rejected: store.rejected,
        not_found: store.not_found,
        published: hub.messages_sent,
        dropped: hub.messages_dropped,
        observers: hub.active_observers,
    })
}

/// The HTTP API and the push channel, served together.
pub struct SyncServer {
    config: ServerConfig,
    state: GatewayState,
}

impl SyncServer {
    pub fn new(config: ServerConfig, store: Arc<OccupancyStore>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            config,
            state: GatewayState::new(store, hub),
        }
    }

    /// Bind both listeners without serving yet.
    pub async fn bind(self) -> Result<BoundServer, GatewayError> {
        let http = TcpListener::bind(&self.config.http_addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: self.config.http_addr.clone(),
                source,
            })?;
        let push = PushServer::bind(&self.config.push_addr, self.state.hub.clone()).await?;
        Ok(BoundServer {
            http,
            push,
            state: self.state,
        })
    }

    /// Bind and serve until an I/O error stops one of the listeners.
    pub async fn run(self) -> Result<(), GatewayError> {
        self.bind().await?.serve().await
    }
}

/// A server whose sockets are bound; useful when binding to port 0.
pub struct BoundServer {
    http: TcpListener,
    push: PushServer,
    state: GatewayState,
}

impl BoundServer {
    pub fn http_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.http.local_addr()?)
    }

    pub fn push_addr(&self) -> Result<SocketAddr, GatewayError> {
        self.push.local_addr()
    }

    pub async fn serve(self) -> Result<(), GatewayError> {
        let http_addr = self.http_addr()?;
        log::info!("Garage API listening on http://{http_addr}");

        let BoundServer { http, push, state } = self;
        let router = build_router(state);
        let http = async move { axum::serve(http, router).await.map_err(GatewayError::Io) };
        tokio::try_join!(http, push.serve())?;
        Ok(())
    }
}
