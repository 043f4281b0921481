//! # gatorpark-sync — live occupancy synchronization
//!
//! Serves the occupancy store over HTTP, pushes every applied change to
//! connected observers, and keeps a client-side mirror consistent with both.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   GET/POST (JSON)   ┌──────────────┐
//! │ GarageClient │ ──────────────────▶ │ build_router │ ──▶ OccupancyStore
//! │              │                     └──────────────┘          │ publish
//! │  updates()   │   WebSocket (JSON)  ┌──────────────┐   ┌──────┴───────┐
//! │  stream      │ ◀────────────────── │ PushServer   │ ◀─│ BroadcastHub │
//! └──────┬───────┘                     └──────────────┘   └──────────────┘
//!        ▼
//! ┌──────────────┐
//! │ MirrorSession│ ── owns ──▶ ClientMirror (optimistic edits + reconciliation)
//! └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — strict JSON wire format and the outcome header
//! - [`broadcast`] — observer fan-out with bounded, drop-oldest buffers
//! - [`gateway`] — HTTP routes, server configuration and startup
//! - [`push`] — WebSocket push channel
//! - [`client`] — HTTP calls and the restartable update stream
//! - [`mirror`] — client-side reconciliation rules
//! - [`session`] — single-sequencer driver for the mirror

pub mod broadcast;
pub mod client;
pub mod gateway;
pub mod mirror;
pub mod protocol;
pub mod push;
pub mod session;

// Re-exports for convenience
pub use broadcast::{BroadcastHub, BroadcastStats, Observer, ObserverInfo, OccupancyEvent};
pub use client::{ClientConfig, ClientError, GarageClient, PushEvent};
pub use gateway::{build_router, BoundServer, GatewayError, GatewayState, ServerConfig, StatsReport, SyncServer};
pub use mirror::{ClientMirror, LocalEdit, MirrorEntry, Reconciliation, RollbackReason};
pub use protocol::{ProtocolError, OUTCOME_HEADER};
pub use push::PushServer;
pub use session::{MirrorSession, SessionClosed, SessionHandle, UserNotice};
