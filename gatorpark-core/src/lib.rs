//! # gatorpark-core — garage catalog and authoritative occupancy
//!
//! ```text
//! ┌────────────────┐   seeds   ┌────────────────┐  applied  ┌──────────────┐
//! │ GarageRegistry │ ────────▶ │ OccupancyStore │ ────────▶ │ OccupancySink│
//! │ (immutable)    │           │ (per-garage    │  events   │ (hub, tests) │
//! └────────────────┘           │  mutex)        │           └──────────────┘
//!                              └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`] — `Garage` value type, derived status, actions and outcome tags
//! - [`registry`] — validated seed catalog
//! - [`store`] — serialized check-in/check-out with invariant enforcement
//! - [`error`] — registry and store errors

pub mod error;
pub mod model;
pub mod registry;
pub mod store;

pub use error::{RegistryError, StoreError};
pub use model::{Action, Garage, Mutation, MutationTag, OccupancyStatus, UnknownAction};
pub use registry::{GarageRegistry, GarageSeed, DEFAULT_CAPACITY};
pub use store::{Detached, OccupancySink, OccupancyStore, StoreStats};
