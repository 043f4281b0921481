use std::path::PathBuf;

/// Errors raised while building the garage catalog.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate garage name: {0}")]
    DuplicateName(String),

    #[error("Garage name must not be empty")]
    EmptyName,

    #[error("Garage '{name}' starts with {count} cars but only holds {capacity}")]
    OverCapacity {
        name: String,
        count: u32,
        capacity: u32,
    },

    #[error("Garage '{name}' has an invalid location ({latitude}, {longitude})")]
    InvalidLocation {
        name: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed seed catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of store operations.
///
/// Invariant-boundary no-ops are not errors; see
/// [`MutationTag`](crate::model::MutationTag).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Garage not found: {0}")]
    NotFound(String),
}
