use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("The storage Service {namespace}/{name} does not exist")]
    StorageServiceNotFound { name: String, namespace: String },

    #[error("The storage Service {namespace}/{name} has no cluster IP")]
    StorageServiceWithoutClusterIp { name: String, namespace: String },

    #[error("Failed to reach the key-value storage while handling key {key:?}: {message}")]
    StorageUnreachable { key: String, message: String },

    #[error("Failed to remove key {key:?} from the key-value storage: {message}")]
    CleanupFailed { key: String, message: String },

    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::SerializationError(_) => "SerializationError",
            Error::KubeError(_) => "KubeError",
            Error::StorageServiceNotFound { .. } => "StorageServiceNotFound",
            Error::StorageServiceWithoutClusterIp { .. } => "StorageServiceWithoutClusterIp",
            Error::StorageUnreachable { .. } => "StorageUnreachable",
            Error::CleanupFailed { .. } => "CleanupFailed",
            Error::InvalidUrl(_) => "InvalidUrl",
        }
    }
}

pub mod controllers;

pub use controllers::{Diagnostics, State};

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;

pub use metrics::Metrics;

/// Custom resources served by this operator
pub mod resources;

/// Initialize the controller (given the crd is installed)
pub async fn run(state: State) {
    controllers::keyvaluedata::run(state).await
}
