use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::client::Client;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::resources::keyvaluedata::KeyValueData;

pub mod keyvaluedata;

pub use keyvaluedata::storage::StorageConfig;

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the reconciler
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    pub registry: prometheus::Registry,
    /// Kubernetes client, shared by the controller and the admission webhook
    client: Client,
    /// Where the key-value storage lives and how to talk to it
    storage: StorageConfig,
    /// How long to wait before re-checking a KeyValueData that reconciled cleanly
    resync_interval: Duration,
}

/// State wrapper around the controller outputs for the web server
impl State {
    pub fn new(client: Client, storage: StorageConfig, resync_interval: Duration) -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            registry: prometheus::Registry::default(),
            client,
            storage,
            resync_interval,
        }
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    /// Decide on an admission request for a KeyValueData
    pub async fn admit(&self, request: &AdmissionRequest<KeyValueData>) -> AdmissionResponse {
        let store = keyvaluedata::store::KubeStore::new(self.client.clone());
        keyvaluedata::validation::admit(&store, request).await
    }
}
