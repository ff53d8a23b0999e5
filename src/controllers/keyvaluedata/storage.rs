use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::client::Client;
use tracing::*;

use super::pairs::{HttpPairStore, PairStore};
use crate::metrics::Metrics;
use crate::{Error, Result};

/// Location of the key-value storage inside the cluster
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Name of the Service fronting the storage
    pub service_name: String,
    /// Namespace of the Service fronting the storage
    pub service_namespace: String,
    /// Port the storage listens on
    pub port: u16,
    /// Per-request timeout for calls to the storage
    pub request_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            service_name: "storage".into(),
            service_namespace: "default".into(),
            port: 8181,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Resolves the storage address and hands out a client for it
#[async_trait]
pub trait StorageConnector: Send + Sync {
    type Pairs: PairStore;

    async fn connect(&self) -> Result<Self::Pairs>;
}

/// Finds the storage through the cluster IP of its Service
pub struct ServiceConnector {
    client: Client,
    http_client: reqwest::Client,
    config: StorageConfig,
    metrics: Metrics,
}

impl ServiceConnector {
    pub fn new(
        client: Client,
        http_client: reqwest::Client,
        config: StorageConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            http_client,
            config,
            metrics,
        }
    }
}

/// `host:port` of a Service, if it has a routable cluster IP
pub fn service_address(service: &Service, port: u16) -> Option<String> {
    let cluster_ip = service.spec.as_ref()?.cluster_ip.as_deref()?;
    // headless services report the literal "None"
    if cluster_ip.is_empty() || cluster_ip == "None" {
        return None;
    }
    match cluster_ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => Some(format!("[{ip}]:{port}")),
        _ => Some(format!("{cluster_ip}:{port}")),
    }
}

#[async_trait]
impl StorageConnector for ServiceConnector {
    type Pairs = HttpPairStore;

    async fn connect(&self) -> Result<HttpPairStore> {
        let StorageConfig {
            service_name,
            service_namespace,
            port,
            ..
        } = &self.config;

        let svc_api: Api<Service> = Api::namespaced(self.client.clone(), service_namespace);
        let service = svc_api
            .get_opt(service_name)
            .await?
            .ok_or_else(|| Error::StorageServiceNotFound {
                name: service_name.clone(),
                namespace: service_namespace.clone(),
            })?;

        let address = service_address(&service, *port).ok_or_else(|| {
            Error::StorageServiceWithoutClusterIp {
                name: service_name.clone(),
                namespace: service_namespace.clone(),
            }
        })?;
        trace!("Resolved key-value storage at {address}");

        Ok(HttpPairStore::new(self.http_client.clone(), &address)?.with_metrics(self.metrics.clone()))
    }
}
