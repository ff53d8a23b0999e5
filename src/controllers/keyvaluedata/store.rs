use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tracing::*;

use crate::resources::keyvaluedata::KeyValueData;
use crate::Result;

/// The declarative store holding KeyValueData objects.
///
/// Watching is left to the controller runtime; reconciliation and admission only need these reads and writes.
#[async_trait]
pub trait KeyValueDataStore: Send + Sync {
    /// Fetch the latest version of an object, or `None` if it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<KeyValueData>>;

    /// Persist metadata and spec changes, returning the object as stored
    async fn update(&self, kvd: &KeyValueData) -> Result<KeyValueData>;

    /// Persist the status sub-resource
    async fn update_status(&self, kvd: &KeyValueData) -> Result<()>;

    async fn list(&self, namespace: &str) -> Result<Vec<KeyValueData>>;
}

/// [`KeyValueDataStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<KeyValueData> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of(kvd: &KeyValueData) -> String {
    kvd.namespace().unwrap_or_else(|| "default".into())
}

#[async_trait]
impl KeyValueDataStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<KeyValueData>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn update(&self, kvd: &KeyValueData) -> Result<KeyValueData> {
        // conflicts if the object changed since it was read
        Ok(self
            .api(&namespace_of(kvd))
            .replace(&kvd.name_any(), &PostParams::default(), kvd)
            .await?)
    }

    async fn update_status(&self, kvd: &KeyValueData) -> Result<()> {
        let name = kvd.name_any();
        let namespace = namespace_of(kvd);

        let new_status = json!({
            "apiVersion": KeyValueData::api_version(&()),
            "kind": KeyValueData::kind(&()),
            "status": kvd.status,
        });

        debug!("Updating status of KeyValueData {name} in namespace {namespace}");

        let ps = PatchParams::apply("keyvalue-operator").force();
        let _o = self
            .api(&namespace)
            .patch_status(&name, &ps, &Patch::Apply(new_status))
            .await?;
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<KeyValueData>> {
        Ok(self
            .api(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }
}
