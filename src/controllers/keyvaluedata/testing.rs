//! In-memory stand-ins for the API server and the key-value storage

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::core::ErrorResponse;
use kube::ResourceExt;

use super::pairs::{PairOutcome, PairStore};
use super::storage::StorageConnector;
use super::store::KeyValueDataStore;
use crate::resources::keyvaluedata::{KeyValueData, KeyValueDataSpec, KeyValueDataStatus};
use crate::{Error, Result};

pub const NAMESPACE: &str = "default";

pub fn key_value_data(name: &str, pairs: &[(&str, &str)]) -> KeyValueData {
    let mut kvd = KeyValueData::new(
        name,
        KeyValueDataSpec {
            data: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
    );
    kvd.metadata.namespace = Some(NAMESPACE.into());
    kvd
}

fn not_found(name: &str) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("keyvaluedata.teamdev.com \"{name}\" not found"),
        reason: "NotFound".into(),
        code: 404,
    }))
}

#[derive(Default)]
struct Objects {
    items: BTreeMap<(String, String), KeyValueData>,
    updates: usize,
    status_writes: Vec<KeyValueDataStatus>,
    fail_list: bool,
}

/// Behaves like the API server for the calls the operator makes, including removing
/// an object once deletion was requested and its last finalizer is gone
#[derive(Clone, Default)]
pub struct FakeStore {
    objects: Arc<Mutex<Objects>>,
}

impl FakeStore {
    pub fn with(objects: impl IntoIterator<Item = KeyValueData>) -> Self {
        let store = Self::default();
        for kvd in objects {
            store.insert(kvd);
        }
        store
    }

    pub fn insert(&self, kvd: KeyValueData) {
        let key = (kvd.namespace().unwrap_or_default(), kvd.name_any());
        self.objects.lock().unwrap().items.insert(key, kvd);
    }

    pub fn object(&self, name: &str) -> Option<KeyValueData> {
        self.objects
            .lock()
            .unwrap()
            .items
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn updates(&self) -> usize {
        self.objects.lock().unwrap().updates
    }

    pub fn status_writes(&self) -> Vec<KeyValueDataStatus> {
        self.objects.lock().unwrap().status_writes.clone()
    }

    pub fn fail_list(&self) {
        self.objects.lock().unwrap().fail_list = true;
    }
}

#[async_trait]
impl KeyValueDataStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<KeyValueData>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .items
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn update(&self, kvd: &KeyValueData) -> Result<KeyValueData> {
        let mut objects = self.objects.lock().unwrap();
        let key = (kvd.namespace().unwrap_or_default(), kvd.name_any());
        let Some(stored) = objects.items.get(&key).cloned() else {
            return Err(not_found(&key.1));
        };
        objects.updates += 1;

        // the main resource endpoint ignores status
        let mut updated = kvd.clone();
        updated.status = stored.status;
        if updated.is_deletion_requested() && updated.finalizers().is_empty() {
            objects.items.remove(&key);
        } else {
            objects.items.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, kvd: &KeyValueData) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let key = (kvd.namespace().unwrap_or_default(), kvd.name_any());
        let status = kvd.status.clone().unwrap_or_default();
        let Some(stored) = objects.items.get_mut(&key) else {
            return Err(not_found(&key.1));
        };
        stored.status = Some(status.clone());
        objects.status_writes.push(status);
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<KeyValueData>> {
        let objects = self.objects.lock().unwrap();
        if objects.fail_list {
            return Err(Error::KubeError(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "the server is currently unable to handle the request".into(),
                reason: "ServiceUnavailable".into(),
                code: 503,
            })));
        }
        Ok(objects
            .items
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, kvd)| kvd.clone())
            .collect())
    }
}

/// A request received by [`FakePairs`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put(String),
    Delete(String),
    Exists(String),
}

#[derive(Default)]
struct Remote {
    pairs: BTreeMap<String, String>,
    calls: Vec<Call>,
    rejected_puts: BTreeMap<String, (u16, String)>,
    rejected_deletes: BTreeMap<String, (u16, String)>,
    unreachable: bool,
}

/// Behaves like the pairs API: 404 when deleting an unknown key, rejections and outages on demand
#[derive(Clone, Default)]
pub struct FakePairs {
    remote: Arc<Mutex<Remote>>,
}

impl FakePairs {
    pub fn with_pairs(pairs: &[(&str, &str)]) -> Self {
        let fake = Self::default();
        fake.remote.lock().unwrap().pairs = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        fake
    }

    pub fn reject_put(&self, key: &str, status: u16, body: &str) {
        self.remote
            .lock()
            .unwrap()
            .rejected_puts
            .insert(key.into(), (status, body.into()));
    }

    pub fn reject_delete(&self, key: &str, status: u16, body: &str) {
        self.remote
            .lock()
            .unwrap()
            .rejected_deletes
            .insert(key.into(), (status, body.into()));
    }

    pub fn accept_all(&self) {
        let mut remote = self.remote.lock().unwrap();
        remote.rejected_puts.clear();
        remote.rejected_deletes.clear();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.remote.lock().unwrap().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.remote.lock().unwrap().calls.clone()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.remote.lock().unwrap().pairs.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.remote.lock().unwrap().pairs.keys().cloned().collect()
    }
}

fn connection_refused(key: &str) -> Error {
    Error::StorageUnreachable {
        key: key.into(),
        message: "error sending request: connection refused".into(),
    }
}

#[async_trait]
impl PairStore for FakePairs {
    async fn put(&self, key: &str, value: &str) -> Result<PairOutcome> {
        let mut remote = self.remote.lock().unwrap();
        remote.calls.push(Call::Put(key.into()));
        if remote.unreachable {
            return Err(connection_refused(key));
        }
        if let Some((status, body)) = remote.rejected_puts.get(key).cloned() {
            return Ok(PairOutcome::Rejected { status, body });
        }
        remote.pairs.insert(key.into(), value.into());
        Ok(PairOutcome::Accepted)
    }

    async fn delete(&self, key: &str) -> Result<PairOutcome> {
        let mut remote = self.remote.lock().unwrap();
        remote.calls.push(Call::Delete(key.into()));
        if remote.unreachable {
            return Err(connection_refused(key));
        }
        if let Some((status, body)) = remote.rejected_deletes.get(key).cloned() {
            return Ok(PairOutcome::Rejected { status, body });
        }
        match remote.pairs.remove(key) {
            Some(_) => Ok(PairOutcome::Accepted),
            None => Ok(PairOutcome::Rejected {
                status: 404,
                body: "Not Found".into(),
            }),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let mut remote = self.remote.lock().unwrap();
        remote.calls.push(Call::Exists(key.into()));
        !remote.unreachable && remote.pairs.contains_key(key)
    }
}

/// Hands out a shared [`FakePairs`], or fails like a missing storage Service
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub pairs: FakePairs,
    pub missing_service: bool,
}

#[async_trait]
impl StorageConnector for FakeConnector {
    type Pairs = FakePairs;

    async fn connect(&self) -> Result<FakePairs> {
        if self.missing_service {
            return Err(Error::StorageServiceNotFound {
                name: "storage".into(),
                namespace: "default".into(),
            });
        }
        Ok(self.pairs.clone())
    }
}
