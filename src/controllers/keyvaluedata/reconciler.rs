use std::collections::BTreeSet;

use chrono::Utc;
use kube::ResourceExt;
use tracing::*;

use super::pairs::{PairOutcome, PairStore};
use super::reconcilers::finalizer::{self, Phase};
use super::reconcilers::status;
use super::reconcilers::sync::SyncPlan;
use super::storage::StorageConnector;
use super::store::KeyValueDataStore;
use crate::resources::keyvaluedata::{KeyValueData, KeyValueDataStatus};
use crate::{Error, Result};

/// What a reconciliation pass ended with
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// The object no longer exists
    Gone,
    /// The finalizer write did not stick; the next pass tries again
    FinalizerPending,
    /// Storage was converged to the spec and this status was written
    Synced(KeyValueDataStatus),
    /// Storage was cleaned up and the finalizer removed
    Released,
    /// Deletion is under way and we hold no finalizer
    Ignored,
}

/// Drives one KeyValueData through the finalizer protocol and keeps its pairs in the storage.
///
/// A pass never runs remote writes before our finalizer is committed to the declarative store.
pub struct Reconciler<S, C> {
    store: S,
    connector: C,
}

impl<S: KeyValueDataStore, C: StorageConnector> Reconciler<S, C> {
    pub fn new(store: S, connector: C) -> Self {
        Self { store, connector }
    }

    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Reconciled> {
        let Some(mut kvd) = self.store.get(namespace, name).await? else {
            debug!("KeyValueData {namespace}/{name} is gone");
            return Ok(Reconciled::Gone);
        };

        if Phase::of(&kvd) == Phase::RegisterFinalizer {
            finalizer::ensure_present(&mut kvd);
            kvd = self.store.update(&kvd).await?;
            debug!("Registered finalizer on KeyValueData {namespace}/{name}");
        }

        match Phase::of(&kvd) {
            Phase::RegisterFinalizer => Ok(Reconciled::FinalizerPending),
            Phase::Sync => Ok(Reconciled::Synced(self.sync(kvd).await?)),
            Phase::Cleanup => self.cleanup(kvd).await,
            Phase::Released => Ok(Reconciled::Ignored),
        }
    }

    async fn sync(&self, mut kvd: KeyValueData) -> Result<KeyValueDataStatus> {
        let pairs = self.connector.connect().await?;

        let plan = SyncPlan::new(&kvd.spec.data, kvd.persisted_keys());
        let outcomes = plan.execute(&pairs).await?;

        // status reflects what the storage holds now, not what our writes claimed
        let mut present = BTreeSet::new();
        for key in kvd.spec.data.keys() {
            if pairs.exists(key).await {
                present.insert(key.as_str());
            }
        }

        let status = status::report(
            kvd.status.as_ref(),
            &kvd.spec.data,
            &outcomes,
            |key| present.contains(key),
            Utc::now(),
        )?;

        info!(
            "Synced {} of {} keys for KeyValueData {}",
            status.keys_in_storage.len(),
            kvd.spec.data.len(),
            kvd.name_any()
        );
        kvd.status = Some(status.clone());
        self.store.update_status(&kvd).await?;
        Ok(status)
    }

    async fn cleanup(&self, mut kvd: KeyValueData) -> Result<Reconciled> {
        let keys = kvd.persisted_keys().to_vec();
        if !keys.is_empty() {
            let pairs = self.connector.connect().await?;
            for key in &keys {
                delete_stored_key(&pairs, key).await?;
            }
        }

        if finalizer::release(&mut kvd) {
            self.store.update(&kvd).await?;
        }
        info!(
            "Removed {} keys and released KeyValueData {}",
            keys.len(),
            kvd.name_any()
        );
        Ok(Reconciled::Released)
    }
}

/// Delete a key on teardown.
///
/// Only a 404 means the key is already gone; any other refusal keeps the object and its finalizer.
async fn delete_stored_key<P: PairStore + ?Sized>(pairs: &P, key: &str) -> Result<()> {
    match pairs.delete(key).await? {
        PairOutcome::Accepted => Ok(()),
        PairOutcome::Rejected { status: 404, .. } => {
            debug!(key, "Key was already absent from storage");
            Ok(())
        }
        PairOutcome::Rejected { status, body } => Err(Error::CleanupFailed {
            key: key.into(),
            message: format!("storage answered {status}: {body}"),
        }),
    }
}
