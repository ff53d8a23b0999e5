use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use kube::ResourceExt;
use thiserror::Error;
use tracing::*;

use super::pairs::is_addressable;
use super::store::KeyValueDataStore;
use crate::resources::keyvaluedata::KeyValueData;

/// A desired key that another KeyValueData in the namespace already declares
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("KeyValueData resource containing {key:?} already exists [{owner:?}]")]
pub struct KeyConflict {
    pub key: String,
    pub owner: String,
}

/// A desired key the storage has no per-key endpoint for
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("KeyValueData key {key:?} cannot be stored: keys must not be empty, \".\" or \"..\"")]
pub struct UnaddressableKey {
    pub key: String,
}

pub fn validate_keys(candidate: &KeyValueData) -> Result<(), UnaddressableKey> {
    match candidate.spec.data.keys().find(|key| !is_addressable(key)) {
        Some(key) => Err(UnaddressableKey { key: key.clone() }),
        None => Ok(()),
    }
}

/// Check that no key of `candidate` is declared by any of `others`.
///
/// `others` may include `candidate` itself, which is skipped by name. Reports the first conflict found,
/// scanning the candidate's keys in order and, for each key, the other resources in list order.
pub fn validate_uniqueness(
    candidate: &KeyValueData,
    others: &[KeyValueData],
) -> Result<(), KeyConflict> {
    let name = candidate.name_any();
    for key in candidate.spec.data.keys() {
        if let Some(owner) = others
            .iter()
            .filter(|other| other.name_any() != name)
            .find(|other| other.spec.data.contains_key(key))
        {
            return Err(KeyConflict {
                key: key.clone(),
                owner: owner.name_any(),
            });
        }
    }
    Ok(())
}

/// Decide on a KeyValueData admission request.
///
/// Creates and updates must use addressable keys that no other KeyValueData in the same namespace claims;
/// deletes are always allowed.
pub async fn admit<S: KeyValueDataStore + ?Sized>(
    store: &S,
    request: &AdmissionRequest<KeyValueData>,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);

    let candidate = match (&request.operation, &request.object) {
        (Operation::Create | Operation::Update, Some(candidate)) => candidate,
        (Operation::Create | Operation::Update, None) => {
            warn!("Admission request {} carries no object", request.name);
            return response.deny("request carries no KeyValueData object");
        }
        _ => return response,
    };
    info!(
        "Validating {:?} of KeyValueData {}",
        request.operation,
        candidate.name_any()
    );

    if let Err(invalid) = validate_keys(candidate) {
        debug!("Rejecting KeyValueData {}: {invalid}", candidate.name_any());
        return response.deny(invalid);
    }

    let namespace = request
        .namespace
        .clone()
        .or_else(|| candidate.namespace())
        .unwrap_or_else(|| "default".into());

    let others = match store.list(&namespace).await {
        Ok(others) => others,
        Err(err) => {
            error!("Listing KeyValueData in namespace {namespace} failed: {err}");
            return response.deny("error getting KeyValueData objects");
        }
    };

    match validate_uniqueness(candidate, &others) {
        Ok(()) => response,
        Err(conflict) => {
            debug!("Rejecting KeyValueData {}: {conflict}", candidate.name_any());
            response.deny(conflict)
        }
    }
}
