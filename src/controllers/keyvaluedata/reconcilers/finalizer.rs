use kube::ResourceExt;

use crate::resources::keyvaluedata::{KeyValueData, KEY_VALUE_DATA_FINALIZER};

/// Where a KeyValueData stands in the finalizer protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Live object without our finalizer; it has to be added and persisted before any remote write
    RegisterFinalizer,
    /// Live object guarded by our finalizer; storage is converged to the spec
    Sync,
    /// Deletion requested while our finalizer still holds the object; storage is cleaned up first
    Cleanup,
    /// Deletion requested and our finalizer is gone; nothing left to do
    Released,
}

impl Phase {
    pub fn of(kvd: &KeyValueData) -> Self {
        match (kvd.is_deletion_requested(), kvd.has_finalizer()) {
            (false, false) => Phase::RegisterFinalizer,
            (false, true) => Phase::Sync,
            (true, true) => Phase::Cleanup,
            (true, false) => Phase::Released,
        }
    }
}

/// Add our finalizer, returning whether the object changed and has to be persisted
pub fn ensure_present(kvd: &mut KeyValueData) -> bool {
    if kvd.has_finalizer() {
        return false;
    }
    kvd.finalizers_mut().push(KEY_VALUE_DATA_FINALIZER.into());
    true
}

/// Remove our finalizer, returning whether the object changed and has to be persisted
pub fn release(kvd: &mut KeyValueData) -> bool {
    let finalizers = kvd.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != KEY_VALUE_DATA_FINALIZER);
    finalizers.len() != before
}
