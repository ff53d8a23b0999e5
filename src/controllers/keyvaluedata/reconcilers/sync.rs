use std::collections::BTreeMap;

use tracing::*;

use crate::controllers::keyvaluedata::pairs::{PairOutcome, PairStore};
use crate::Result;

/// The result of one storage write for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOutcome {
    pub key: String,
    pub outcome: PairOutcome,
}

/// Storage writes needed to move from the previously stored keys to the desired data.
///
/// Every desired pair is put on every pass, whether or not it changed.
#[derive(Debug, PartialEq, Eq)]
pub struct SyncPlan<'a> {
    /// Previously stored keys that are no longer desired
    pub deletions: Vec<&'a str>,
    pub puts: Vec<(&'a str, &'a str)>,
}

impl<'a> SyncPlan<'a> {
    pub fn new(desired: &'a BTreeMap<String, String>, persisted_keys: &'a [String]) -> Self {
        let mut deletions: Vec<&str> = persisted_keys
            .iter()
            .map(String::as_str)
            .filter(|key| !desired.contains_key(*key))
            .collect();
        deletions.sort_unstable();
        deletions.dedup();

        Self {
            deletions,
            puts: desired
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        }
    }

    /// Issue the deletions, then the puts, one request at a time.
    ///
    /// Stops at the first request that cannot reach the storage.
    pub async fn execute<P: PairStore + ?Sized>(&self, pairs: &P) -> Result<Vec<KeyOutcome>> {
        let mut outcomes = Vec::with_capacity(self.deletions.len() + self.puts.len());

        for key in &self.deletions {
            let outcome = pairs.delete(key).await?;
            trace!(key, ?outcome, "Deleted key no longer in spec");
            outcomes.push(KeyOutcome {
                key: key.to_string(),
                outcome,
            });
        }

        for (key, value) in &self.puts {
            let outcome = pairs.put(key, value).await?;
            trace!(key, ?outcome, "Put key");
            outcomes.push(KeyOutcome {
                key: key.to_string(),
                outcome,
            });
        }

        Ok(outcomes)
    }
}
