use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static KEY_VALUE_DATA_FINALIZER: &str = "teamdev.com.keyvaluedata/finalizer";

/// The only condition type maintained by the operator
pub const ADDED_CONDITION: &str = "Added";

/// KeyValueData declares a set of key-value pairs that the operator keeps in the shared key-value storage.
/// Keys must not be claimed by any other KeyValueData in the same namespace.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[kube(
    kind = "KeyValueData",
    group = "teamdev.com",
    version = "v1",
    plural = "keyvaluedata",
    namespaced,
    printcolumn = r#"{"name":"Added", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Added\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    printcolumn = r#"{"name":"Keys", "type":"string", "jsonPath":".status.keysInStorage", "priority": 1}"#
)]
#[kube(status = "KeyValueDataStatus", shortname = "kvd")]
#[serde(rename_all = "camelCase")]
pub struct KeyValueDataSpec {
    /// The pairs to keep in the key-value storage
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Status of the KeyValueData
/// This is set and managed automatically by the controller
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueDataStatus {
    /// Keys of this resource that were present in the storage at the end of the last reconciliation
    #[serde(default)]
    pub keys_in_storage: Vec<String>,

    /// Represents the latest available observations of current state
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

/// Status of a condition, one of True, False, Unknown
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Conditions for the KeyValueData status
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueDataCondition {
    /// Type of condition
    pub r#type: String,

    /// Status is the status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// The last time this condition was updated
    pub last_update_time: Option<Time>,

    /// Reason for the condition's last transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about last transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl KeyValueDataCondition {
    pub fn added(now: DateTime<Utc>) -> Self {
        Self {
            r#type: ADDED_CONDITION.into(),
            status: ConditionStatus::True,
            last_update_time: Some(Time(now)),
            reason: None,
            message: None,
        }
    }

    pub fn not_added(now: DateTime<Utc>, reason: &str, message: String) -> Self {
        Self {
            r#type: ADDED_CONDITION.into(),
            status: ConditionStatus::False,
            last_update_time: Some(Time(now)),
            reason: Some(reason.into()),
            message: Some(message),
        }
    }
}

/// Conditions keyed by their type.
///
/// Serialized as the ordered list Kubernetes expects. There is at most one entry per type:
/// [`Conditions::upsert`] replaces an entry in place and only appends unseen types.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct Conditions(Vec<KeyValueDataCondition>);

impl Conditions {
    pub fn get(&self, r#type: &str) -> Option<&KeyValueDataCondition> {
        self.0.iter().find(|c| c.r#type == r#type)
    }

    pub fn upsert(&mut self, condition: KeyValueDataCondition) {
        match self.0.iter_mut().find(|c| c.r#type == condition.r#type) {
            Some(existing) => *existing = condition,
            None => self.0.push(condition),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValueDataCondition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<KeyValueDataCondition> for Conditions {
    fn from_iter<I: IntoIterator<Item = KeyValueDataCondition>>(iter: I) -> Self {
        let mut conditions = Conditions::default();
        for condition in iter {
            conditions.upsert(condition);
        }
        conditions
    }
}

impl KeyValueData {
    pub fn has_finalizer(&self) -> bool {
        self.finalizers()
            .iter()
            .any(|f| f == KEY_VALUE_DATA_FINALIZER)
    }

    /// The API server has scheduled removal; only finalizers keep the object alive
    pub fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Keys recorded in storage by the last reconciliation
    pub fn persisted_keys(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|s| s.keys_in_storage.as_slice())
            .unwrap_or_default()
    }

    pub fn added_condition(&self) -> Option<&KeyValueDataCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.get(ADDED_CONDITION))
    }
}
