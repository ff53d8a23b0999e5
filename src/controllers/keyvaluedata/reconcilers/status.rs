use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::sync::KeyOutcome;
use crate::controllers::keyvaluedata::pairs::PairOutcome;
use crate::resources::keyvaluedata::{KeyValueDataCondition, KeyValueDataStatus};
use crate::Result;

pub const BAD_SERVER_RESPONSE: &str = "BadServerResponse";

/// One key the storage refused, as reported in the condition message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerError<'a> {
    pub key: &'a str,
    pub message: &'a str,
}

/// Build the status observed at the end of a sync pass.
///
/// `keysInStorage` lists the desired keys that `is_present` confirms right now, regardless of how this pass's
/// writes went. The `Added` condition is false if any write was rejected, with every rejection listed in its message.
pub fn report(
    previous: Option<&KeyValueDataStatus>,
    desired: &BTreeMap<String, String>,
    outcomes: &[KeyOutcome],
    is_present: impl Fn(&str) -> bool,
    now: DateTime<Utc>,
) -> Result<KeyValueDataStatus> {
    let errors: Vec<ServerError> = outcomes
        .iter()
        .filter_map(|o| match &o.outcome {
            PairOutcome::Accepted => None,
            PairOutcome::Rejected { body, .. } => Some(ServerError {
                key: &o.key,
                message: body,
            }),
        })
        .collect();

    let condition = if errors.is_empty() {
        KeyValueDataCondition::added(now)
    } else {
        KeyValueDataCondition::not_added(now, BAD_SERVER_RESPONSE, serde_json::to_string(&errors)?)
    };

    let mut status = previous.cloned().unwrap_or_default();
    status.conditions.upsert(condition);
    status.keys_in_storage = desired
        .keys()
        .filter(|key| is_present(key))
        .cloned()
        .collect();
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::keyvaluedata::{ConditionStatus, ADDED_CONDITION};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn desired() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("1key1".to_string(), "1value1".to_string()),
            ("2key2".to_string(), "2value2".to_string()),
        ])
    }

    fn rejected(key: &str, body: &str) -> KeyOutcome {
        KeyOutcome {
            key: key.into(),
            outcome: PairOutcome::Rejected {
                status: 400,
                body: body.into(),
            },
        }
    }

    fn accepted(key: &str) -> KeyOutcome {
        KeyOutcome {
            key: key.into(),
            outcome: PairOutcome::Accepted,
        }
    }

    #[test]
    fn all_accepted_marks_added() {
        let now = Utc::now();
        let status = report(
            None,
            &desired(),
            &[accepted("1key1"), accepted("2key2")],
            |_| true,
            now,
        )
        .unwrap();

        assert_eq!(status.keys_in_storage, vec!["1key1", "2key2"]);
        let added = status.conditions.get(ADDED_CONDITION).unwrap();
        assert_eq!(added.status, ConditionStatus::True);
        assert_eq!(added.reason, None);
        assert_eq!(added.message, None);
        assert_eq!(added.last_update_time, Some(Time(now)));
    }

    #[test]
    fn every_rejection_is_listed() {
        let status = report(
            None,
            &desired(),
            &[
                rejected("1key1", "Validation error from server!"),
                rejected("2key2", "Validation error from server!"),
            ],
            |_| false,
            Utc::now(),
        )
        .unwrap();

        assert!(status.keys_in_storage.is_empty());
        let added = status.conditions.get(ADDED_CONDITION).unwrap();
        assert_eq!(added.status, ConditionStatus::False);
        assert_eq!(added.reason.as_deref(), Some(BAD_SERVER_RESPONSE));
        assert_eq!(
            added.message.as_deref(),
            Some(
                r#"[{"key":"1key1","message":"Validation error from server!"},{"key":"2key2","message":"Validation error from server!"}]"#
            )
        );
    }

    #[test]
    fn stored_keys_come_from_the_probe_not_the_outcomes() {
        // the put of 1key1 was refused but the key is there from an earlier pass
        let status = report(
            None,
            &desired(),
            &[rejected("1key1", "busy"), accepted("2key2")],
            |key| key == "1key1",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(status.keys_in_storage, vec!["1key1"]);
    }

    #[test]
    fn undesired_keys_are_never_reported() {
        let status = report(
            Some(&KeyValueDataStatus {
                keys_in_storage: vec!["3key3".into()],
                ..Default::default()
            }),
            &desired(),
            &[accepted("3key3")],
            |_| true,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(status.keys_in_storage, vec!["1key1", "2key2"]);
    }

    #[test]
    fn added_condition_is_replaced_not_appended() {
        let first = report(None, &desired(), &[rejected("1key1", "no")], |_| false, Utc::now())
            .unwrap();
        let second = report(Some(&first), &desired(), &[], |_| true, Utc::now()).unwrap();

        assert_eq!(second.conditions.len(), 1);
        assert_eq!(
            second.conditions.get(ADDED_CONDITION).unwrap().status,
            ConditionStatus::True
        );
    }
}
