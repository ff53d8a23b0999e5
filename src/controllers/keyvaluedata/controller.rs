use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;

use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType, Recorder};
use kube::runtime::{reflector, watcher, WatchStreamExt};

use kube::{Resource, ResourceExt};
use tokio::sync::RwLock;
use tracing::*;

use super::reconciler::{Reconciled, Reconciler};
use super::storage::ServiceConnector;
use super::store::KubeStore;
use crate::controllers::{Diagnostics, State};
use crate::metrics::Metrics;
use crate::resources::keyvaluedata::KeyValueData;
use crate::telemetry;
use crate::{Error, Result};

pub(super) struct Context {
    /// Kubernetes event recorder
    pub recorder: Recorder,
    /// Converges KeyValueData objects with the key-value storage
    pub reconciler: Reconciler<KubeStore, ServiceConnector>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
    /// Requeue delay after a clean pass
    pub resync_interval: Duration,
}

impl Context {
    pub fn new(
        client: Client,
        http_client: reqwest::Client,
        metrics: Metrics,
        state: State,
    ) -> Arc<Context> {
        let connector = ServiceConnector::new(
            client.clone(),
            http_client,
            state.storage.clone(),
            metrics.clone(),
        );
        Arc::new(Context {
            recorder: Recorder::new(client.clone(), "keyvalue-operator".into()),
            reconciler: Reconciler::new(KubeStore::new(client), connector),
            diagnostics: state.diagnostics.clone(),
            metrics,
            resync_interval: state.resync_interval,
        })
    }

    /// Publish an event for `kvd`; a failure to publish is only logged
    async fn publish(&self, kvd: &KeyValueData, event: Event) {
        if let Err(e) = self.recorder.publish(&event, &kvd.object_ref(&())).await {
            warn!("Failed to publish {} event for {}: {e}", event.reason, kvd.name_any());
        }
    }

    async fn reconcile_failed(&self, kvd: &KeyValueData, err: &Error) {
        warn!("reconcile failed: {:?}", err);
        self.metrics.reconcile_failure(kvd, err);
        self.publish(
            kvd,
            Event {
                type_: EventType::Warning,
                reason: "FailedReconcile".into(),
                note: Some(err.to_string()),
                action: "Reconcile".into(),
                secondary: None,
            },
        )
        .await;
    }
}

#[instrument(skip(ctx, kvd), fields(trace_id))]
async fn reconcile(kvd: Arc<KeyValueData>, ctx: Arc<Context>) -> Result<Action> {
    if let Some(trace_id) = telemetry::get_trace_id() {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _timer = ctx.metrics.count_and_measure::<KeyValueData>();
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = kvd.name_any();
    // KeyValueData is namespaced, the watch always fills this in
    let namespace = kvd.namespace().unwrap_or_else(|| "default".into());

    info!("Reconciling KeyValueData {namespace}/{name}");
    match ctx.reconciler.reconcile(&namespace, &name).await {
        Ok(Reconciled::Synced(_)) => Ok(Action::requeue(ctx.resync_interval)),
        Ok(Reconciled::FinalizerPending) => Ok(Action::requeue(Duration::from_secs(5))),
        Ok(Reconciled::Released) => {
            ctx.publish(
                &kvd,
                Event {
                    type_: EventType::Normal,
                    reason: "DeleteRequested".into(),
                    note: Some(format!("Removed stored keys of `{name}`")),
                    action: "Deleting".into(),
                    secondary: None,
                },
            )
            .await;
            Ok(Action::await_change())
        }
        Ok(Reconciled::Gone | Reconciled::Ignored) => Ok(Action::await_change()),
        Err(err) => {
            ctx.reconcile_failed(&kvd, &err).await;
            Err(err)
        }
    }
}

fn error_policy<K, C>(_kvd: Arc<K>, _: &Error, _ctx: C) -> Action {
    Action::requeue(Duration::from_secs(30))
}

/// Changes worth a pass: spec edits bump the generation, and a deletion request starts teardown.
/// Status and finalizer writes change neither.
fn change_predicate(kvd: &KeyValueData) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    kvd.metadata.generation.hash(&mut hasher);
    kvd.is_deletion_requested().hash(&mut hasher);
    Some(hasher.finish())
}

/// Run the KeyValueData controller
pub async fn run(state: State) {
    let client = state.client.clone();
    let kvd_api: Api<KeyValueData> = Api::all(client.clone());

    if let Err(e) = kvd_api.list(&ListParams::default().limit(1)).await {
        error!("KeyValueData is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    let metrics = match Metrics::default().register(&state.registry) {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("Failed to register metrics; {e:?}");
            std::process::exit(1);
        }
    };

    let http_client = match reqwest::Client::builder()
        .timeout(state.storage.request_timeout)
        .build()
    {
        Ok(http_client) => http_client,
        Err(e) => {
            error!("Failed to build the storage HTTP client; {e:?}");
            std::process::exit(1);
        }
    };

    let (reader, writer) = reflector::store();
    let kvds = reflector(writer, watcher(kvd_api, watcher::Config::default()))
        .touched_objects()
        .default_backoff()
        .predicate_filter(change_predicate);

    Controller::for_stream(kvds, reader)
        .shutdown_on_signal()
        .run(
            reconcile,
            error_policy,
            Context::new(client, http_client, metrics, state),
        )
        .filter_map(|x| async move { Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
