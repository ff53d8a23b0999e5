use std::time::Duration;

use actix_web::{
    get, middleware, post, web, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use prometheus::{Encoder, TextEncoder};
use tracing::*;

pub use keyvalue_operator::{self, resources::keyvaluedata::KeyValueData, telemetry, State};
use keyvalue_operator::controllers::StorageConfig;

#[derive(Debug, clap::Parser)]
struct Arguments {
    #[arg(long = "bind-address", env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind_address: String,

    #[arg(
        long = "storage-service-name",
        env = "STORAGE_SERVICE_NAME",
        default_value = "storage"
    )]
    storage_service_name: String,

    #[arg(
        long = "storage-service-namespace",
        env = "STORAGE_SERVICE_NAMESPACE",
        default_value = "default"
    )]
    storage_service_namespace: String,

    #[arg(long = "storage-port", env = "STORAGE_PORT", default_value_t = 8181)]
    storage_port: u16,

    #[arg(
        long = "storage-request-timeout-secs",
        env = "STORAGE_REQUEST_TIMEOUT_SECS",
        value_name = "SECONDS",
        default_value_t = 10
    )]
    storage_request_timeout_secs: u64,

    #[arg(
        long = "resync-interval-secs",
        env = "RESYNC_INTERVAL_SECS",
        value_name = "SECONDS",
        default_value_t = 300
    )]
    resync_interval_secs: u64,

    #[arg(
        long = "log-format",
        env = "LOG_FORMAT",
        value_enum,
        default_value_t = telemetry::LogFormat::Compact
    )]
    log_format: telemetry::LogFormat,
}

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metrics, &mut buffer) {
        error!("Failed to encode metrics: {e}");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok().body(buffer)
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[post("/validate-teamdev-com-v1-keyvaluedata")]
async fn validate(
    c: Data<State>,
    review: web::Json<AdmissionReview<KeyValueData>>,
) -> impl Responder {
    let request: AdmissionRequest<KeyValueData> = match review.into_inner().try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid admission review: {e}");
            return HttpResponse::Ok().json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    let response = c.admit(&request).await;
    HttpResponse::Ok().json(response.into_review())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Arguments = Arguments::parse();

    telemetry::init(args.log_format);

    let client = kube::Client::try_default().await?;

    // Initiatilize Kubernetes controller state
    let state = State::new(
        client,
        StorageConfig {
            service_name: args.storage_service_name,
            service_namespace: args.storage_service_namespace,
            port: args.storage_port,
            request_timeout: Duration::from_secs(args.storage_request_timeout_secs),
        },
        Duration::from_secs(args.resync_interval_secs),
    );
    let controller = keyvalue_operator::run(state.clone());
    tokio::pin!(controller);

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
            .service(validate)
    })
    .bind(&args.bind_address)?
    .shutdown_timeout(5)
    .run();

    tokio::pin!(server);

    // Both runtimes implements graceful shutdown, so poll until both are done
    tokio::join!(controller, server).1?;
    Ok(())
}
