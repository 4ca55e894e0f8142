use crate::cli::ServeArgs;
use crate::infra::{authorization_from_config, build_engine, AppState};
use crate::routes::with_change_queue_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use change_queue::config::AppConfig;
use change_queue::error::AppError;
use change_queue::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.authorization.sevis_officers.is_empty() {
        warn!("CHANGE_QUEUE_SEVIS_OFFICERS is empty; SEVIS-related items cannot be approved");
    }
    let authorization = authorization_from_config(&config.authorization);
    let engine = Arc::new(build_engine(authorization, config.change_queue.clone())?);

    let app = with_change_queue_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        reviewers = config.authorization.reviewers.len(),
        sevis_officers = config.authorization.sevis_officers.len(),
        "change queue service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
