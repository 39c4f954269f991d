use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState};
use crate::routes::router;
use axum_prometheus::PrometheusMetricLayer;
use carbon_ql::config::AppConfig;
use carbon_ql::error::AppError;
use carbon_ql::telemetry;
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

    let engine = build_engine(&config.reference, config.evaluation.clone());
    match engine.supported_locations() {
        Ok(locations) => info!(
            source = %engine.provider().source_name(),
            locations = locations.len(),
            "grid intensity table loaded"
        ),
        Err(err) => warn!(
            error = %err,
            "reference data not reachable at startup; will retry per request"
        ),
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        engine,
    };

    let app = router(app_state).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "carbon-ql service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
