use crate::infra::AppState;
use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use carbon_ql::error::AppError;
use carbon_ql::impact::{raw_params_from_json, ComponentKind, ReportView, ValidationError};
use carbon_ql::reference::{instance_types, CLOUD_PROVIDERS};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Body of `POST /api/v1/component/cpu` and `POST /api/v1/cloud`.
#[derive(Debug, Deserialize)]
pub(crate) struct UsageRequest {
    #[serde(default)]
    pub(crate) instance: Option<String>,
    /// Static parameters of the component kind the route serves.
    pub(crate) params: Value,
    /// One scenario mapping or a sequence of them.
    pub(crate) usage: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstancesQuery {
    pub(crate) provider: String,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/component/cpu", post(cpu_usage_endpoint))
        .route("/api/v1/cloud", post(cloud_usage_endpoint))
        .route("/api/v1/cloud/all_instances", get(cloud_instances_endpoint))
        .route("/api/v1/utils/country_code", get(locations_endpoint))
        .layer(Extension(state))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn cpu_usage_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<UsageRequest>,
) -> Result<Json<ReportView>, AppError> {
    evaluate_request(state, ComponentKind::Cpu, payload).await
}

pub(crate) async fn cloud_usage_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<UsageRequest>,
) -> Result<Json<ReportView>, AppError> {
    evaluate_request(state, ComponentKind::Cloud, payload).await
}

async fn evaluate_request(
    state: AppState,
    kind: ComponentKind,
    payload: UsageRequest,
) -> Result<Json<ReportView>, AppError> {
    let UsageRequest {
        instance,
        params,
        usage,
    } = payload;
    let instance_name = instance.unwrap_or_else(|| kind.model_identifier().to_string());
    let static_params = raw_params_from_json(&params)?;
    debug!(
        instance = %instance_name,
        model = kind.model_identifier(),
        "evaluating usage request"
    );

    // Reference lookups may block on retries; keep them off the async workers.
    let engine = state.engine.clone();
    let report = tokio::task::spawn_blocking(move || -> Result<_, AppError> {
        let model = engine.configure_kind(kind, &instance_name, &static_params)?;
        Ok(model.usage_json(&usage)?)
    })
    .await
    .map_err(|err| AppError::Server(axum::Error::new(err)))??;

    Ok(Json(report.view()))
}

pub(crate) async fn cloud_instances_endpoint(
    Query(query): Query<InstancesQuery>,
) -> Result<Json<Vec<&'static str>>, AppError> {
    if !CLOUD_PROVIDERS.contains(&query.provider.as_str()) {
        return Err(ValidationError::InvalidFieldType {
            field: "provider".to_string(),
            expected: format!("one of {}", CLOUD_PROVIDERS.join(", ")),
            got: format!("string {:?}", query.provider),
        }
        .into());
    }
    Ok(Json(instance_types(&query.provider)))
}

pub(crate) async fn locations_endpoint(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<String>>, AppError> {
    let engine = state.engine.clone();
    let locations = tokio::task::spawn_blocking(move || engine.supported_locations())
        .await
        .map_err(|err| AppError::Server(axum::Error::new(err)))??;
    Ok(Json(locations))
}
