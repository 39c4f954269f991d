use carbon_ql::config::ReferenceConfig;
use carbon_ql::error::AppError;
use carbon_ql::impact::{EvaluationSettings, ImpactEngine};
use carbon_ql::reference::{BundledSource, CsvDirectorySource, ReferenceProvider};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) engine: ImpactEngine,
}

/// Wire the configured coefficient source into an engine.
pub(crate) fn build_engine(
    reference: &ReferenceConfig,
    settings: EvaluationSettings,
) -> ImpactEngine {
    let retry = reference.retry_policy();
    let provider = match &reference.dataset_dir {
        Some(dir) => ReferenceProvider::new(CsvDirectorySource::new(dir), retry),
        None => ReferenceProvider::new(BundledSource::new(), retry),
    };
    ImpactEngine::new(Arc::new(provider), settings)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
