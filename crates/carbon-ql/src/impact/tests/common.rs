use std::sync::Arc;
use std::time::Duration;

use crate::impact::{
    CpuParams, EvaluationSettings, ImpactEngine, ModelInstance, ParamValue, RawParams,
};
use crate::reference::{
    BundledSource, CoefficientSource, CpuReference, GridIntensityTable, ReferenceProvider,
    RetryPolicy, SourceError,
};

pub(super) const XEON_8272CL: &str = "Intel Xeon Platinum 8272CL";

pub(super) fn engine() -> ImpactEngine {
    ImpactEngine::with_bundled_data()
}

pub(super) fn xeon_instance(engine: &ImpactEngine) -> ModelInstance {
    engine
        .configure_typed("my-model", &CpuParams::new(XEON_8272CL, 2))
        .expect("valid cpu configuration")
}

pub(super) fn cpu_raw(name: &str, core_units: i64) -> RawParams {
    RawParams::from([
        ("name".to_string(), ParamValue::from(name)),
        ("core_units".to_string(), ParamValue::Integer(core_units)),
    ])
}

pub(super) fn cloud_raw(provider: &str, instance_type: &str, location: Option<&str>) -> RawParams {
    let mut raw = RawParams::from([
        ("provider".to_string(), ParamValue::from(provider)),
        ("instance_type".to_string(), ParamValue::from(instance_type)),
    ]);
    if let Some(location) = location {
        raw.insert("location".to_string(), ParamValue::from(location));
    }
    raw
}

pub(super) fn scenario(hours: f64, location: &str, workload: f64) -> RawParams {
    RawParams::from([
        ("hours_use_time".to_string(), ParamValue::Real(hours)),
        ("usage_location".to_string(), ParamValue::from(location)),
        ("time_workload".to_string(), ParamValue::Real(workload)),
    ])
}

/// Source whose every fetch fails with a transient error.
pub(super) struct OfflineSource;

impl CoefficientSource for OfflineSource {
    fn fetch_cpu(&self, _normalized_name: &str) -> Result<Option<CpuReference>, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }

    fn fetch_grid(&self) -> Result<GridIntensityTable, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }

    fn describe(&self) -> String {
        "offline source".to_string()
    }
}

pub(super) fn offline_engine() -> ImpactEngine {
    let provider = ReferenceProvider::new(OfflineSource, RetryPolicy::none());
    ImpactEngine::new(Arc::new(provider), EvaluationSettings::default())
}

/// Source whose CPU data is corrupt; retrying cannot help.
pub(super) struct CorruptSource;

impl CoefficientSource for CorruptSource {
    fn fetch_cpu(&self, _normalized_name: &str) -> Result<Option<CpuReference>, SourceError> {
        Err(SourceError::Malformed {
            line: 4,
            reason: "cores must be at least 1".to_string(),
        })
    }

    fn fetch_grid(&self) -> Result<GridIntensityTable, SourceError> {
        BundledSource::new().fetch_grid()
    }

    fn describe(&self) -> String {
        "corrupt source".to_string()
    }
}

pub(super) fn corrupt_engine() -> ImpactEngine {
    let provider = ReferenceProvider::new(CorruptSource, RetryPolicy::new(3, Duration::ZERO));
    ImpactEngine::new(Arc::new(provider), EvaluationSettings::default())
}
