//! Component impact models: configuration, validation, and evaluation.
//!
//! Static parameters enter either as a typed struct ([`CpuParams`],
//! [`CloudParams`]) or as an untyped [`RawParams`] map. Both are reduced to the
//! same map and pass through one schema validator, so a [`ModelInstance`] only
//! ever holds a [`CanonicalComponentConfig`]. Usage scenarios are validated the
//! same way and evaluated against reference coefficients served by the
//! [`ReferenceProvider`].

pub mod component;
pub mod error;
pub mod evaluator;
pub mod report;
pub mod scenario;
pub mod schema;
pub mod value;

#[cfg(test)]
mod tests;

pub use component::{
    Allocation, CanonicalComponentConfig, CloudConfig, CloudParams, ComponentKind, CpuConfig,
    CpuParams, ModelInstance, StaticParams,
};
pub use error::{EvaluationError, ValidationError};
pub use evaluator::{
    Bounded, EstimateWarning, EvaluationSettings, ImpactBreakdown, ImpactEstimate,
    ImpactEvaluator, DEFAULT_REFERENCE_LIFETIME_HOURS, IMPACT_UNIT,
};
pub use report::{ImpactReport, OutcomeView, ReportView, ScenarioOutcome};
pub use scenario::{Observation, Scenarios, UsageScenario};
pub use schema::{
    FieldSummary, ParameterSchema, SchemaSummary, CLOUD_STATIC_SCHEMA, CPU_STATIC_SCHEMA,
    SCHEMA_VERSION, USAGE_SCENARIO_SCHEMA,
};
pub use value::{raw_params_from_json, ParamValue, RawParams};

use crate::reference::{BundledSource, ProviderError, ReferenceProvider, RetryPolicy};
use std::sync::Arc;
use tracing::debug;

/// Entry point for building model instances. Cheap to clone; clones share the
/// reference cache.
#[derive(Debug, Clone)]
pub struct ImpactEngine {
    evaluator: Arc<ImpactEvaluator>,
}

impl ImpactEngine {
    pub fn new(provider: Arc<ReferenceProvider>, settings: EvaluationSettings) -> Self {
        Self {
            evaluator: Arc::new(ImpactEvaluator::new(provider, settings)),
        }
    }

    /// Engine over the reference data compiled into the crate.
    pub fn with_bundled_data() -> Self {
        let provider = ReferenceProvider::new(BundledSource::new(), RetryPolicy::none());
        Self::new(Arc::new(provider), EvaluationSettings::default())
    }

    /// Validate `static_params` for `kind` and bind them to `instance_name`.
    ///
    /// CPU names are not looked up here: an unknown hardware name is reported
    /// when the instance is first evaluated. Cloud instance types come from a
    /// static catalogue, and a cloud `location` is checked against the grid
    /// intensity table.
    pub fn configure_kind(
        &self,
        kind: ComponentKind,
        instance_name: &str,
        static_params: &RawParams,
    ) -> Result<ModelInstance, ValidationError> {
        let config = component::resolve(kind, static_params)?;
        self.evaluator.check_configured_location(&config)?;
        debug!(
            instance = instance_name,
            model = kind.model_identifier(),
            "configured model instance"
        );
        Ok(ModelInstance::new(
            instance_name.to_string(),
            config,
            Arc::clone(&self.evaluator),
        ))
    }

    /// Dynamic path: configure a CPU model from an untyped parameter map.
    pub fn configure(
        &self,
        instance_name: &str,
        static_params: &RawParams,
    ) -> Result<ModelInstance, ValidationError> {
        self.configure_kind(ComponentKind::Cpu, instance_name, static_params)
    }

    /// Dynamic path for a cloud virtual machine.
    pub fn configure_cloud(
        &self,
        instance_name: &str,
        static_params: &RawParams,
    ) -> Result<ModelInstance, ValidationError> {
        self.configure_kind(ComponentKind::Cloud, instance_name, static_params)
    }

    /// Typed path. Goes through the same validator as [`ImpactEngine::configure`].
    pub fn configure_typed<P: StaticParams>(
        &self,
        instance_name: &str,
        params: &P,
    ) -> Result<ModelInstance, ValidationError> {
        self.configure_kind(P::KIND, instance_name, &params.to_raw_params())
    }

    /// Location codes with a published grid intensity.
    pub fn supported_locations(&self) -> Result<Vec<String>, ProviderError> {
        self.evaluator.provider().supported_locations()
    }

    pub fn provider(&self) -> &ReferenceProvider {
        self.evaluator.provider()
    }

    pub fn settings(&self) -> &EvaluationSettings {
        self.evaluator.settings()
    }
}
