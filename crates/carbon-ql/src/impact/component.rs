use super::error::{EvaluationError, ValidationError};
use super::evaluator::{ImpactEstimate, ImpactEvaluator};
use super::report::{evaluate_all, evaluate_batch, ImpactReport, ScenarioOutcome};
use super::scenario::{self, UsageScenario};
use super::schema::{ParameterSchema, ValidatedParams, CLOUD_STATIC_SCHEMA, CPU_STATIC_SCHEMA};
use super::value::{ParamValue, RawParams};
use crate::reference::{cloud_instance, instance_types, normalize_location, CloudInstance};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Component family selecting the schema and evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Cpu,
    Cloud,
}

impl ComponentKind {
    pub fn schema(self) -> &'static ParameterSchema {
        match self {
            ComponentKind::Cpu => &CPU_STATIC_SCHEMA,
            ComponentKind::Cloud => &CLOUD_STATIC_SCHEMA,
        }
    }

    pub const fn model_identifier(self) -> &'static str {
        match self {
            ComponentKind::Cpu => "carbon-ql.cpu",
            ComponentKind::Cloud => "carbon-ql.cloud",
        }
    }
}

/// How much of the embodied footprint a scenario carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Allocation {
    /// Share proportional to `hours_use_time` over the reference lifetime.
    #[default]
    Linear,
    /// The whole footprint, regardless of duration.
    Total,
}

impl Allocation {
    pub const fn label(self) -> &'static str {
        match self {
            Allocation::Linear => "LINEAR",
            Allocation::Total => "TOTAL",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "LINEAR" => Some(Allocation::Linear),
            "TOTAL" => Some(Allocation::Total),
            _ => None,
        }
    }

    fn from_validated(validated: &ValidatedParams) -> Result<Self, ValidationError> {
        let label = validated.text("allocation")?;
        Self::from_label(label).ok_or_else(|| ValidationError::InvalidFieldType {
            field: "allocation".to_string(),
            expected: "one of LINEAR, TOTAL".to_string(),
            got: format!("string {label:?}"),
        })
    }
}

/// Typed static parameters, reduced to [`RawParams`] before validation.
pub trait StaticParams {
    const KIND: ComponentKind;

    fn to_raw_params(&self) -> RawParams;
}

/// Typed configuration for the CPU model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuParams {
    pub name: String,
    pub core_units: u32,
    pub allocation: Option<Allocation>,
    /// Used for scenarios that carry no `usage_location`.
    pub location: Option<String>,
    pub verbose: Option<bool>,
}

impl CpuParams {
    pub fn new(name: impl Into<String>, core_units: u32) -> Self {
        Self {
            name: name.into(),
            core_units,
            ..Self::default()
        }
    }
}

impl StaticParams for CpuParams {
    const KIND: ComponentKind = ComponentKind::Cpu;

    fn to_raw_params(&self) -> RawParams {
        let mut raw = RawParams::new();
        raw.insert("name".to_string(), ParamValue::from(self.name.as_str()));
        raw.insert("core_units".to_string(), ParamValue::from(self.core_units));
        insert_common(&mut raw, self.allocation, self.location.as_deref(), self.verbose);
        raw
    }
}

fn insert_common(
    raw: &mut RawParams,
    allocation: Option<Allocation>,
    location: Option<&str>,
    verbose: Option<bool>,
) {
    if let Some(allocation) = allocation {
        raw.insert("allocation".to_string(), ParamValue::from(allocation.label()));
    }
    if let Some(location) = location {
        raw.insert("location".to_string(), ParamValue::from(location));
    }
    if let Some(verbose) = verbose {
        raw.insert("verbose".to_string(), ParamValue::from(verbose));
    }
}

/// Validated CPU configuration. Deserialization runs the schema validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParams", into = "RawParams")]
pub struct CpuConfig {
    name: String,
    core_units: u32,
    allocation: Allocation,
    location: Option<String>,
    verbose: bool,
}

impl CpuConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn core_units(&self) -> u32 {
        self.core_units
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    fn from_validated(validated: &ValidatedParams) -> Result<Self, ValidationError> {
        let core_units = validated.integer("core_units")?;
        let core_units =
            u32::try_from(core_units).map_err(|_| ValidationError::InvalidFieldType {
                field: "core_units".to_string(),
                expected: format!("positive integer at most {}", u32::MAX),
                got: format!("integer {core_units}"),
            })?;

        Ok(Self {
            name: validated.text("name")?.to_string(),
            core_units,
            allocation: Allocation::from_validated(validated)?,
            location: validated.optional_text("location").map(normalize_location),
            verbose: validated.flag("verbose")?,
        })
    }
}

impl TryFrom<RawParams> for CpuConfig {
    type Error = ValidationError;

    fn try_from(raw: RawParams) -> Result<Self, Self::Error> {
        Self::from_validated(&CPU_STATIC_SCHEMA.validate(&raw)?)
    }
}

impl From<CpuConfig> for RawParams {
    fn from(config: CpuConfig) -> Self {
        CpuParams {
            name: config.name,
            core_units: config.core_units,
            allocation: Some(config.allocation),
            location: config.location,
            verbose: Some(config.verbose),
        }
        .to_raw_params()
    }
}

/// Typed configuration for a cloud virtual machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudParams {
    pub provider: String,
    pub instance_type: String,
    pub allocation: Option<Allocation>,
    pub location: Option<String>,
    pub verbose: Option<bool>,
}

impl CloudParams {
    pub fn new(provider: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            instance_type: instance_type.into(),
            ..Self::default()
        }
    }
}

impl StaticParams for CloudParams {
    const KIND: ComponentKind = ComponentKind::Cloud;

    fn to_raw_params(&self) -> RawParams {
        let mut raw = RawParams::new();
        raw.insert("provider".to_string(), ParamValue::from(self.provider.as_str()));
        raw.insert(
            "instance_type".to_string(),
            ParamValue::from(self.instance_type.as_str()),
        );
        insert_common(&mut raw, self.allocation, self.location.as_deref(), self.verbose);
        raw
    }
}

/// Validated cloud configuration bound to a catalogued instance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParams", into = "RawParams")]
pub struct CloudConfig {
    instance: &'static CloudInstance,
    allocation: Allocation,
    location: Option<String>,
    verbose: bool,
}

impl CloudConfig {
    pub fn instance(&self) -> &'static CloudInstance {
        self.instance
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    fn from_validated(validated: &ValidatedParams) -> Result<Self, ValidationError> {
        let provider = validated.text("provider")?;
        let instance_type = validated.text("instance_type")?;
        let instance = cloud_instance(provider, instance_type).ok_or_else(|| {
            ValidationError::InvalidFieldType {
                field: "instance_type".to_string(),
                expected: format!("one of {}", instance_types(provider).join(", ")),
                got: format!("string {instance_type:?}"),
            }
        })?;

        Ok(Self {
            instance,
            allocation: Allocation::from_validated(validated)?,
            location: validated.optional_text("location").map(normalize_location),
            verbose: validated.flag("verbose")?,
        })
    }
}

impl TryFrom<RawParams> for CloudConfig {
    type Error = ValidationError;

    fn try_from(raw: RawParams) -> Result<Self, Self::Error> {
        Self::from_validated(&CLOUD_STATIC_SCHEMA.validate(&raw)?)
    }
}

impl From<CloudConfig> for RawParams {
    fn from(config: CloudConfig) -> Self {
        CloudParams {
            provider: config.instance.provider.to_string(),
            instance_type: config.instance.instance_type.to_string(),
            allocation: Some(config.allocation),
            location: config.location,
            verbose: Some(config.verbose),
        }
        .to_raw_params()
    }
}

/// The one validated representation of a component's static parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalComponentConfig {
    Cpu(CpuConfig),
    Cloud(CloudConfig),
}

impl CanonicalComponentConfig {
    pub const fn kind(&self) -> ComponentKind {
        match self {
            CanonicalComponentConfig::Cpu(_) => ComponentKind::Cpu,
            CanonicalComponentConfig::Cloud(_) => ComponentKind::Cloud,
        }
    }

    pub fn verbose(&self) -> bool {
        match self {
            CanonicalComponentConfig::Cpu(config) => config.verbose(),
            CanonicalComponentConfig::Cloud(config) => config.verbose(),
        }
    }

    /// Static location filled into scenarios that omit `usage_location`.
    pub fn location(&self) -> Option<&str> {
        match self {
            CanonicalComponentConfig::Cpu(config) => config.location(),
            CanonicalComponentConfig::Cloud(config) => config.location(),
        }
    }
}

/// Convergence point for the typed and dynamic configuration paths.
pub fn resolve(
    kind: ComponentKind,
    raw: &RawParams,
) -> Result<CanonicalComponentConfig, ValidationError> {
    let validated = kind.schema().validate(raw)?;
    match kind {
        ComponentKind::Cpu => {
            CpuConfig::from_validated(&validated).map(CanonicalComponentConfig::Cpu)
        }
        ComponentKind::Cloud => {
            CloudConfig::from_validated(&validated).map(CanonicalComponentConfig::Cloud)
        }
    }
}

/// A named, configured component ready for evaluation.
#[derive(Clone)]
pub struct ModelInstance {
    name: String,
    config: CanonicalComponentConfig,
    evaluator: Arc<ImpactEvaluator>,
}

impl ModelInstance {
    pub(crate) fn new(
        name: String,
        config: CanonicalComponentConfig,
        evaluator: Arc<ImpactEvaluator>,
    ) -> Self {
        Self {
            name,
            config,
            evaluator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CanonicalComponentConfig {
        &self.config
    }

    pub fn kind(&self) -> ComponentKind {
        self.config.kind()
    }

    /// Build a new instance with different static parameters; `self` is untouched.
    pub fn reconfigure(&self, static_params: &RawParams) -> Result<Self, ValidationError> {
        let config = resolve(self.kind(), static_params)?;
        self.evaluator.check_configured_location(&config)?;
        Ok(Self::new(self.name.clone(), config, Arc::clone(&self.evaluator)))
    }

    /// Evaluate an already normalized scenario.
    pub fn evaluate(&self, scenario: &UsageScenario) -> Result<ImpactEstimate, EvaluationError> {
        self.evaluator.evaluate(&self.config, scenario)
    }

    /// Validate and evaluate one raw scenario.
    pub fn usage(&self, scenario: &RawParams) -> Result<ImpactEstimate, EvaluationError> {
        let scenario = UsageScenario::from_raw_located(scenario, self.config.location())?;
        self.evaluate(&scenario)
    }

    /// Evaluate a batch, keeping input order. Element failures stay in place.
    pub fn usage_batch(
        &self,
        scenarios: &[RawParams],
    ) -> Result<Vec<ScenarioOutcome>, EvaluationError> {
        evaluate_batch(
            &self.evaluator,
            &self.config,
            scenario::normalize_batch(scenarios, self.config.location()),
        )
    }

    /// Evaluate a JSON mapping (single scenario) or sequence of mappings (batch).
    pub fn usage_json(&self, input: &serde_json::Value) -> Result<ImpactReport, EvaluationError> {
        let scenarios = scenario::normalize_located(input, self.config.location())?;
        evaluate_all(&self.evaluator, &self.config, scenarios)
    }
}

impl PartialEq for ModelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.config == other.config
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
