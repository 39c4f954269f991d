use super::component::{Allocation, CanonicalComponentConfig};
use super::error::{EvaluationError, ValidationError};
use super::scenario::UsageScenario;
use crate::reference::{ReferenceProvider, WORLD_AVERAGE_LOCATION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const IMPACT_UNIT: &str = "kgCO2eq";

/// Four years of continuous operation.
pub const DEFAULT_REFERENCE_LIFETIME_HOURS: f64 = 35_040.0;

/// Engine-wide knobs that are not part of a component's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    pub reference_lifetime_hours: f64,
    pub fallback_location: String,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            reference_lifetime_hours: DEFAULT_REFERENCE_LIFETIME_HOURS,
            fallback_location: WORLD_AVERAGE_LOCATION.to_string(),
        }
    }
}

/// A central value with its lower and upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounded {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Bounded {
    /// Worst-case band: every relative uncertainty widens the interval
    /// multiplicatively.
    fn spread(value: f64, uncertainties: &[f64]) -> Self {
        let low: f64 = uncertainties.iter().map(|u| 1.0 - u).product();
        let high: f64 = uncertainties.iter().map(|u| 1.0 + u).product();
        Self {
            value,
            min: (value * low).max(0.0),
            max: value * high,
        }
    }

    fn plus(self, other: Bounded) -> Self {
        Self {
            value: self.value + other.value,
            min: self.min + other.min,
            max: self.max + other.max,
        }
    }
}

/// Non-fatal degradation recorded alongside an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateWarning {
    UnknownLocation { requested: String, fallback: String },
    WorkloadClamped { requested: f64, applied: f64 },
}

/// Intermediate figures, attached when the model is configured `verbose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactBreakdown {
    pub embodied: Bounded,
    pub usage: Bounded,
    pub power_watts: f64,
    pub energy_kwh: f64,
    pub grid_intensity_g_per_kwh: f64,
    pub applied_workload: f64,
    pub allocation: Allocation,
}

/// Evaluation result; `min <= value <= max` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EstimateWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ImpactBreakdown>,
}

impl ImpactEstimate {
    pub fn is_degraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|warning| matches!(warning, EstimateWarning::UnknownLocation { .. }))
    }
}

/// The slice of a reference CPU a configured model stands for.
struct ProcessorShare<'a> {
    name: &'a str,
    core_units: u32,
    allocation: Allocation,
    verbose: bool,
}

/// Stateless numeric core; the provider cache is the only shared state.
#[derive(Debug)]
pub struct ImpactEvaluator {
    provider: Arc<ReferenceProvider>,
    settings: EvaluationSettings,
}

impl ImpactEvaluator {
    pub fn new(provider: Arc<ReferenceProvider>, settings: EvaluationSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &ReferenceProvider {
        &self.provider
    }

    pub fn settings(&self) -> &EvaluationSettings {
        &self.settings
    }

    pub fn evaluate(
        &self,
        config: &CanonicalComponentConfig,
        scenario: &UsageScenario,
    ) -> Result<ImpactEstimate, EvaluationError> {
        let share = match config {
            CanonicalComponentConfig::Cpu(cpu) => ProcessorShare {
                name: cpu.name(),
                core_units: cpu.core_units(),
                allocation: cpu.allocation(),
                verbose: cpu.verbose(),
            },
            CanonicalComponentConfig::Cloud(cloud) => ProcessorShare {
                name: cloud.instance().cpu_name,
                core_units: cloud.instance().cores,
                allocation: cloud.allocation(),
                verbose: cloud.verbose(),
            },
        };
        self.evaluate_share(&share, scenario)
    }

    /// Cloud models reject a configured location without a published grid
    /// intensity. If the grid table cannot be fetched the check is skipped and
    /// evaluation reports the outage.
    pub(crate) fn check_configured_location(
        &self,
        config: &CanonicalComponentConfig,
    ) -> Result<(), ValidationError> {
        let location = match config {
            CanonicalComponentConfig::Cloud(cloud) => match cloud.location() {
                Some(location) => location,
                None => return Ok(()),
            },
            CanonicalComponentConfig::Cpu(_) => return Ok(()),
        };

        match self.provider.grid_intensities() {
            Ok(table) if table.get(location).is_some() => Ok(()),
            Ok(table) => Err(ValidationError::InvalidFieldType {
                field: "location".to_string(),
                expected: format!("one of {}", table.locations().join(", ")),
                got: format!("string {location:?}"),
            }),
            Err(err) => {
                warn!(location, error = %err, "cannot check configured location yet");
                Ok(())
            }
        }
    }

    fn evaluate_share(
        &self,
        config: &ProcessorShare<'_>,
        scenario: &UsageScenario,
    ) -> Result<ImpactEstimate, EvaluationError> {
        let reference = self.provider.cpu(config.name)?.ok_or_else(|| {
            EvaluationError::UnknownHardwareModel {
                name: config.name.to_string(),
            }
        })?;

        let mut warnings = Vec::new();
        let hours = scenario.hours_use_time();

        let requested_workload = scenario.time_workload();
        let workload = requested_workload.clamp(0.0, 1.0);
        if workload != requested_workload {
            warn!(
                model = config.name,
                requested = requested_workload,
                applied = workload,
                "workload fraction outside [0, 1] clamped"
            );
            warnings.push(EstimateWarning::WorkloadClamped {
                requested: requested_workload,
                applied: workload,
            });
        }

        let grid = self.provider.grid_intensities()?;
        let resolved = grid.resolve(scenario.usage_location(), &self.settings.fallback_location);
        if resolved.fallback {
            warn!(
                requested = scenario.usage_location(),
                fallback = %resolved.intensity.location,
                "unknown usage location, using fallback grid intensity"
            );
            warnings.push(EstimateWarning::UnknownLocation {
                requested: scenario.usage_location().to_string(),
                fallback: resolved.intensity.location.clone(),
            });
        }

        let power_watts = reference.power_watts(config.core_units, workload);
        let energy_kwh = power_watts * hours / 1000.0;
        let usage = Bounded::spread(
            energy_kwh * resolved.intensity.grams_per_kwh / 1000.0,
            &[reference.power_uncertainty, resolved.intensity.uncertainty],
        );

        let share = match config.allocation {
            Allocation::Linear => hours / self.settings.reference_lifetime_hours,
            Allocation::Total => 1.0,
        };
        let embodied = Bounded::spread(
            reference.embodied_for(config.core_units) * share,
            &[reference.embodied_uncertainty],
        );

        let total = embodied.plus(usage);
        if ![total.value, total.min, total.max].iter().all(|bound| bound.is_finite()) {
            return Err(EvaluationError::NonFiniteEstimate {
                name: config.name.to_string(),
            });
        }

        let breakdown = config.verbose.then(|| ImpactBreakdown {
            embodied,
            usage,
            power_watts,
            energy_kwh,
            grid_intensity_g_per_kwh: resolved.intensity.grams_per_kwh,
            applied_workload: workload,
            allocation: config.allocation,
        });

        Ok(ImpactEstimate {
            value: total.value,
            min: total.min.min(total.value),
            max: total.max.max(total.value),
            unit: IMPACT_UNIT.to_string(),
            warnings,
            breakdown,
        })
    }
}
