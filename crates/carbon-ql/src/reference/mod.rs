//! Reference coefficients backing impact evaluation.
//!
//! A [`CoefficientSource`] knows how to fetch CPU profiles and grid carbon
//! intensities from some backing store. The [`ReferenceProvider`] wraps a source
//! with a per-name compute-once cache and a bounded retry policy, and is the
//! only type the evaluator talks to. Cloud instance types map onto those CPU
//! profiles through a static catalogue.

mod cloud;
mod normalizer;
mod parser;
mod provider;
mod source;

pub(crate) use normalizer::{normalize_location, normalize_name};
pub use cloud::{cloud_instance, instance_types, CloudInstance, CLOUD_INSTANCES, CLOUD_PROVIDERS};
pub use provider::{ProviderError, ReferenceProvider, RetryPolicy, MAX_CACHED_MISSES};
pub use source::{BundledSource, CoefficientSource, CsvDirectorySource, SourceError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Location code used when a requested location has no published intensity.
pub const WORLD_AVERAGE_LOCATION: &str = "WOR";

/// Built-in world average used if the dataset does not carry the fallback code.
pub const WORLD_AVERAGE_G_PER_KWH: f64 = 475.0;
pub const WORLD_AVERAGE_UNCERTAINTY: f64 = 0.25;

/// Power draw ratio (fraction of TDP) at a given workload fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub workload: f64,
    pub ratio: f64,
}

/// Piecewise-linear power curve sorted by workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerCurve {
    points: Vec<CurvePoint>,
}

impl PowerCurve {
    /// Build a curve, rejecting empty, unsorted, or negative point sets.
    pub fn new(points: Vec<CurvePoint>) -> Result<Self, String> {
        if points.is_empty() {
            return Err("power curve requires at least one point".to_string());
        }

        for point in &points {
            if !point.workload.is_finite() || !point.ratio.is_finite() || point.ratio < 0.0 {
                return Err(format!(
                    "invalid power curve point ({}, {})",
                    point.workload, point.ratio
                ));
            }
        }

        if points
            .windows(2)
            .any(|pair| pair[1].workload <= pair[0].workload)
        {
            return Err("power curve workloads must be strictly increasing".to_string());
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Linear interpolation between the documented points. Workloads outside
    /// the documented range take the nearest endpoint ratio.
    pub fn ratio_at(&self, workload: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];

        if workload <= first.workload {
            return first.ratio;
        }
        if workload >= last.workload {
            return last.ratio;
        }

        for pair in self.points.windows(2) {
            let (low, high) = (pair[0], pair[1]);
            if workload <= high.workload {
                let span = high.workload - low.workload;
                let position = (workload - low.workload) / span;
                return low.ratio + (high.ratio - low.ratio) * position;
            }
        }

        last.ratio
    }
}

/// Reference record for one CPU model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuReference {
    pub name: String,
    pub aliases: Vec<String>,
    pub reference_cores: u32,
    pub tdp_watts: f64,
    pub power_curve: PowerCurve,
    pub power_uncertainty: f64,
    pub embodied_kgco2e: f64,
    pub embodied_uncertainty: f64,
}

impl CpuReference {
    pub(crate) fn matches(&self, normalized: &str) -> bool {
        normalize_name(&self.name) == normalized
            || self
                .aliases
                .iter()
                .any(|alias| normalize_name(alias) == normalized)
    }

    /// Share of the reference chip attributed to `core_units` cores.
    pub fn core_share(&self, core_units: u32) -> f64 {
        f64::from(core_units) / f64::from(self.reference_cores)
    }

    /// Instantaneous power draw in watts for the allocated cores.
    pub fn power_watts(&self, core_units: u32, workload: f64) -> f64 {
        self.tdp_watts * self.core_share(core_units) * self.power_curve.ratio_at(workload)
    }

    /// Manufacturing footprint in kgCO2eq attributed to the allocated cores.
    pub fn embodied_for(&self, core_units: u32) -> f64 {
        self.embodied_kgco2e * self.core_share(core_units)
    }
}

/// Carbon intensity of electricity for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridIntensity {
    pub location: String,
    pub grams_per_kwh: f64,
    pub uncertainty: f64,
}

impl GridIntensity {
    fn world_average() -> Self {
        Self {
            location: WORLD_AVERAGE_LOCATION.to_string(),
            grams_per_kwh: WORLD_AVERAGE_G_PER_KWH,
            uncertainty: WORLD_AVERAGE_UNCERTAINTY,
        }
    }
}

/// Intensity chosen for a scenario, flagged when a fallback was used.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIntensity {
    pub intensity: GridIntensity,
    pub fallback: bool,
}

/// Location-keyed grid intensity table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridIntensityTable {
    entries: BTreeMap<String, GridIntensity>,
}

impl GridIntensityTable {
    pub fn insert(&mut self, intensity: GridIntensity) {
        let key = normalize_location(&intensity.location);
        self.entries.insert(
            key.clone(),
            GridIntensity {
                location: key,
                ..intensity
            },
        );
    }

    pub fn get(&self, location: &str) -> Option<&GridIntensity> {
        self.entries.get(&normalize_location(location))
    }

    pub fn locations(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `location`, degrading to `fallback_location` and then to the
    /// built-in world average.
    pub fn resolve(&self, location: &str, fallback_location: &str) -> ResolvedIntensity {
        if let Some(intensity) = self.get(location) {
            return ResolvedIntensity {
                intensity: intensity.clone(),
                fallback: false,
            };
        }

        let intensity = self
            .get(fallback_location)
            .cloned()
            .unwrap_or_else(GridIntensity::world_average);

        ResolvedIntensity {
            intensity,
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> PowerCurve {
        PowerCurve::new(vec![
            CurvePoint {
                workload: 0.0,
                ratio: 0.12,
            },
            CurvePoint {
                workload: 0.1,
                ratio: 0.32,
            },
            CurvePoint {
                workload: 0.5,
                ratio: 0.75,
            },
            CurvePoint {
                workload: 1.0,
                ratio: 1.02,
            },
        ])
        .expect("valid curve")
    }

    #[test]
    fn curve_interpolates_between_points() {
        let curve = curve();
        assert!((curve.ratio_at(0.0) - 0.12).abs() < 1e-12);
        assert!((curve.ratio_at(0.3) - 0.535).abs() < 1e-12);
        assert!((curve.ratio_at(0.75) - 0.885).abs() < 1e-12);
        assert!((curve.ratio_at(1.0) - 1.02).abs() < 1e-12);
    }

    #[test]
    fn curve_holds_endpoints_outside_range() {
        let curve = curve();
        assert_eq!(curve.ratio_at(-1.0), 0.12);
        assert_eq!(curve.ratio_at(3.0), 1.02);
    }

    #[test]
    fn curve_rejects_unsorted_points() {
        let result = PowerCurve::new(vec![
            CurvePoint {
                workload: 0.5,
                ratio: 0.7,
            },
            CurvePoint {
                workload: 0.1,
                ratio: 0.3,
            },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn table_resolves_known_and_fallback_locations() {
        let mut table = GridIntensityTable::default();
        table.insert(GridIntensity {
            location: "usa".to_string(),
            grams_per_kwh: 379.0,
            uncertainty: 0.1,
        });

        let known = table.resolve("USA", WORLD_AVERAGE_LOCATION);
        assert!(!known.fallback);
        assert_eq!(known.intensity.grams_per_kwh, 379.0);

        let degraded = table.resolve("ATA", WORLD_AVERAGE_LOCATION);
        assert!(degraded.fallback);
        assert_eq!(degraded.intensity.location, WORLD_AVERAGE_LOCATION);
        assert_eq!(degraded.intensity.grams_per_kwh, WORLD_AVERAGE_G_PER_KWH);
    }
}
