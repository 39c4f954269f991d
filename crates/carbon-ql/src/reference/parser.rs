use super::source::SourceError;
use super::{CpuReference, CurvePoint, GridIntensity, GridIntensityTable, PowerCurve};
use serde::{Deserialize, Deserializer};
use std::io::Read;

const CURVE_WORKLOADS: [f64; 4] = [0.0, 0.1, 0.5, 1.0];

pub(crate) fn parse_cpu_profiles<R: Read>(reader: R) -> Result<Vec<CpuReference>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut profiles = Vec::new();

    for (index, record) in csv_reader.deserialize::<CpuProfileRow>().enumerate() {
        let row = record?;
        // header occupies line 1
        let line = index + 2;
        profiles.push(row.into_reference(line)?);
    }

    Ok(profiles)
}

pub(crate) fn parse_grid_intensities<R: Read>(
    reader: R,
) -> Result<GridIntensityTable, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut table = GridIntensityTable::default();

    for (index, record) in csv_reader.deserialize::<GridIntensityRow>().enumerate() {
        let row = record?;
        let line = index + 2;

        if row.location.trim().is_empty() {
            return Err(SourceError::Malformed {
                line,
                reason: "location code is empty".to_string(),
            });
        }
        if !row.grams_per_kwh.is_finite() || row.grams_per_kwh < 0.0 {
            return Err(SourceError::Malformed {
                line,
                reason: format!("intensity {} must be non-negative", row.grams_per_kwh),
            });
        }
        check_uncertainty(line, "uncertainty", row.uncertainty)?;

        table.insert(GridIntensity {
            location: row.location,
            grams_per_kwh: row.grams_per_kwh,
            uncertainty: row.uncertainty,
        });
    }

    Ok(table)
}

#[derive(Debug, Deserialize)]
struct CpuProfileRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Aliases", default, deserialize_with = "empty_string_as_none")]
    aliases: Option<String>,
    #[serde(rename = "Cores")]
    cores: u32,
    #[serde(rename = "TDP Watts")]
    tdp_watts: f64,
    #[serde(rename = "Load 0")]
    load_0: f64,
    #[serde(rename = "Load 10")]
    load_10: f64,
    #[serde(rename = "Load 50")]
    load_50: f64,
    #[serde(rename = "Load 100")]
    load_100: f64,
    #[serde(rename = "Power Uncertainty")]
    power_uncertainty: f64,
    #[serde(rename = "Embodied kgCO2eq")]
    embodied_kgco2e: f64,
    #[serde(rename = "Embodied Uncertainty")]
    embodied_uncertainty: f64,
}

impl CpuProfileRow {
    fn into_reference(self, line: usize) -> Result<CpuReference, SourceError> {
        if self.name.trim().is_empty() {
            return Err(SourceError::Malformed {
                line,
                reason: "hardware name is empty".to_string(),
            });
        }
        if self.cores == 0 {
            return Err(SourceError::Malformed {
                line,
                reason: "core count must be at least 1".to_string(),
            });
        }
        for (label, value) in [
            ("TDP", self.tdp_watts),
            ("embodied footprint", self.embodied_kgco2e),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SourceError::Malformed {
                    line,
                    reason: format!("{label} {value} must be non-negative"),
                });
            }
        }
        check_uncertainty(line, "power uncertainty", self.power_uncertainty)?;
        check_uncertainty(line, "embodied uncertainty", self.embodied_uncertainty)?;

        let ratios = [self.load_0, self.load_10, self.load_50, self.load_100];
        let points = CURVE_WORKLOADS
            .iter()
            .zip(ratios)
            .map(|(&workload, ratio)| CurvePoint { workload, ratio })
            .collect();
        let power_curve =
            PowerCurve::new(points).map_err(|reason| SourceError::Malformed { line, reason })?;

        let aliases = self
            .aliases
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|alias| !alias.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(CpuReference {
            name: self.name,
            aliases,
            reference_cores: self.cores,
            tdp_watts: self.tdp_watts,
            power_curve,
            power_uncertainty: self.power_uncertainty,
            embodied_kgco2e: self.embodied_kgco2e,
            embodied_uncertainty: self.embodied_uncertainty,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GridIntensityRow {
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "gCO2eq per kWh")]
    grams_per_kwh: f64,
    #[serde(rename = "Uncertainty")]
    uncertainty: f64,
}

fn check_uncertainty(line: usize, label: &str, value: f64) -> Result<(), SourceError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SourceError::Malformed {
            line,
            reason: format!("{label} {value} must lie within [0, 1]"),
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
