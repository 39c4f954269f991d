use super::parser::{parse_cpu_profiles, parse_grid_intensities};
use super::{CpuReference, GridIntensityTable};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const CPU_PROFILES_FILE: &str = "cpu_profiles.csv";
pub const GRID_INTENSITY_FILE: &str = "grid_intensity.csv";

const BUNDLED_CPU_PROFILES: &str = include_str!("../../data/cpu_profiles.csv");
const BUNDLED_GRID_INTENSITY: &str = include_str!("../../data/grid_intensity.csv");

/// Backing store for reference coefficients (bundled data, files, a remote service).
pub trait CoefficientSource: Send + Sync {
    /// Fetch the profile whose name or alias normalizes to `normalized_name`.
    fn fetch_cpu(&self, normalized_name: &str) -> Result<Option<CpuReference>, SourceError>;

    fn fetch_grid(&self) -> Result<GridIntensityTable, SourceError>;

    /// Label used in diagnostics.
    fn describe(&self) -> String;
}

/// Failure fetching or decoding reference data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("reference data unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid reference CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed reference row at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("reference service unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Io(_) | SourceError::Unavailable(_) => true,
            SourceError::Csv(err) => err.is_io_error(),
            SourceError::Malformed { .. } => false,
        }
    }
}

/// Dataset compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledSource;

impl BundledSource {
    pub fn new() -> Self {
        Self
    }
}

impl CoefficientSource for BundledSource {
    fn fetch_cpu(&self, normalized_name: &str) -> Result<Option<CpuReference>, SourceError> {
        let profiles = parse_cpu_profiles(Cursor::new(BUNDLED_CPU_PROFILES))?;
        Ok(find_profile(profiles, normalized_name))
    }

    fn fetch_grid(&self) -> Result<GridIntensityTable, SourceError> {
        parse_grid_intensities(Cursor::new(BUNDLED_GRID_INTENSITY))
    }

    fn describe(&self) -> String {
        "bundled dataset".to_string()
    }
}

/// Reads `cpu_profiles.csv` and `grid_intensity.csv` from a directory on every fetch.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CoefficientSource for CsvDirectorySource {
    fn fetch_cpu(&self, normalized_name: &str) -> Result<Option<CpuReference>, SourceError> {
        let file = File::open(self.dir.join(CPU_PROFILES_FILE))?;
        let profiles = parse_cpu_profiles(file)?;
        Ok(find_profile(profiles, normalized_name))
    }

    fn fetch_grid(&self) -> Result<GridIntensityTable, SourceError> {
        let file = File::open(self.dir.join(GRID_INTENSITY_FILE))?;
        parse_grid_intensities(file)
    }

    fn describe(&self) -> String {
        format!("csv directory {}", self.dir.display())
    }
}

fn find_profile(profiles: Vec<CpuReference>, normalized_name: &str) -> Option<CpuReference> {
    profiles
        .into_iter()
        .find(|profile| profile.matches(normalized_name))
}
