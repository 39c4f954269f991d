use crate::impact::{EvaluationSettings, DEFAULT_REFERENCE_LIFETIME_HOURS};
use crate::reference::{RetryPolicy, WORLD_AVERAGE_LOCATION};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration, read from `CARBON_QL_*` variables (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub reference: ReferenceConfig,
    pub evaluation: EvaluationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("CARBON_QL_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("CARBON_QL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("CARBON_QL_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("CARBON_QL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dataset_dir = env::var("CARBON_QL_DATASET_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let fetch_attempts: u32 = parse_var("CARBON_QL_FETCH_ATTEMPTS", 3)?;
        if fetch_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                var: "CARBON_QL_FETCH_ATTEMPTS",
                reason: "at least one attempt is required",
            });
        }
        let fetch_backoff_ms: u64 = parse_var("CARBON_QL_FETCH_BACKOFF_MS", 100)?;

        let reference_lifetime_hours: f64 =
            parse_var("CARBON_QL_LIFETIME_HOURS", DEFAULT_REFERENCE_LIFETIME_HOURS)?;
        if !reference_lifetime_hours.is_finite() || reference_lifetime_hours <= 0.0 {
            return Err(ConfigError::OutOfRange {
                var: "CARBON_QL_LIFETIME_HOURS",
                reason: "lifetime must be a positive number of hours",
            });
        }
        let fallback_location = env::var("CARBON_QL_FALLBACK_LOCATION")
            .map(|value| value.trim().to_ascii_uppercase())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| WORLD_AVERAGE_LOCATION.to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            reference: ReferenceConfig {
                dataset_dir,
                fetch_attempts,
                fetch_backoff_ms,
            },
            evaluation: EvaluationSettings {
                reference_lifetime_hours,
                fallback_location,
            },
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where reference coefficients come from and how hard to try fetching them.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceConfig {
    /// Directory holding `cpu_profiles.csv` and `grid_intensity.csv`.
    /// Unset means the bundled dataset.
    pub dataset_dir: Option<PathBuf>,
    pub fetch_attempts: u32,
    pub fetch_backoff_ms: u64,
}

impl ReferenceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_attempts,
            Duration::from_millis(self.fetch_backoff_ms),
        )
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str, value: String },
    OutOfRange { var: &'static str, reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "CARBON_QL_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "CARBON_QL_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be numeric, got '{value}'")
            }
            ConfigError::OutOfRange { var, reason } => write!(f, "{var}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARS: [&str; 9] = [
        "CARBON_QL_ENV",
        "CARBON_QL_HOST",
        "CARBON_QL_PORT",
        "CARBON_QL_LOG_LEVEL",
        "CARBON_QL_DATASET_DIR",
        "CARBON_QL_FETCH_ATTEMPTS",
        "CARBON_QL_FETCH_BACKOFF_MS",
        "CARBON_QL_LIFETIME_HOURS",
        "CARBON_QL_FALLBACK_LOCATION",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.reference.dataset_dir, None);
        assert_eq!(config.reference.fetch_attempts, 3);
        assert_eq!(
            config.reference.retry_policy().base_delay(),
            Duration::from_millis(100)
        );
        assert_eq!(config.evaluation, EvaluationSettings::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CARBON_QL_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_reference_and_evaluation_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CARBON_QL_DATASET_DIR", "/srv/carbon-ql/data");
        env::set_var("CARBON_QL_FETCH_ATTEMPTS", "5");
        env::set_var("CARBON_QL_LIFETIME_HOURS", "43800");
        env::set_var("CARBON_QL_FALLBACK_LOCATION", "eee");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.reference.dataset_dir,
            Some(PathBuf::from("/srv/carbon-ql/data"))
        );
        assert_eq!(config.reference.retry_policy().attempts(), 5);
        assert_eq!(config.evaluation.reference_lifetime_hours, 43_800.0);
        assert_eq!(config.evaluation.fallback_location, "EEE");
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_and_out_of_range_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CARBON_QL_FETCH_BACKOFF_MS", "soon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                var: "CARBON_QL_FETCH_BACKOFF_MS",
                ..
            })
        ));

        reset_env();
        env::set_var("CARBON_QL_LIFETIME_HOURS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::OutOfRange { .. })
        ));
        reset_env();
    }
}
