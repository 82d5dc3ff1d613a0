//! Service configuration loader - parses station.toml
//!
//! Separates station metadata, telemetry endpoint settings and model
//! parameters from code, so the forecast can be retuned or pointed at a
//! different station without recompiling the service.

use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::analysis::seasonal::{SeasonalConfig, SeasonalityMode};
use crate::ingest::retry::RetryPolicy;
use crate::pipeline::{HorizonAnchor, PipelineConfig};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "station.toml";

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub station: StationConfig,
    pub telemetry: TelemetryConfig,
    pub forecast: ForecastConfig,
    pub logging: LoggingConfig,
}

/// The single monitored station
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Numeric ANA station code, e.g. "86510000"
    pub code: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// First day requested from the telemetry service
    pub history_start: NaiveDate,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            code: "86510000".to_string(),
            name: "Taquari River at Muçum, RS".to_string(),
            latitude: -29.1672,
            longitude: -51.8686,
            history_start: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or(NaiveDate::MIN),
        }
    }
}

/// What to do with a record whose fields cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPolicy {
    /// Fail the whole parse on the first bad record.
    Abort,
    /// Skip bad records and keep going.
    #[default]
    Drop,
}

/// ANA telemetry SOAP service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub endpoint: String,
    pub operation: String,
    pub namespace: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub conversion_policy: ConversionPolicy,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://telemetriaws1.ana.gov.br/ServiceANA.asmx".to_string(),
            operation: "DadosHidrometeorologicos".to_string(),
            namespace: "http://MRCS/".to_string(),
            timeout_secs: 120,
            max_attempts: 3,
            backoff_ms: 2000,
            conversion_policy: ConversionPolicy::Drop,
        }
    }
}

impl TelemetryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Seasonal model and pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_days: i64,
    pub period_days: f64,
    pub fourier_order: usize,
    pub mode: SeasonalityMode,
    pub interval_width: f64,
    pub n_changepoints: usize,
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub min_history_days: i64,
    pub refinement_passes: usize,
    pub horizon_anchor: HorizonAnchor,
    /// Wall-clock budget for a whole run; 0 disables the deadline
    pub deadline_secs: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        let model = SeasonalConfig::default();
        let pipeline = PipelineConfig::default();
        Self {
            horizon_days: pipeline.horizon_days,
            period_days: model.period_days,
            fourier_order: model.fourier_order,
            mode: model.mode,
            interval_width: model.interval_width,
            n_changepoints: model.n_changepoints,
            changepoint_range: model.changepoint_range,
            changepoint_prior_scale: model.changepoint_prior_scale,
            min_history_days: model.min_history_days,
            refinement_passes: model.refinement_passes,
            horizon_anchor: pipeline.horizon_anchor,
            deadline_secs: 600,
        }
    }
}

impl ForecastConfig {
    pub fn seasonal_config(&self) -> SeasonalConfig {
        SeasonalConfig {
            period_days: self.period_days,
            fourier_order: self.fourier_order,
            mode: self.mode,
            interval_width: self.interval_width,
            n_changepoints: self.n_changepoints,
            changepoint_range: self.changepoint_range,
            changepoint_prior_scale: self.changepoint_prior_scale,
            min_history_days: self.min_history_days,
            refinement_passes: self.refinement_passes,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            horizon_days: self.horizon_days,
            horizon_anchor: self.horizon_anchor,
            deadline: (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs)),
            model: self.seasonal_config(),
        }
    }
}

/// Logging settings; `RUST_LOG` takes precedence over `level`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ServiceConfig {
    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let code = &self.station.code;
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!(
                "station code must be numeric, got '{}'",
                code
            )));
        }
        if self.telemetry.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("telemetry endpoint is empty".to_string()));
        }
        self.forecast
            .seasonal_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

/// Loads configuration from `path`.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ServiceConfig::from_toml_str(&contents)
}

/// Loads configuration the way the service binary does.
///
/// Reads `.env` if present, then the file named by `FLOCAST_CONFIG` (or
/// `explicit`, which wins). A missing default `station.toml` yields the
/// built-in defaults; a missing explicitly named file is an error.
/// `ANA_ENDPOINT` overrides the telemetry endpoint.
pub fn load_from_env(explicit: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    dotenv::dotenv().ok();

    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("FLOCAST_CONFIG").map(PathBuf::from));

    let mut config = match named {
        Some(path) => load_config(&path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)?
            } else {
                ServiceConfig::default()
            }
        }
    };

    if let Ok(endpoint) = std::env::var("ANA_ENDPOINT") {
        config.telemetry.endpoint = endpoint;
        config.validate()?;
    }

    Ok(config)
}
