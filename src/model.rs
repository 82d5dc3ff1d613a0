//! Core data types for the river level forecasting service.
//!
//! This module defines the shared domain model imported by all other
//! modules: raw telemetry readings, the daily series built from them, the
//! forecast output, and the error taxonomy for each stage of a run.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single telemetry reading as reported by the ANA service.
///
/// Corresponds to one `DadosHidrometereologicos` record of a
/// `DadosHidrometeorologicos` SOAP response. Level and rainfall are always
/// finite and non-negative once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub station_id: String,
    pub timestamp: NaiveDateTime, // local station time, no timezone conversion
    pub level: f64,               // river level, station units (cm)
    pub rainfall: f64,            // rainfall since previous reading, mm
}

/// One calendar day of telemetry, collapsed from that day's readings.
///
/// `level` is the maximum level seen during the day and `rainfall` the total
/// rainfall. Produced by `analysis::daily::aggregate`, which guarantees one
/// record per day in ascending order. Days without readings are absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyRecord {
    pub day: NaiveDate,
    pub level: f64,
    pub rainfall: f64,
}

// ---------------------------------------------------------------------------
// Forecast types
// ---------------------------------------------------------------------------

/// Model output for a single day.
///
/// In multiplicative mode `seasonal` and `regressor_effect` are relative
/// factors applied to `trend`; in additive mode they are in target units.
/// `regressor_effect` is zero for models fit without a regressor.
///
/// Invariant: `yhat_lower <= yhat <= yhat_upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub day: NaiveDate,
    pub trend: f64,
    pub seasonal: f64,
    pub regressor_effect: f64,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// A forecast day joined with the observed level for that day, if any.
///
/// `actual` is `None` for horizon days. `is_anomaly` is set by
/// `analysis::anomaly::detect`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservationWithForecast {
    pub day: NaiveDate,
    pub actual: Option<f64>,
    pub forecast: ForecastPoint,
    pub is_anomaly: bool,
}

/// Everything a single pipeline run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastRun {
    /// History followed by horizon days, ascending.
    pub observations: Vec<ObservationWithForecast>,
    /// The future days forecast without ground truth.
    pub horizon: Vec<NaiveDate>,
    /// Rainfall forecast used as the level model's regressor on horizon days.
    pub rainfall_forecast: Vec<ForecastPoint>,
    /// Fitted coefficient of standardized rainfall in the level model.
    pub rainfall_coefficient: f64,
    pub anomaly_count: usize,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or parsing ANA telemetry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    /// DNS, connection, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-2xx HTTP response from the telemetry service.
    #[error("service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },
    /// Well-formed response carrying a SOAP fault instead of data.
    #[error("SOAP fault: {0}")]
    Fault(String),
    /// The response is not well-formed XML.
    #[error("parse error: {0}")]
    Parse(String),
    /// A record is missing one of its required fields.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A record field could not be converted to its typed value.
    #[error("record {record}: cannot convert {field} value '{value}'")]
    FieldConversion {
        record: usize,
        field: &'static str,
        value: String,
    },
}

impl TelemetryError {
    /// Whether a caller-side retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Transport(_) => true,
            TelemetryError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors raised while fitting or evaluating a seasonal model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// History spans fewer days than needed to identify yearly seasonality,
    /// or has no more observations than model parameters.
    #[error("insufficient history: {days} days available, {required} required")]
    InsufficientData { days: i64, required: i64 },
    /// A target or regressor value is NaN or infinite.
    #[error("non-finite {series} value at {day}")]
    NonFiniteInput { series: &'static str, day: NaiveDate },
    /// A day outside the fitted history was requested without a regressor value.
    #[error("no regressor value for {day}")]
    MissingRegressor { day: NaiveDate },
    #[error("regressor has {actual} values, expected {expected}")]
    RegressorLengthMismatch { expected: usize, actual: usize },
    /// A regressor was supplied to a model fit without one.
    #[error("model was fit without a regressor")]
    UnexpectedRegressor,
    #[error("history is not strictly ascending at {day}")]
    UnorderedHistory { day: NaiveDate },
    #[error("least squares solve failed for a {rows}x{columns} design")]
    SingularDesign { rows: usize, columns: usize },
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Errors that abort a full forecast run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("telemetry acquisition failed: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("{stage} failed: {source}")]
    Forecast {
        stage: &'static str,
        #[source]
        source: ForecastError,
    },
    #[error("deadline exceeded before {stage}")]
    DeadlineExceeded { stage: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_and_server_errors_are_retryable() {
        assert!(TelemetryError::Transport("timed out".to_string()).is_retryable());
        assert!(TelemetryError::Service { status: 503, body: String::new() }.is_retryable());
    }

    #[test]
    fn test_client_and_parse_errors_are_not_retryable() {
        assert!(!TelemetryError::Service { status: 400, body: String::new() }.is_retryable());
        assert!(!TelemetryError::Parse("bad".to_string()).is_retryable());
        assert!(!TelemetryError::Fault("bad station".to_string()).is_retryable());
    }

    #[test]
    fn test_pipeline_error_message_names_stage() {
        let err = PipelineError::Forecast {
            stage: "level fit",
            source: ForecastError::InsufficientData { days: 100, required: 730 },
        };
        let message = err.to_string();
        assert!(message.contains("level fit"), "got: {}", message);
        assert!(message.contains("100 days"), "got: {}", message);
    }
}
