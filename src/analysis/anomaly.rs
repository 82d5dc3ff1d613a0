//! Anomaly flagging.
//!
//! A day is anomalous when its observed level is strictly above the
//! forecast's upper bound. There is no minimum duration and no rainfall
//! check: the flag is an early-warning marker for charts, and false
//! positives are expected.

use chrono::NaiveDate;

use crate::model::{ForecastPoint, ObservationWithForecast};

/// The single-sided threshold rule.
pub fn is_anomaly(actual: Option<f64>, forecast: &ForecastPoint) -> bool {
    matches!(actual, Some(value) if value > forecast.yhat_upper)
}

/// Sets `is_anomaly` on every observation.
pub fn detect(mut observations: Vec<ObservationWithForecast>) -> Vec<ObservationWithForecast> {
    for observation in &mut observations {
        observation.is_anomaly = is_anomaly(observation.actual, &observation.forecast);
    }
    observations
}

/// Days flagged anomalous, in input order.
pub fn anomaly_days(observations: &[ObservationWithForecast]) -> Vec<NaiveDate> {
    observations
        .iter()
        .filter(|o| o.is_anomaly)
        .map(|o| o.day)
        .collect()
}
