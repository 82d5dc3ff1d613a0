/// Forecast pipeline: two seasonal fits per run.
///
/// 1. Fit a rainfall-only model on the daily history.
/// 2. Forecast rainfall over the horizon.
/// 3. Fit a level model with historical rainfall as its regressor.
/// 4. Forecast level over history plus horizon, feeding historical rainfall
///    for history days and the rainfall forecast for horizon days.
/// 5. Join observed levels onto the forecast and flag anomalies.
///
/// Stages run strictly in order; an optional deadline is checked between
/// them. Any failure aborts the run with no partial output.

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::analysis::anomaly;
use crate::analysis::daily::split_series;
use crate::analysis::seasonal::{SeasonalConfig, SeasonalForecastModel};
use crate::model::{
    DailyRecord, ForecastPoint, ForecastRun, ObservationWithForecast, PipelineError,
};

// ---------------------------------------------------------------------------
// Horizon
// ---------------------------------------------------------------------------

/// Which day the forecast horizon is counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonAnchor {
    /// Start after the later of the last observation and today, so a stale
    /// history still yields a forecast for the days ahead of the caller.
    #[default]
    Today,
    /// Start the day after the last observation.
    LastObservation,
}

/// The `n` consecutive days the pipeline forecasts without ground truth.
///
/// Always starts strictly after `last_day`. Empty when `n <= 0`.
pub fn forecast_horizon(
    last_day: NaiveDate,
    today: NaiveDate,
    n: i64,
    anchor: HorizonAnchor,
) -> Vec<NaiveDate> {
    if n <= 0 {
        return Vec::new();
    }
    let base = match anchor {
        HorizonAnchor::Today => last_day.max(today),
        HorizonAnchor::LastObservation => last_day,
    };
    base.iter_days().skip(1).take(n as usize).collect()
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub horizon_days: i64,
    pub horizon_anchor: HorizonAnchor,
    /// Wall-clock budget for one run, checked between stages.
    pub deadline: Option<Duration>,
    /// Settings shared by the rainfall and level models.
    pub model: SeasonalConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon_days: 90,
            horizon_anchor: HorizonAnchor::Today,
            deadline: None,
            model: SeasonalConfig::default(),
        }
    }
}

pub struct ForecastPipeline {
    config: PipelineConfig,
}

/// Tracks the run's wall-clock budget.
struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn check(&self, stage: &'static str) -> Result<(), PipelineError> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Err(PipelineError::DeadlineExceeded { stage })
            }
            _ => Ok(()),
        }
    }
}

impl ForecastPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full fit/forecast/merge sequence over `history`.
    ///
    /// `today` only matters with `HorizonAnchor::Today`. The horizon length
    /// comes from the pipeline configuration.
    pub fn run(
        &self,
        history: &[DailyRecord],
        today: NaiveDate,
    ) -> Result<ForecastRun, PipelineError> {
        self.run_with_horizon(history, today, self.config.horizon_days)
    }

    /// Like `run`, with an explicit horizon length.
    pub fn run_with_horizon(
        &self,
        history: &[DailyRecord],
        today: NaiveDate,
        horizon_days: i64,
    ) -> Result<ForecastRun, PipelineError> {
        let deadline = Deadline::start(self.config.deadline);
        let model = SeasonalForecastModel::new(self.config.model.clone());
        let (levels, rainfall) = split_series(history);
        let rainfall_values: Vec<f64> = rainfall.iter().map(|&(_, r)| r).collect();

        info!(days = history.len(), horizon_days, "starting forecast run");

        deadline.check("rainfall fit")?;
        let rainfall_model = model
            .fit(&rainfall, None)
            .map_err(|source| PipelineError::Forecast { stage: "rainfall fit", source })?;

        let horizon = forecast_horizon(
            rainfall_model.last_day(),
            today,
            horizon_days,
            self.config.horizon_anchor,
        );

        deadline.check("rainfall forecast")?;
        let rainfall_forecast = rainfall_model
            .predict(&horizon, None)
            .map_err(|source| PipelineError::Forecast { stage: "rainfall forecast", source })?;

        deadline.check("level fit")?;
        let level_model = model
            .fit(&levels, Some(&rainfall_values))
            .map_err(|source| PipelineError::Forecast { stage: "level fit", source })?;
        let rainfall_coefficient = level_model.regressor_coefficient().unwrap_or(0.0);
        debug!(
            rainfall_coefficient,
            residual_std = level_model.residual_std(),
            "level model fitted"
        );

        let mut days: Vec<NaiveDate> = history.iter().map(|r| r.day).collect();
        days.extend(horizon.iter().copied());
        let regressor = level_regressor(&rainfall_values, &rainfall_forecast);

        deadline.check("level forecast")?;
        let level_forecast = level_model
            .predict(&days, Some(&regressor))
            .map_err(|source| PipelineError::Forecast { stage: "level forecast", source })?;

        let observations: Vec<ObservationWithForecast> = level_forecast
            .into_iter()
            .enumerate()
            .map(|(i, forecast)| ObservationWithForecast {
                day: forecast.day,
                actual: history.get(i).map(|r| r.level),
                forecast,
                is_anomaly: false,
            })
            .collect();
        let observations = anomaly::detect(observations);
        let anomaly_count = observations.iter().filter(|o| o.is_anomaly).count();

        info!(
            observations = observations.len(),
            horizon = horizon.len(),
            anomalies = anomaly_count,
            elapsed_ms = deadline.started.elapsed().as_millis() as u64,
            "forecast run complete"
        );

        Ok(ForecastRun {
            observations,
            horizon,
            rainfall_forecast,
            rainfall_coefficient,
            anomaly_count,
        })
    }
}

/// Regressor for the level forecast: observed rainfall on history days,
/// then forecast rainfall on horizon days. Rainfall cannot be negative even
/// where the seasonal fit dips below zero.
fn level_regressor(history: &[f64], forecast: &[ForecastPoint]) -> Vec<f64> {
    history
        .iter()
        .copied()
        .chain(forecast.iter().map(|p| p.yhat.max(0.0)))
        .collect()
}
