//! Seasonal regression forecasting model.
//!
//! Fits a decomposable model to a daily series:
//!
//! ```text
//! multiplicative:  y(t) = trend(t) * (1 + seasonal(t) + beta * x(t))
//! additive:        y(t) = trend(t) + seasonal(t) + beta * x(t)
//! ```
//!
//! - `trend` is piecewise linear with potential changepoints spread over the
//!   first part of the history. Changepoint deltas carry a Gaussian prior,
//!   applied as ridge rows in the least squares system.
//! - `seasonal` is a Fourier sum with a fixed period (one year by default).
//! - `x` is an optional exogenous regressor, standardized on the history.
//!
//! Multiplicative fits alternate between the seasonal block (rows weighted by
//! the current trend) and the trend block (rows weighted by the current
//! multiplier), starting from an additive fit with a straight-line trend.
//!
//! Prediction intervals combine the residual standard error with the variance
//! of future trend changes, which is zero in-sample and grows with the cube
//! of the distance past the end of the history.

use anofox_regression::prelude::*;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::ops::Range;
use tracing::debug;

use crate::model::{ForecastError, ForecastPoint};

/// `NaiveDate::num_days_from_ce` of 1970-01-01. Fourier terms are phased on
/// days since the Unix epoch so they do not depend on where history starts.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Prior scale for Fourier and regressor coefficients.
const SEASONALITY_PRIOR_SCALE: f64 = 10.0;

/// Ridge weight used before any residual scale is known.
const PRELIMINARY_RIDGE: f64 = 1e-8;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    Additive,
    #[default]
    Multiplicative,
}

/// Model hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalConfig {
    /// Seasonal period in days.
    pub period_days: f64,
    /// Number of sine/cosine pairs in the seasonal Fourier sum.
    pub fourier_order: usize,
    pub mode: SeasonalityMode,
    /// Coverage of the prediction interval, in (0, 1).
    pub interval_width: f64,
    /// Maximum number of potential trend changepoints.
    pub n_changepoints: usize,
    /// Fraction of the history (by observation count) eligible for changepoints.
    pub changepoint_range: f64,
    /// Prior scale of changepoint deltas; smaller values give a stiffer trend.
    pub changepoint_prior_scale: f64,
    /// Minimum span of history, in days, accepted by `fit`.
    pub min_history_days: i64,
    /// Alternating passes for multiplicative fits.
    pub refinement_passes: usize,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            period_days: 365.25,
            fourier_order: 8,
            mode: SeasonalityMode::Multiplicative,
            interval_width: 0.8,
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            // Two full yearly cycles; fewer leaves the Fourier terms unidentified.
            min_history_days: 730,
            refinement_passes: 4,
        }
    }
}

impl SeasonalConfig {
    pub fn validate(&self) -> Result<(), ForecastError> {
        let invalid = |msg: String| Err(ForecastError::InvalidConfig(msg));
        if !(self.period_days.is_finite() && self.period_days > 0.0) {
            return invalid(format!("period_days must be positive, got {}", self.period_days));
        }
        if self.fourier_order == 0 {
            return invalid("fourier_order must be at least 1".to_string());
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return invalid(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            ));
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return invalid(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            ));
        }
        if !(self.changepoint_prior_scale.is_finite() && self.changepoint_prior_scale > 0.0) {
            return invalid(format!(
                "changepoint_prior_scale must be positive, got {}",
                self.changepoint_prior_scale
            ));
        }
        if self.min_history_days < 2 {
            return invalid(format!(
                "min_history_days must be at least 2, got {}",
                self.min_history_days
            ));
        }
        Ok(())
    }

    fn seasonal_columns(&self) -> usize {
        2 * self.fourier_order
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Unfitted model: holds the configuration and produces `FittedModel`s.
#[derive(Debug, Clone, Default)]
pub struct SeasonalForecastModel {
    config: SeasonalConfig,
}

impl SeasonalForecastModel {
    pub fn new(config: SeasonalConfig) -> Self {
        Self { config }
    }

    /// Fits the model to `history`, a strictly ascending series of
    /// `(day, value)` pairs, optionally with a regressor aligned by index.
    ///
    /// # Errors
    /// - `InsufficientData` - history spans fewer than `min_history_days`
    ///   days, or has no more observations than model parameters.
    /// - `NonFiniteInput` - NaN or infinite target or regressor value.
    /// - `RegressorLengthMismatch`, `UnorderedHistory`, `SingularDesign`,
    ///   `InvalidConfig`.
    pub fn fit(
        &self,
        history: &[(NaiveDate, f64)],
        regressor: Option<&[f64]>,
    ) -> Result<FittedModel, ForecastError> {
        let config = &self.config;
        config.validate()?;

        let (first_day, last_day) = match (history.first(), history.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => {
                return Err(ForecastError::InsufficientData {
                    days: 0,
                    required: config.min_history_days,
                });
            }
        };

        let span_days = (last_day - first_day).num_days() + 1;
        if span_days < config.min_history_days {
            return Err(ForecastError::InsufficientData {
                days: span_days,
                required: config.min_history_days,
            });
        }

        for pair in history.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(ForecastError::UnorderedHistory { day: pair[1].0 });
            }
        }

        for &(day, value) in history {
            if !value.is_finite() {
                return Err(ForecastError::NonFiniteInput { series: "target", day });
            }
        }

        if let Some(values) = regressor {
            if values.len() != history.len() {
                return Err(ForecastError::RegressorLengthMismatch {
                    expected: history.len(),
                    actual: values.len(),
                });
            }
            for (value, &(day, _)) in values.iter().zip(history) {
                if !value.is_finite() {
                    return Err(ForecastError::NonFiniteInput { series: "regressor", day });
                }
            }
        }

        let n = history.len();
        let span = (last_day - first_day).num_days() as f64;
        let time_index = |day: NaiveDate| (day - first_day).num_days() as f64 / span;

        let y_scale = history.iter().map(|(_, y)| y.abs()).fold(0.0, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let ts: Vec<f64> = history.iter().map(|&(day, _)| time_index(day)).collect();
        let ys: Vec<f64> = history.iter().map(|&(_, y)| y / y_scale).collect();

        let standardizer = regressor.map(Standardizer::from_values);
        let season_rows: Vec<Vec<f64>> = history
            .iter()
            .enumerate()
            .map(|(i, &(day, _))| {
                let z = match (regressor, &standardizer) {
                    (Some(values), Some(s)) => Some(s.apply(values[i])),
                    _ => None,
                };
                season_row(config, day, z)
            })
            .collect();

        let changepoints = changepoint_locations(&ts, config.n_changepoints, config.changepoint_range);
        let trend_columns = 2 + changepoints.len();
        let season_columns = season_rows.first().map_or(0, Vec::len);
        let parameters = trend_columns + season_columns;
        if n <= parameters {
            return Err(ForecastError::InsufficientData {
                days: n as i64,
                required: parameters as i64 + 1,
            });
        }

        let trend_rows: Vec<Vec<f64>> = ts.iter().map(|&t| trend_row(t, &changepoints)).collect();

        // Preliminary additive fit with a straight-line trend sets the
        // residual scale the priors are measured against.
        let preliminary = {
            let mut rows: Vec<Vec<f64>> = (0..n)
                .map(|i| {
                    let mut row = vec![1.0, ts[i]];
                    row.extend_from_slice(&season_rows[i]);
                    row
                })
                .collect();
            let mut target = ys.clone();
            push_ridge_rows(&mut rows, &mut target, 2..2 + season_columns, PRELIMINARY_RIDGE);
            solve_least_squares(&rows, &target)?
        };
        let preliminary_fitted: Vec<f64> = (0..n)
            .map(|i| {
                preliminary[0]
                    + preliminary[1] * ts[i]
                    + dot(&season_rows[i], &preliminary[2..])
            })
            .collect();
        let sigma0 = residual_scale(&ys, &preliminary_fitted, 2 + season_columns);

        let changepoint_ridge = (sigma0 / config.changepoint_prior_scale).powi(2).max(PRELIMINARY_RIDGE);
        let season_ridge = (sigma0 / SEASONALITY_PRIOR_SCALE).powi(2).max(PRELIMINARY_RIDGE);
        let delta_columns = 2..trend_columns;

        let (trend_coefs, season_coefs) = match config.mode {
            SeasonalityMode::Additive => {
                let mut rows: Vec<Vec<f64>> = (0..n)
                    .map(|i| {
                        let mut row = trend_rows[i].clone();
                        row.extend_from_slice(&season_rows[i]);
                        row
                    })
                    .collect();
                let mut target = ys.clone();
                push_ridge_rows(&mut rows, &mut target, delta_columns, changepoint_ridge);
                push_ridge_rows(
                    &mut rows,
                    &mut target,
                    trend_columns..parameters,
                    season_ridge,
                );
                let coefs = solve_least_squares(&rows, &target)?;
                let (trend, season) = coefs.split_at(trend_columns);
                (trend.to_vec(), season.to_vec())
            }
            SeasonalityMode::Multiplicative => {
                let mut trend_coefs = vec![0.0; trend_columns];
                trend_coefs[0] = preliminary[0];
                trend_coefs[1] = preliminary[1];
                let mut season_coefs = vec![0.0; season_columns];

                for pass in 0..config.refinement_passes.max(1) {
                    // Seasonal block given the current trend.
                    let trend: Vec<f64> = trend_rows.iter().map(|row| dot(row, &trend_coefs)).collect();
                    let mut rows: Vec<Vec<f64>> = (0..n)
                        .map(|i| season_rows[i].iter().map(|x| x * trend[i]).collect())
                        .collect();
                    let mut target: Vec<f64> = (0..n).map(|i| ys[i] - trend[i]).collect();
                    push_ridge_rows(&mut rows, &mut target, 0..season_columns, season_ridge);
                    season_coefs = solve_least_squares(&rows, &target)?;

                    // Trend block given the current multiplier.
                    let multiplier: Vec<f64> = season_rows
                        .iter()
                        .map(|row| 1.0 + dot(row, &season_coefs))
                        .collect();
                    let mut rows: Vec<Vec<f64>> = (0..n)
                        .map(|i| trend_rows[i].iter().map(|x| x * multiplier[i]).collect())
                        .collect();
                    let mut target = ys.clone();
                    push_ridge_rows(&mut rows, &mut target, delta_columns.clone(), changepoint_ridge);
                    trend_coefs = solve_least_squares(&rows, &target)?;

                    debug!(pass, "multiplicative refinement pass complete");
                }
                (trend_coefs, season_coefs)
            }
        };

        let fitted: Vec<f64> = (0..n)
            .map(|i| {
                let trend = dot(&trend_rows[i], &trend_coefs);
                let season = dot(&season_rows[i], &season_coefs);
                match config.mode {
                    SeasonalityMode::Additive => trend + season,
                    SeasonalityMode::Multiplicative => trend * (1.0 + season),
                }
            })
            .collect();
        let sigma = residual_scale(&ys, &fitted, parameters);

        let deltas = &trend_coefs[2..];
        let delta_scale = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64 + 1e-8
        };

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::InvalidConfig(format!("normal distribution: {}", e)))?;
        let z = normal.inverse_cdf(0.5 + config.interval_width / 2.0);

        let regressor_fit = match (regressor, standardizer) {
            (Some(values), Some(standardizer)) => Some(RegressorFit {
                standardizer,
                history: history.iter().map(|&(day, _)| day).zip(values.iter().copied()).collect(),
            }),
            _ => None,
        };

        debug!(
            observations = n,
            span_days,
            changepoints = changepoints.len(),
            sigma = sigma * y_scale,
            "seasonal model fitted"
        );

        Ok(FittedModel {
            config: config.clone(),
            first_day,
            last_day,
            span,
            y_scale,
            changepoints,
            trend_coefs,
            season_coefs,
            regressor: regressor_fit,
            sigma,
            delta_scale,
            z,
            observations: n,
        })
    }
}

// ---------------------------------------------------------------------------
// Fitted model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Standardizer {
    mean: f64,
    std: f64,
}

impl Standardizer {
    fn from_values(values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
        let std = variance.sqrt();
        Self {
            mean,
            std: if std > 1e-12 { std } else { 1.0 },
        }
    }

    fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

#[derive(Debug, Clone)]
struct RegressorFit {
    standardizer: Standardizer,
    /// Raw regressor values seen during fitting, used when `predict` is
    /// called for history days without explicit values.
    history: BTreeMap<NaiveDate, f64>,
}

/// A fitted seasonal model, able to produce forecasts for any day.
#[derive(Debug, Clone)]
pub struct FittedModel {
    config: SeasonalConfig,
    first_day: NaiveDate,
    last_day: NaiveDate,
    span: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    trend_coefs: Vec<f64>,
    season_coefs: Vec<f64>,
    regressor: Option<RegressorFit>,
    /// Residual standard error, in scaled units.
    sigma: f64,
    /// Mean absolute changepoint delta, drives future trend uncertainty.
    delta_scale: f64,
    z: f64,
    observations: usize,
}

impl FittedModel {
    pub fn last_day(&self) -> NaiveDate {
        self.last_day
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    pub fn has_regressor(&self) -> bool {
        self.regressor.is_some()
    }

    /// Residual standard error in target units.
    pub fn residual_std(&self) -> f64 {
        self.sigma * self.y_scale
    }

    /// Coefficient of the standardized regressor: a relative factor in
    /// multiplicative mode, target units in additive mode.
    pub fn regressor_coefficient(&self) -> Option<f64> {
        self.regressor.as_ref()?;
        let coef = *self.season_coefs.get(self.config.seasonal_columns())?;
        Some(match self.config.mode {
            SeasonalityMode::Multiplicative => coef,
            SeasonalityMode::Additive => coef * self.y_scale,
        })
    }

    /// Forecasts each of `days`.
    ///
    /// For a model fit with a regressor, `regressor` may hold one value per
    /// day. When it is `None`, days inside the fitted history reuse the
    /// historical values and any other day fails with `MissingRegressor`.
    pub fn predict(
        &self,
        days: &[NaiveDate],
        regressor: Option<&[f64]>,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        if let Some(values) = regressor {
            if self.regressor.is_none() {
                return Err(ForecastError::UnexpectedRegressor);
            }
            if values.len() != days.len() {
                return Err(ForecastError::RegressorLengthMismatch {
                    expected: days.len(),
                    actual: values.len(),
                });
            }
        }

        days.iter()
            .enumerate()
            .map(|(i, &day)| {
                let z = match &self.regressor {
                    None => None,
                    Some(fit) => {
                        let raw = match regressor {
                            Some(values) => values[i],
                            None => *fit
                                .history
                                .get(&day)
                                .ok_or(ForecastError::MissingRegressor { day })?,
                        };
                        if !raw.is_finite() {
                            return Err(ForecastError::NonFiniteInput { series: "regressor", day });
                        }
                        Some(fit.standardizer.apply(raw))
                    }
                };
                Ok(self.point(day, z))
            })
            .collect()
    }

    fn point(&self, day: NaiveDate, z: Option<f64>) -> ForecastPoint {
        let t = (day - self.first_day).num_days() as f64 / self.span;
        let trend = dot(&trend_row(t, &self.changepoints), &self.trend_coefs);

        let fourier = fourier_terms(day, self.config.period_days, self.config.fourier_order);
        let seasonal = dot(&fourier, &self.season_coefs);
        let regressor_effect = match (z, self.season_coefs.get(fourier.len())) {
            (Some(z), Some(coef)) => z * coef,
            _ => 0.0,
        };

        let (yhat, trend, seasonal, regressor_effect) = match self.config.mode {
            SeasonalityMode::Multiplicative => (
                trend * (1.0 + seasonal + regressor_effect) * self.y_scale,
                trend * self.y_scale,
                seasonal,
                regressor_effect,
            ),
            SeasonalityMode::Additive => (
                (trend + seasonal + regressor_effect) * self.y_scale,
                trend * self.y_scale,
                seasonal * self.y_scale,
                regressor_effect * self.y_scale,
            ),
        };

        let half_width = self.z * self.y_scale * (self.sigma.powi(2) + self.trend_variance(t)).sqrt();

        ForecastPoint {
            day,
            trend,
            seasonal,
            regressor_effect,
            yhat,
            yhat_lower: yhat - half_width,
            yhat_upper: yhat + half_width,
        }
    }

    /// Variance of the trend at scaled time `t` from changepoints that may
    /// occur after the history ends, at the historical rate and with the
    /// historical mean magnitude.
    fn trend_variance(&self, t: f64) -> f64 {
        if t <= 1.0 || self.changepoints.is_empty() {
            return 0.0;
        }
        let rate = self.changepoints.len() as f64;
        let ahead = t - 1.0;
        2.0 * rate * self.delta_scale.powi(2) * ahead.powi(3) / 3.0
    }
}

// ---------------------------------------------------------------------------
// Design matrix helpers
// ---------------------------------------------------------------------------

/// Sine/cosine pairs for harmonics 1..=order.
fn fourier_terms(day: NaiveDate, period: f64, order: usize) -> Vec<f64> {
    let epoch_days = f64::from(day.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE);
    (1..=order)
        .flat_map(|harmonic| {
            let angle = 2.0 * PI * harmonic as f64 * epoch_days / period;
            [angle.sin(), angle.cos()]
        })
        .collect()
}

/// Fourier terms followed by the standardized regressor, if any.
fn season_row(config: &SeasonalConfig, day: NaiveDate, z: Option<f64>) -> Vec<f64> {
    let mut row = fourier_terms(day, config.period_days, config.fourier_order);
    row.extend(z);
    row
}

/// `[1, t, (t - s_1)+, ..., (t - s_k)+]`
fn trend_row(t: f64, changepoints: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len());
    row.push(1.0);
    row.push(t);
    row.extend(changepoints.iter().map(|&s| (t - s).max(0.0)));
    row
}

/// Evenly spaced changepoints over the first `range` fraction of the
/// observations, excluding the first observation.
fn changepoint_locations(ts: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    let eligible = (ts.len() as f64 * range).floor() as usize;
    let count = n_changepoints.min(eligible.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    (1..=count)
        .map(|i| {
            let index = ((i * (eligible - 1)) as f64 / count as f64).round() as usize;
            ts[index]
        })
        .collect()
}

/// Appends one penalty row per column in `columns`, pulling that coefficient
/// toward zero with weight `ridge`.
fn push_ridge_rows(rows: &mut Vec<Vec<f64>>, target: &mut Vec<f64>, columns: Range<usize>, ridge: f64) {
    let width = rows.first().map_or(0, Vec::len);
    let weight = ridge.sqrt();
    for column in columns {
        let mut row = vec![0.0; width];
        row[column] = weight;
        rows.push(row);
        target.push(0.0);
    }
}

fn solve_least_squares(rows: &[Vec<f64>], target: &[f64]) -> Result<Vec<f64>, ForecastError> {
    let n = rows.len();
    let k = rows.first().map_or(0, Vec::len);
    if n == 0 || k == 0 {
        return Err(ForecastError::SingularDesign { rows: n, columns: k });
    }

    let x_mat = faer::Mat::from_fn(n, k, |i, j| rows[i][j]);
    let y_col = faer::Col::from_fn(n, |i| target[i]);

    let fitted = OlsRegressor::builder()
        .with_intercept(false)
        .build()
        .fit(&x_mat, &y_col)
        .map_err(|_| ForecastError::SingularDesign { rows: n, columns: k })?;

    // Aliased columns come back non-finite; they contribute nothing.
    let coefficients = fitted.coefficients();
    Ok((0..coefficients.nrows())
        .map(|j| {
            let c = coefficients[j];
            if c.is_finite() { c } else { 0.0 }
        })
        .collect())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn residual_scale(actual: &[f64], fitted: &[f64], parameters: usize) -> f64 {
    let rss: f64 = actual.iter().zip(fitted).map(|(a, f)| (a - f).powi(2)).sum();
    let dof = actual.len().saturating_sub(parameters).max(1) as f64;
    (rss / dof).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
