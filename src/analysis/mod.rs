/// Data analysis for the river level forecasting service.
///
/// Submodules:
/// - `daily`    - collapses raw readings into one record per calendar day.
/// - `seasonal` - trend + yearly Fourier seasonality + regressor model.
/// - `anomaly`  - flags days whose level exceeds the forecast upper bound.

pub mod anomaly;
pub mod daily;
pub mod seasonal;
