/// Tabular export of a forecast run.
///
/// One CSV row per observation-with-forecast, history first then horizon.
/// `actual` is left blank for horizon days.

use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::ObservationWithForecast;

pub const CSV_COLUMNS: [&str; 9] = [
    "day",
    "actual",
    "trend",
    "seasonal",
    "regressor_effect",
    "yhat",
    "yhat_lower",
    "yhat_upper",
    "is_anomaly",
];

#[derive(Serialize)]
struct CsvRow {
    day: NaiveDate,
    actual: Option<f64>,
    trend: f64,
    seasonal: f64,
    regressor_effect: f64,
    yhat: f64,
    yhat_lower: f64,
    yhat_upper: f64,
    is_anomaly: bool,
}

impl From<&ObservationWithForecast> for CsvRow {
    fn from(o: &ObservationWithForecast) -> Self {
        Self {
            day: o.day,
            actual: o.actual,
            trend: o.forecast.trend,
            seasonal: o.forecast.seasonal,
            regressor_effect: o.forecast.regressor_effect,
            yhat: o.forecast.yhat,
            yhat_lower: o.forecast.yhat_lower,
            yhat_upper: o.forecast.yhat_upper,
            is_anomaly: o.is_anomaly,
        }
    }
}

/// Keeps observations on or after `start`. A display filter only; it never
/// changes what was fit.
pub fn filter_from(
    observations: &[ObservationWithForecast],
    start: Option<NaiveDate>,
) -> Vec<ObservationWithForecast> {
    match start {
        Some(start) => observations.iter().filter(|o| o.day >= start).copied().collect(),
        None => observations.to_vec(),
    }
}

/// Writes `observations` as CSV with a header row.
pub fn write_csv<W: Write>(
    writer: W,
    observations: &[ObservationWithForecast],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if observations.is_empty() {
        csv_writer.write_record(CSV_COLUMNS)?;
    }
    for observation in observations {
        csv_writer.serialize(CsvRow::from(observation))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Renders `observations` as a CSV string.
pub fn to_csv_string(observations: &[ObservationWithForecast]) -> Result<String, csv::Error> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, observations)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
