//! End-to-end forecast service.
//!
//! Wires acquisition (with retry), parsing, daily aggregation and the
//! forecast pipeline together for the configured station. The aggregated
//! history is cached by end date so repeated requests on the same day do
//! not hit the telemetry service again.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::analysis::daily::{aggregate, missing_days};
use crate::cache::ResultCache;
use crate::config::{ConversionPolicy, ServiceConfig};
use crate::ingest::ana::parse_response;
use crate::ingest::retry::{fetch_with_retry, RetryPolicy};
use crate::ingest::TelemetrySource;
use crate::model::{DailyRecord, ForecastRun, PipelineError};
use crate::pipeline::ForecastPipeline;

/// Daily history shared between the cache and callers.
pub type History = Arc<Vec<DailyRecord>>;

pub struct ForecastService<S, C> {
    source: S,
    cache: C,
    station_code: String,
    history_start: NaiveDate,
    retry: RetryPolicy,
    conversion_policy: ConversionPolicy,
    pipeline: ForecastPipeline,
}

impl<S, C> ForecastService<S, C>
where
    S: TelemetrySource,
    C: ResultCache<NaiveDate, History>,
{
    pub fn new(config: &ServiceConfig, source: S, cache: C) -> Self {
        Self {
            source,
            cache,
            station_code: config.station.code.clone(),
            history_start: config.station.history_start,
            retry: config.telemetry.retry_policy(),
            conversion_policy: config.telemetry.conversion_policy,
            pipeline: ForecastPipeline::new(config.forecast.pipeline_config()),
        }
    }

    pub fn station_code(&self) -> &str {
        &self.station_code
    }

    pub fn default_horizon(&self) -> i64 {
        self.pipeline.config().horizon_days
    }

    /// Fetches, parses and aggregates telemetry from the configured start
    /// date through `end`, or returns the cached result for `end`.
    pub fn load_history(&self, end: NaiveDate) -> Result<History, PipelineError> {
        self.cache.get_or_compute(end, || {
            let raw = fetch_with_retry(
                &self.source,
                &self.station_code,
                self.history_start,
                end,
                &self.retry,
            )?;
            let readings = parse_response(&raw, self.conversion_policy)?;
            let daily = aggregate(&readings);

            info!(
                station = %self.station_code,
                readings = readings.len(),
                days = daily.len(),
                missing_days = missing_days(&daily),
                %end,
                "telemetry history loaded"
            );
            Ok(Arc::new(daily))
        })
    }

    /// Loads history through `today` and runs the pipeline over it.
    pub fn run(&self, today: NaiveDate, horizon_days: i64) -> Result<ForecastRun, PipelineError> {
        let history = self.load_history(today)?;
        self.pipeline.run_with_horizon(&history, today, horizon_days)
    }

    /// Drops the cached history, forcing the next run to refetch.
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{NoCache, SingleEntryCache};
    use crate::ingest::fixtures::{fixture_mucum_xml, fixture_soap_fault_xml};
    use crate::model::TelemetryError;
    use std::cell::Cell;

    struct CannedSource {
        body: Result<String, TelemetryError>,
        calls: Cell<u32>,
    }

    impl CannedSource {
        fn new(body: Result<&str, TelemetryError>) -> Self {
            Self {
                body: body.map(str::to_string),
                calls: Cell::new(0),
            }
        }
    }

    impl TelemetrySource for CannedSource {
        fn fetch(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<String, TelemetryError> {
            self.calls.set(self.calls.get() + 1);
            self.body.clone()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 9, 6).unwrap()
    }

    #[test]
    fn test_load_history_aggregates_fixture() {
        let source = CannedSource::new(Ok(fixture_mucum_xml()));
        let service = ForecastService::new(&ServiceConfig::default(), &source, NoCache);

        let history = service.load_history(today()).expect("history should load");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].day, NaiveDate::from_ymd_opt(2023, 9, 4).unwrap());
        assert_eq!(history[0].level, 2580.0);
        assert!((history[0].rainfall - 36.4).abs() < 1e-9);
        assert_eq!(history[1].level, 1910.0);
        assert!((history[1].rainfall - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_cached_per_end_date() {
        let source = CannedSource::new(Ok(fixture_mucum_xml()));
        let service =
            ForecastService::new(&ServiceConfig::default(), &source, SingleEntryCache::new());

        service.load_history(today()).unwrap();
        service.load_history(today()).unwrap();
        assert_eq!(source.calls.get(), 1);

        service.load_history(today().succ_opt().unwrap()).unwrap();
        assert_eq!(source.calls.get(), 2);

        service.invalidate();
        service.load_history(today().succ_opt().unwrap()).unwrap();
        assert_eq!(source.calls.get(), 3);
    }

    #[test]
    fn test_fault_aborts_run() {
        let source = CannedSource::new(Ok(fixture_soap_fault_xml()));
        let service =
            ForecastService::new(&ServiceConfig::default(), &source, SingleEntryCache::new());

        let result = service.run(today(), 30);
        assert!(
            matches!(result, Err(PipelineError::Telemetry(TelemetryError::Fault(_)))),
            "got {:?}",
            result
        );
    }

    #[test]
    fn test_two_days_of_history_is_insufficient() {
        let source = CannedSource::new(Ok(fixture_mucum_xml()));
        let service = ForecastService::new(&ServiceConfig::default(), &source, NoCache);

        let result = service.run(today(), 30);
        assert!(
            matches!(result, Err(PipelineError::Forecast { stage: "rainfall fit", .. })),
            "got {:?}",
            result
        );
    }
}
