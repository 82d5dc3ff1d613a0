/// Integration tests for the full forecast run
///
/// These tests verify:
/// 1. Three years of synthetic telemetry run through fetch → parse →
///    aggregate → two fits → merge → anomaly flagging
/// 2. A single 10x level spike is flagged and its neighbours are not
/// 3. The horizon follows the last observation with exact length
/// 4. CSV export covers history plus horizon
///
/// Telemetry is generated in-process; no network access is needed.
///
/// Run with: cargo test --test forecast_pipeline --release

use std::f64::consts::PI;

use chrono::{Duration, NaiveDate};

use flocast_service::analysis::anomaly::anomaly_days;
use flocast_service::cache::SingleEntryCache;
use flocast_service::config::ServiceConfig;
use flocast_service::export;
use flocast_service::ingest::TelemetrySource;
use flocast_service::model::{PipelineError, TelemetryError};
use flocast_service::service::ForecastService;

const DAYS: usize = 1096;
const SPIKE_DAY: usize = 700;

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
}

fn level(i: usize) -> f64 {
    let phase = 2.0 * PI * i as f64 / 365.25;
    let wobble = ((i * 7919 + 13) % 101) as f64 / 100.0 - 0.5;
    let base = 250.0 + 60.0 * phase.sin() + wobble;
    if i == SPIKE_DAY { base * 10.0 } else { base }
}

fn rainfall(i: usize) -> f64 {
    let phase = 2.0 * PI * i as f64 / 365.25;
    4.0 + 2.0 * phase.cos() + ((i * 31) % 7) as f64 * 0.1
}

/// Two readings per day: the level peaks at noon, rainfall splits evenly.
fn synthetic_response(days: usize) -> String {
    let mut records = String::new();
    for i in 0..days {
        let day = first_day() + Duration::days(i as i64);
        for (hour, fraction) in [(0, 0.9), (12, 1.0)] {
            records.push_str(&format!(
                "<DadosHidrometereologicos>\
                   <CodEstacao>86510000</CodEstacao>\
                   <DataHora>{} {:02}:00:00</DataHora>\
                   <Nivel>{:.3}</Nivel>\
                   <Chuva>{:.3}</Chuva>\
                 </DadosHidrometereologicos>",
                day.format("%Y-%m-%d"),
                hour,
                level(i) * fraction,
                rainfall(i) / 2.0
            ));
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <DadosHidrometeorologicosResponse xmlns="http://MRCS/">
      <DadosHidrometeorologicosResult>
        <DocumentElement xmlns="">{}</DocumentElement>
      </DadosHidrometeorologicosResult>
    </DadosHidrometeorologicosResponse>
  </soap:Body>
</soap:Envelope>"#,
        records
    )
}

struct SyntheticStation {
    body: String,
}

impl TelemetrySource for SyntheticStation {
    fn fetch(&self, station: &str, _: NaiveDate, _: NaiveDate) -> Result<String, TelemetryError> {
        assert_eq!(station, "86510000");
        Ok(self.body.clone())
    }
}

fn config_with_horizon(horizon_days: i64) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.forecast.horizon_days = horizon_days;
    config.forecast.deadline_secs = 0;
    config
}

#[test]
fn test_three_year_synthetic_run() {
    let source = SyntheticStation {
        body: synthetic_response(DAYS),
    };
    let config = config_with_horizon(60);
    let service = ForecastService::new(&config, source, SingleEntryCache::new());

    let last_day = first_day() + Duration::days(DAYS as i64 - 1);
    let run = service.run(last_day, 60).expect("run should succeed");

    // History plus horizon, horizon immediately after the last observation.
    assert_eq!(run.observations.len(), DAYS + 60);
    assert_eq!(run.horizon.len(), 60);
    assert_eq!(run.horizon[0], last_day + Duration::days(1));
    assert_eq!(*run.horizon.last().unwrap(), last_day + Duration::days(60));

    // Spike flagged, neighbours not.
    let spike_date = first_day() + Duration::days(SPIKE_DAY as i64);
    let flagged = anomaly_days(&run.observations);
    assert!(flagged.contains(&spike_date), "spike not flagged; flagged: {:?}", flagged);
    for offset in [1i64, 2, 3] {
        assert!(!flagged.contains(&(spike_date - Duration::days(offset))));
        assert!(!flagged.contains(&(spike_date + Duration::days(offset))));
    }

    // Interval invariant everywhere.
    for obs in &run.observations {
        let f = obs.forecast;
        assert!(f.yhat_lower <= f.yhat && f.yhat <= f.yhat_upper, "{:?}", f);
    }

    // Horizon tracks the seasonal cycle.
    for (offset, obs) in run.observations[DAYS..].iter().enumerate() {
        let expected = level(DAYS + offset);
        assert!(
            (obs.forecast.yhat - expected).abs() < 40.0,
            "{}: forecast {:.1} vs expected {:.1}",
            obs.day,
            obs.forecast.yhat,
            expected
        );
    }

    // CSV covers every row plus a header.
    let csv = export::to_csv_string(&run.observations).unwrap();
    assert_eq!(csv.lines().count(), DAYS + 60 + 1);
    let last_line = csv.lines().last().unwrap();
    assert!(last_line.starts_with(&format!("{},,", last_day + Duration::days(60))));
}

#[test]
fn test_short_history_is_rejected() {
    let source = SyntheticStation {
        body: synthetic_response(729),
    };
    let service = ForecastService::new(&config_with_horizon(30), source, SingleEntryCache::new());
    let today = first_day() + Duration::days(728);

    let result = service.run(today, 30);
    assert!(
        matches!(result, Err(PipelineError::Forecast { stage: "rainfall fit", .. })),
        "got {:?}",
        result
    );
}
