/// HTTP endpoint for forecast queries
///
/// Serves the latest forecast for the configured station to charting tools
/// and scripts. Each request runs the pipeline (history is cached per day),
/// so responses are never older than the request.
///
/// Endpoints:
/// - GET /health - Service health check
/// - GET /forecast?horizon=N&start=YYYY-MM-DD - Forecast run as JSON
/// - GET /forecast.csv?horizon=N&start=YYYY-MM-DD - Same rows as CSV
/// - GET /anomalies?horizon=N&start=YYYY-MM-DD - Anomalous days only
///
/// `horizon` defaults to the configured horizon and must be 1-365. `start`
/// only filters the rows returned.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::cache::ResultCache;
use crate::export;
use crate::ingest::TelemetrySource;
use crate::model::{ForecastRun, ObservationWithForecast};
use crate::service::{ForecastService, History};

pub const MAX_HORIZON_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// JSON body for /forecast
#[derive(Debug, Serialize)]
pub struct ForecastResponse<'a> {
    pub station_code: &'a str,
    pub generated_for: NaiveDate,
    pub horizon_days: usize,
    pub horizon_start: Option<NaiveDate>,
    pub rainfall_coefficient: f64,
    pub anomaly_count: usize,
    pub observations: Vec<ObservationWithForecast>,
}

/// JSON body for /anomalies
#[derive(Debug, Serialize)]
pub struct AnomalyResponse<'a> {
    pub station_code: &'a str,
    pub generated_for: NaiveDate,
    pub anomalies: Vec<ObservationWithForecast>,
}

/// A rendered response, independent of the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ApiResponse {
    fn json(status: u16, value: serde_json::Value) -> Self {
        let body = serde_json::to_string_pretty(&value)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {}\"}}", e));
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "error": message.into() }))
    }
}

// ---------------------------------------------------------------------------
// Query Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastQuery {
    pub horizon_days: i64,
    pub start: Option<NaiveDate>,
}

/// Parses `horizon` and `start` from a query string. Unknown keys are
/// ignored.
pub fn parse_query(query: &str, default_horizon: i64) -> Result<ForecastQuery, String> {
    let mut parsed = ForecastQuery {
        horizon_days: default_horizon,
        start: None,
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(raw_value)
            .map_err(|e| format!("invalid encoding for '{}': {}", key, e))?;

        match key {
            "horizon" => {
                let horizon: i64 = value
                    .parse()
                    .map_err(|_| format!("horizon must be an integer, got '{}'", value))?;
                if !(1..=MAX_HORIZON_DAYS).contains(&horizon) {
                    return Err(format!(
                        "horizon must be between 1 and {}, got {}",
                        MAX_HORIZON_DAYS, horizon
                    ));
                }
                parsed.horizon_days = horizon;
            }
            "start" => {
                let start = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .map_err(|_| format!("start must be YYYY-MM-DD, got '{}'", value))?;
                parsed.start = Some(start);
            }
            _ => {}
        }
    }

    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Handles one request. `today` is the end of the history to fetch.
pub fn route<S, C>(
    service: &ForecastService<S, C>,
    method: &str,
    url: &str,
    today: NaiveDate,
) -> ApiResponse
where
    S: TelemetrySource,
    C: ResultCache<NaiveDate, History>,
{
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    if method != "GET" {
        return ApiResponse::error(405, format!("method {} not allowed", method));
    }

    match path {
        "/health" => handle_health(service),
        "/forecast" | "/forecast.csv" | "/anomalies" => {
            let query = match parse_query(query, service.default_horizon()) {
                Ok(query) => query,
                Err(message) => return ApiResponse::error(400, message),
            };
            let run = match service.run(today, query.horizon_days) {
                Ok(run) => run,
                Err(e) => {
                    warn!(path, error = %e, "forecast run failed");
                    return ApiResponse::error(502, e.to_string());
                }
            };
            match path {
                "/forecast" => handle_forecast(service.station_code(), today, &run, query),
                "/forecast.csv" => handle_forecast_csv(&run, query),
                _ => handle_anomalies(service.station_code(), today, &run, query),
            }
        }
        _ => ApiResponse::json(
            404,
            json!({
                "error": "Not found",
                "available_endpoints": ["/health", "/forecast", "/forecast.csv", "/anomalies"]
            }),
        ),
    }
}

fn handle_health<S, C>(service: &ForecastService<S, C>) -> ApiResponse
where
    S: TelemetrySource,
    C: ResultCache<NaiveDate, History>,
{
    ApiResponse::json(
        200,
        json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "station_code": service.station_code(),
        }),
    )
}

fn handle_forecast(
    station_code: &str,
    today: NaiveDate,
    run: &ForecastRun,
    query: ForecastQuery,
) -> ApiResponse {
    let response = ForecastResponse {
        station_code,
        generated_for: today,
        horizon_days: run.horizon.len(),
        horizon_start: run.horizon.first().copied(),
        rainfall_coefficient: run.rainfall_coefficient,
        anomaly_count: run.anomaly_count,
        observations: export::filter_from(&run.observations, query.start),
    };
    match serde_json::to_value(&response) {
        Ok(value) => ApiResponse::json(200, value),
        Err(e) => ApiResponse::error(500, format!("serialization failed: {}", e)),
    }
}

fn handle_forecast_csv(run: &ForecastRun, query: ForecastQuery) -> ApiResponse {
    let rows = export::filter_from(&run.observations, query.start);
    match export::to_csv_string(&rows) {
        Ok(body) => ApiResponse {
            status: 200,
            content_type: "text/csv",
            body,
        },
        Err(e) => ApiResponse::error(500, format!("csv export failed: {}", e)),
    }
}

fn handle_anomalies(
    station_code: &str,
    today: NaiveDate,
    run: &ForecastRun,
    query: ForecastQuery,
) -> ApiResponse {
    let anomalies = export::filter_from(&run.observations, query.start)
        .into_iter()
        .filter(|o| o.is_anomaly)
        .collect();
    let response = AnomalyResponse {
        station_code,
        generated_for: today,
        anomalies,
    };
    match serde_json::to_value(&response) {
        Ok(value) => ApiResponse::json(200, value),
        Err(e) => ApiResponse::error(500, format!("serialization failed: {}", e)),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks forever.
pub fn start_endpoint_server<S, C>(port: u16, service: &ForecastService<S, C>) -> Result<(), String>
where
    S: TelemetrySource,
    C: ResultCache<NaiveDate, History>,
{
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    println!("   GET /health - Service health check");
    println!("   GET /forecast?horizon=N&start=YYYY-MM-DD - Forecast as JSON");
    println!("   GET /forecast.csv?horizon=N&start=YYYY-MM-DD - Forecast as CSV");
    println!("   GET /anomalies?horizon=N&start=YYYY-MM-DD - Anomalous days\n");

    for request in server.incoming_requests() {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let today = Local::now().date_naive();

        let api = route(service, &method, &url, today);
        info!(%method, %url, status = api.status, "request handled");

        if let Err(e) = request.respond(to_http(api)) {
            error!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

fn to_http(api: ApiResponse) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let response = tiny_http::Response::from_data(api.body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(api.status));
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], api.content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
