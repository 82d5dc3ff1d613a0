/// flocast_service: river level forecasting from ANA telemetry.
///
/// # Module structure
///
/// ```text
/// flocast_service
/// ├── model       - shared data types (Reading, DailyRecord, ForecastPoint, errors, …)
/// ├── config      - service configuration loader (station.toml)
/// ├── logging     - tracing subscriber setup
/// ├── ingest
/// │   ├── ana     - ANA SOAP service: envelope construction, HTTP client, XML parsing
/// │   ├── retry   - exponential backoff around any TelemetrySource
/// │   └── fixtures (test only) - representative SOAP response payloads
/// ├── analysis
/// │   ├── daily   - collapses readings into one record per day
/// │   ├── seasonal - trend + Fourier seasonality + regressor model
/// │   └── anomaly - flags observations above the forecast upper bound
/// ├── pipeline    - rainfall fit → level fit → merge, horizon construction
/// ├── cache       - single-entry history cache keyed by end date
/// ├── service     - acquisition + pipeline for the configured station
/// ├── export      - CSV rendering of a forecast run
/// └── endpoint    - HTTP API for forecasts and anomalies
/// ```

/// Public modules
pub mod analysis;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod service;
