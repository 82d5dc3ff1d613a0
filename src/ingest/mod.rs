/// Telemetry acquisition.
///
/// `ana` talks to the ANA SOAP service and parses its responses, `retry`
/// wraps any `TelemetrySource` with backoff. Every data source sits behind
/// `TelemetrySource` so tests can feed canned payloads to the service.

pub mod ana;
pub mod retry;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::NaiveDate;

use crate::model::TelemetryError;

/// Something that can return the raw telemetry payload for a station and
/// an inclusive date range.
pub trait TelemetrySource {
    fn fetch(
        &self,
        station_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<String, TelemetryError>;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for &T {
    fn fetch(
        &self,
        station_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<String, TelemetryError> {
        (**self).fetch(station_code, start, end)
    }
}
