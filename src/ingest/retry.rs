/// Caller-side retry around any `TelemetrySource`.
///
/// Only failures that `TelemetryError::is_retryable` accepts (transport
/// errors and 5xx responses) are retried. The delay doubles after each
/// failed attempt, starting at `initial_backoff`.

use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

use crate::ingest::TelemetrySource;
use crate::model::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

pub fn fetch_with_retry<S: TelemetrySource + ?Sized>(
    source: &S,
    station_code: &str,
    start: NaiveDate,
    end: NaiveDate,
    policy: &RetryPolicy,
) -> Result<String, TelemetryError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match source.fetch(station_code, start, end) {
            Ok(body) => return Ok(body),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    station = station_code,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "telemetry fetch failed, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Replays a scripted sequence of results and counts calls.
    struct ScriptedSource {
        script: RefCell<Vec<Result<String, TelemetryError>>>,
        calls: RefCell<u32>,
    }

    impl ScriptedSource {
        fn new(mut script: Vec<Result<String, TelemetryError>>) -> Self {
            script.reverse();
            Self {
                script: RefCell::new(script),
                calls: RefCell::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.borrow()
        }
    }

    impl TelemetrySource for ScriptedSource {
        fn fetch(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<String, TelemetryError> {
            *self.calls.borrow_mut() += 1;
            self.script
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Err(TelemetryError::Transport("script exhausted".to_string())))
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
        }
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
    }

    #[test]
    fn test_transport_error_retried_until_success() {
        let source = ScriptedSource::new(vec![
            Err(TelemetryError::Transport("connection reset".to_string())),
            Err(TelemetryError::Service { status: 503, body: String::new() }),
            Ok("<ok/>".to_string()),
        ]);
        let (start, end) = range();

        let body = fetch_with_retry(&source, "86510000", start, end, &no_wait(3));
        assert_eq!(body, Ok("<ok/>".to_string()));
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let source = ScriptedSource::new(vec![
            Err(TelemetryError::Transport("timed out".to_string())),
            Err(TelemetryError::Transport("timed out".to_string())),
            Ok("<late/>".to_string()),
        ]);
        let (start, end) = range();

        let result = fetch_with_retry(&source, "86510000", start, end, &no_wait(2));
        assert!(matches!(result, Err(TelemetryError::Transport(_))), "got {:?}", result);
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_client_error_not_retried() {
        let source = ScriptedSource::new(vec![
            Err(TelemetryError::Service { status: 404, body: "not found".to_string() }),
            Ok("<never/>".to_string()),
        ]);
        let (start, end) = range();

        let result = fetch_with_retry(&source, "86510000", start, end, &no_wait(5));
        assert!(matches!(result, Err(TelemetryError::Service { status: 404, .. })));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let source = ScriptedSource::new(vec![Ok("<ok/>".to_string())]);
        let (start, end) = range();

        assert!(fetch_with_retry(&source, "86510000", start, end, &no_wait(0)).is_ok());
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(1000));
    }
}
