/// Daily aggregation of telemetry readings.
///
/// `aggregate` takes the flat list of `Reading`s produced by the ingest
/// layer and collapses it into one `DailyRecord` per calendar day: the
/// day's maximum level and its total rainfall. Days with no readings are
/// left out rather than zero-filled, so downstream code must accept gaps.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{DailyRecord, Reading};

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Groups readings by the date part of their (naive, station-local)
/// timestamp. Output is ascending by day with exactly one record per
/// distinct date in the input.
pub fn aggregate(readings: &[Reading]) -> Vec<DailyRecord> {
    let mut by_day: BTreeMap<NaiveDate, DailyRecord> = BTreeMap::new();

    for reading in readings {
        let day = reading.timestamp.date();
        by_day
            .entry(day)
            .and_modify(|record| {
                record.level = record.level.max(reading.level);
                record.rainfall += reading.rainfall;
            })
            .or_insert(DailyRecord {
                day,
                level: reading.level,
                rainfall: reading.rainfall,
            });
    }

    by_day.into_values().collect()
}

/// Splits a daily series into the `(day, value)` pairs the seasonal model
/// fits on, for level and rainfall respectively.
pub fn split_series(records: &[DailyRecord]) -> (Vec<(NaiveDate, f64)>, Vec<(NaiveDate, f64)>) {
    records
        .iter()
        .map(|r| ((r.day, r.level), (r.day, r.rainfall)))
        .unzip()
}

/// Number of calendar days between the first and last record that have no
/// record of their own.
pub fn missing_days(records: &[DailyRecord]) -> i64 {
    match (records.first(), records.last()) {
        (Some(first), Some(last)) => {
            (last.day - first.day).num_days() + 1 - records.len() as i64
        }
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
