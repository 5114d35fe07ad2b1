//! Strict CSV history loader for backtests.
//!
//! Backtest correctness depends on complete, trusted history, so unlike
//! a live feed this loader is fatal on the first bad record: missing
//! columns, unparseable fields, and non-monotonic timestamps all abort
//! the load.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tradebot_core::error::DataError;
use tradebot_core::types::MarketEvent;

const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Raw CSV row. Fields stay strings so parse failures can be reported
/// with the offending line number.
#[derive(Debug, Deserialize)]
struct HistoryRecord {
    timestamp: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

/// Load the ordered event history for one symbol from a CSV file.
///
/// Rows must be sorted strictly ascending by timestamp. Sequence
/// numbers are assigned 1..n in file order.
pub fn load_history(path: &Path, symbol: &str) -> Result<Vec<MarketEvent>, DataError> {
    if !path.exists() {
        return Err(DataError::NotFound(path.display().to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| DataError::Parse(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| DataError::Parse(e.to_string()))?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(column)) {
            return Err(DataError::MissingColumn(column.to_string()));
        }
    }

    let mut events = Vec::new();
    let mut last_timestamp: Option<DateTime<Utc>> = None;

    for (index, result) in reader.deserialize().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let record: HistoryRecord = result.map_err(|e| DataError::MalformedRecord {
            line,
            reason: e.to_string(),
        })?;

        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            DataError::MalformedRecord {
                line,
                reason: format!("unparseable timestamp: {}", record.timestamp),
            }
        })?;
        if let Some(last) = last_timestamp {
            if timestamp <= last {
                return Err(DataError::NonMonotonicTimestamp { line });
            }
        }
        last_timestamp = Some(timestamp);

        events.push(MarketEvent {
            symbol: symbol.to_string(),
            timestamp,
            open: parse_price(&record.open, "open", line)?,
            high: parse_price(&record.high, "high", line)?,
            low: parse_price(&record.low, "low", line)?,
            close: parse_price(&record.close, "close", line)?,
            volume: parse_price(&record.volume, "volume", line)?,
            sequence: (index + 1) as u64,
        });
    }

    if events.is_empty() {
        return Err(DataError::NotFound(format!(
            "{} contains no data rows",
            path.display()
        )));
    }

    Ok(events)
}

fn parse_price(raw: &str, column: &str, line: usize) -> Result<Decimal, DataError> {
    Decimal::from_str(raw.trim()).map_err(|_| DataError::MalformedRecord {
        line,
        reason: format!("unparseable {column}: {raw}"),
    })
}

/// Parse the timestamp formats seen in exported history files.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }
    // Unix timestamp, milliseconds if more than 10 digits.
    if let Ok(ts) = raw.parse::<i64>() {
        return if ts > 10_000_000_000 {
            DateTime::from_timestamp_millis(ts)
        } else {
            DateTime::from_timestamp(ts, 0)
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_history() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-01,10,11,9,10.5,100\n\
             2024-01-02,10.5,12,10,11,120\n",
        );

        let events = load_history(file.path(), "AAPL").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[0].symbol, "AAPL");
        assert!(events[0].timestamp < events[1].timestamp);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let file = write_csv("timestamp,open,high,low,close\n2024-01-01,1,2,0.5,1.5\n");

        let err = load_history(file.path(), "AAPL").unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == "volume"));
    }

    #[test]
    fn test_non_monotonic_timestamps_are_fatal() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-02,1,2,0.5,1.5,10\n\
             2024-01-01,1,2,0.5,1.5,10\n",
        );

        let err = load_history(file.path(), "AAPL").unwrap_err();
        assert!(matches!(err, DataError::NonMonotonicTimestamp { line: 3 }));
    }

    #[test]
    fn test_malformed_price_is_fatal() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             2024-01-01,1,2,0.5,oops,10\n",
        );

        let err = load_history(file.path(), "AAPL").unwrap_err();
        assert!(matches!(err, DataError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2024-01-15").is_some());
        assert!(parse_timestamp("2024-01-15 10:30:00").is_some());
        assert!(parse_timestamp("2024-01-15T10:30:00Z").is_some());
        assert!(parse_timestamp("1705312800").is_some());
        assert!(parse_timestamp("1705312800000").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
