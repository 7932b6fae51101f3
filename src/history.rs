//! Rebuilds the first-seen time of every key previously stored for a zone.

use crate::error::{HistoryError, RowParseError};
use crate::model::{HistoryRecord, MEASUREMENT};
use crate::store::{HistoryStore, SeriesRow};
use chrono::DateTime;
use serde_json::Value;
use tracing::{debug, error};

/// Query selecting the earliest observation per key of `zone`.
pub fn first_seen_query(zone: &str) -> String {
    format!(
        "select domain,algorithm,keytag,first(age) from {} where domain='{}' group by domain,algorithm,keytag",
        MEASUREMENT,
        zone.replace('\\', "\\\\").replace('\'', "\\'")
    )
}

/// Fetch and parse the history of `zone`. Zero rows is an empty history;
/// any unparseable row fails the whole zone.
pub async fn reconstruct<S>(store: &S, zone: &str) -> Result<Vec<HistoryRecord>, HistoryError>
where
    S: HistoryStore + ?Sized,
{
    let rows = store.query(&first_seen_query(zone)).await?;
    debug!("{} history rows for {}", rows.len(), zone);

    rows.iter()
        .map(|row| {
            parse_row(row).map_err(|source| {
                error!("Error in history row for {}: {:?}: {}", zone, row.values, source);
                HistoryError::Row {
                    zone: zone.to_string(),
                    source,
                }
            })
        })
        .collect()
}

/// Typed view of one row: time, domain, algorithm, keytag, first.
pub fn parse_row(row: &SeriesRow) -> Result<HistoryRecord, RowParseError> {
    let time = string_cell(row, "time")?;
    let first_seen = DateTime::parse_from_rfc3339(&time)
        .map_err(|e| RowParseError::Timestamp {
            value: time.clone(),
            reason: e.to_string(),
        })?
        .timestamp();

    let domain = string_cell(row, "domain")?;
    let algorithm = string_cell(row, "algorithm")?;

    let keytag_raw = string_cell(row, "keytag")?;
    let keytag = keytag_raw
        .parse::<u16>()
        .map_err(|_| RowParseError::KeyTag(keytag_raw.clone()))?;

    let first_age = integer_cell(row, "first")?;

    Ok(HistoryRecord {
        domain,
        algorithm,
        keytag,
        first_seen,
        first_age,
    })
}

fn string_cell(row: &SeriesRow, column: &'static str) -> Result<String, RowParseError> {
    match row.cell(column) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(RowParseError::WrongType {
            column,
            value: other.to_string(),
        }),
        None => Err(RowParseError::MissingColumn(column)),
    }
}

fn integer_cell(row: &SeriesRow, column: &'static str) -> Result<i64, RowParseError> {
    let value = row
        .cell(column)
        .ok_or(RowParseError::MissingColumn(column))?;

    let parsed = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RowParseError::Age(value.to_string()))
}
