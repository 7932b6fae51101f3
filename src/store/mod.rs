pub mod influx;
pub mod line_protocol;

pub use influx::{InfluxClient, InfluxSettings};
pub use line_protocol::{Point, PointBatch};

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Read and write access to the time-series store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Run a query and return every result row, flattened across series.
    async fn query(&self, query: &str) -> Result<Vec<SeriesRow>, StoreError>;

    /// Write all points of the batch in one call.
    async fn write(&self, batch: &PointBatch) -> Result<(), StoreError>;
}

/// One untyped result row together with the column names and group tags of
/// the series it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub columns: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub values: Vec<Value>,
}

impl SeriesRow {
    /// Cell by column name, falling back to the series' group tags.
    pub fn cell(&self, name: &str) -> Option<Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| self.tags.get(name).map(|t| Value::String(t.clone())))
    }
}

/// Store used for dry runs without connection settings: no history, and
/// every write is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineStore;

#[async_trait]
impl HistoryStore for OfflineStore {
    async fn query(&self, _query: &str) -> Result<Vec<SeriesRow>, StoreError> {
        Ok(Vec::new())
    }

    async fn write(&self, batch: &PointBatch) -> Result<(), StoreError> {
        Err(StoreError::Query(format!(
            "no store configured, {} points dropped",
            batch.len()
        )))
    }
}
