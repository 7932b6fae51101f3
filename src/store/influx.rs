use super::{HistoryStore, PointBatch, SeriesRow};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for an InfluxDB 1.x server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxSettings {
    /// Base URL, e.g. `http://localhost:8086`
    pub server: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// InfluxDB client over the HTTP `/query` and `/write` endpoints.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    client: reqwest::Client,
    base_url: String,
    database: String,
    credentials: Option<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    messages: Vec<Message>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Message {
    level: String,
    text: String,
}

impl InfluxClient {
    pub fn new(settings: &InfluxSettings) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("dnskeyage")
            .build()?;

        let credentials = match (&settings.user, &settings.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (None, None) => None,
            _ => {
                warn!("Influx user and password must be given together, connecting without auth");
                None
            }
        };

        info!(
            "InfluxDB client for {} (database {})",
            settings.server, settings.database
        );

        Ok(Self {
            client,
            base_url: settings.server.trim_end_matches('/').to_string(),
            database: settings.database.clone(),
            credentials,
        })
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, endpoint));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }
}

/// Flatten a `/query` response into rows, turning reported errors into
/// `StoreError::Query`.
fn rows_from_response(response: QueryResponse) -> Result<Vec<SeriesRow>, StoreError> {
    if let Some(error) = response.error {
        return Err(StoreError::Query(error));
    }

    let mut rows = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            return Err(StoreError::Query(error));
        }
        for message in &result.messages {
            info!("Result message: {} {}", message.level, message.text);
        }
        for series in result.series {
            for values in series.values {
                rows.push(SeriesRow {
                    columns: series.columns.clone(),
                    tags: series.tags.clone(),
                    values,
                });
            }
        }
    }
    Ok(rows)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl HistoryStore for InfluxClient {
    async fn query(&self, query: &str) -> Result<Vec<SeriesRow>, StoreError> {
        debug!("InfluxDB query: {}", query);
        let response = self
            .request(reqwest::Method::GET, "query")
            .query(&[("db", self.database.as_str()), ("q", query)])
            .send()
            .await?;

        let parsed: QueryResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Response(e.to_string()))?;

        rows_from_response(parsed)
    }

    async fn write(&self, batch: &PointBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            warn!("Refusing to send an empty batch");
            return Ok(());
        }

        let response = self
            .request(reqwest::Method::POST, "write")
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(batch.to_line_protocol())
            .send()
            .await?;
        check_status(response).await?;

        debug!("Wrote {} points to {}", batch.len(), self.database);
        Ok(())
    }
}
