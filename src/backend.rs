//! Storage backend contract and the HTTP client implementation.
//!
//! A backend is one storage replica (or shard group) answering find, render
//! and info. Errors must keep "the metric does not exist there" separable
//! from everything else, because the reconciler treats the two differently.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::series::{FindMatch, Info, MetricData};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub targets: Vec<String>,
    pub from: i32,
    pub until: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRequest {
    pub target: String,
}

/// The three RPCs every storage backend provides, plus identity and the
/// pattern pre-filter the dispatcher consults before fanning out.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn find(&self, request: &FindRequest) -> Result<Vec<FindMatch>, FetchError>;

    async fn render(&self, request: &RenderRequest) -> Result<Vec<MetricData>, FetchError>;

    async fn info(&self, request: &InfoRequest) -> Result<Vec<Info>, FetchError>;

    /// Stable identity used to deduplicate backends across routing entries.
    fn server_address(&self) -> &str;

    /// Backend-specific pattern pre-filter. The default accepts everything;
    /// implementations with a metric index can prune themselves out.
    fn matches(&self, _targets: &[String]) -> bool {
        true
    }

    /// Top-level domains this backend is configured to serve.
    fn tlds(&self) -> &[String];
}

/// JSON-over-HTTP backend client. The wire model mirrors the gateway's own
/// JSON encoding: absent points travel as nulls.
pub struct HttpBackend {
    address: String,
    tlds: Vec<String>,
    client: Client,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeries {
    name: String,
    start_time: i32,
    stop_time: i32,
    step_time: i32,
    values: Vec<Option<f64>>,
}

impl HttpBackend {
    pub fn new(address: String, tlds: Vec<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            tlds,
            client,
        })
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, FetchError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.address, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| FetchError::Other(format!("{}: {err}", self.address)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(format!(
                "{} returned no matches",
                self.address
            ))),
            status if status.is_success() => response
                .json()
                .await
                .map_err(|err| FetchError::Other(format!("{}: invalid body: {err}", self.address))),
            status => Err(FetchError::Other(format!(
                "{} returned status {status}",
                self.address
            ))),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn find(&self, request: &FindRequest) -> Result<Vec<FindMatch>, FetchError> {
        self.get_json(
            "/metrics/find",
            &[
                ("query", request.query.clone()),
                ("format", "json".to_string()),
            ],
        )
        .await
    }

    async fn render(&self, request: &RenderRequest) -> Result<Vec<MetricData>, FetchError> {
        let mut query = vec![
            ("from", request.from.to_string()),
            ("until", request.until.to_string()),
            ("format", "json".to_string()),
        ];
        for target in &request.targets {
            query.push(("target", target.clone()));
        }
        let series: Vec<WireSeries> = self.get_json("/render", &query).await?;
        Ok(series.into_iter().map(MetricData::from).collect())
    }

    async fn info(&self, request: &InfoRequest) -> Result<Vec<Info>, FetchError> {
        self.get_json(
            "/info",
            &[
                ("target", request.target.clone()),
                ("format", "json".to_string()),
            ],
        )
        .await
    }

    fn server_address(&self) -> &str {
        &self.address
    }

    fn tlds(&self) -> &[String] {
        &self.tlds
    }
}

impl From<WireSeries> for MetricData {
    fn from(wire: WireSeries) -> Self {
        let is_absent: Vec<bool> = wire.values.iter().map(Option::is_none).collect();
        let values: Vec<f64> = wire.values.into_iter().map(|v| v.unwrap_or(0.0)).collect();
        MetricData {
            name: wire.name,
            start_time: wire.start_time,
            stop_time: wire.stop_time,
            step_time: wire.step_time,
            values,
            is_absent,
        }
    }
}
