use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use carbonq::{
    backend::{Backend, FetchError, FindRequest, InfoRequest, RenderRequest},
    config::AppConfig,
    series::{FindMatch, Info, MetricData, Retention},
    server::Server,
};
use serde_json::Value;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceExt;

pub fn test_config() -> AppConfig {
    AppConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        backends: Vec::new(),
        global_timeout: Duration::from_secs(2),
        backend_timeout: Duration::from_secs(1),
        mismatch_tolerance: 0.0,
        fix_mismatches: false,
        graphite_web09_compatibility: false,
    }
}

/// In-process gateway driven through `oneshot`, no sockets involved.
#[derive(Clone)]
pub struct Gateway {
    router: Router,
}

impl Gateway {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        let server = Server::with_backends(test_config(), backends);
        Self {
            router: server.router(),
        }
    }

    pub async fn get(&self, uri: &str) -> axum::http::Response<Body> {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("harness request should build");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should answer the harness request")
    }
}

pub async fn read_body(response: axum::http::Response<Body>) -> (StatusCode, Vec<u8>) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .expect("response body should collect");
    (status, bytes.to_vec())
}

pub async fn read_json(response: axum::http::Response<Body>) -> (StatusCode, Value) {
    let (status, bytes) = read_body(response).await;
    let value = serde_json::from_slice(&bytes).expect("response body should be valid JSON");
    (status, value)
}

/// Scripted backend: canned find/info replies plus a per-target series map
/// for render. Targets absent from the map answer NotFound.
pub struct StubBackend {
    pub address: String,
    pub tlds: Vec<String>,
    pub find: Result<Vec<FindMatch>, FetchError>,
    pub render: Result<HashMap<String, Vec<MetricData>>, FetchError>,
    pub info: Result<Vec<Info>, FetchError>,
}

impl StubBackend {
    pub fn named(address: &str) -> Self {
        Self {
            address: address.to_string(),
            tlds: Vec::new(),
            find: Ok(Vec::new()),
            render: Ok(HashMap::new()),
            info: Ok(Vec::new()),
        }
    }

    pub fn serving(address: &str, series: &[MetricData]) -> Self {
        let mut stub = Self::named(address);
        let mut render = HashMap::new();
        for one in series {
            render.insert(one.name.clone(), vec![one.clone()]);
        }
        stub.find = Ok(series
            .iter()
            .map(|one| FindMatch {
                path: one.name.clone(),
                is_leaf: true,
            })
            .collect());
        stub.render = Ok(render);
        stub
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn find(&self, _request: &FindRequest) -> Result<Vec<FindMatch>, FetchError> {
        self.find.clone()
    }

    async fn render(&self, request: &RenderRequest) -> Result<Vec<MetricData>, FetchError> {
        let table = self.render.clone()?;
        let mut series = Vec::new();
        for target in &request.targets {
            match table.get(target) {
                Some(found) => series.extend(found.clone()),
                None => {
                    return Err(FetchError::NotFound(format!(
                        "{}: no series for {target}",
                        self.address
                    )))
                }
            }
        }
        Ok(series)
    }

    async fn info(&self, _request: &InfoRequest) -> Result<Vec<Info>, FetchError> {
        self.info.clone()
    }

    fn server_address(&self) -> &str {
        &self.address
    }

    fn tlds(&self) -> &[String] {
        &self.tlds
    }
}

pub fn sample_info(name: &str) -> Info {
    Info {
        name: name.to_string(),
        aggregation_method: "average".to_string(),
        max_retention: 31536000,
        x_files_factor: 0.5,
        retentions: vec![Retention {
            seconds_per_point: 60,
            number_of_points: 43200,
        }],
    }
}
