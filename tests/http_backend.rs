//! End-to-end exercise of the reqwest backend client against a real axum
//! fixture speaking the JSON backend protocol.

use std::collections::HashMap;
use std::time::Duration;

use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use carbonq::backend::{Backend, FetchError, FindRequest, HttpBackend, InfoRequest, RenderRequest};

async fn spawn_fixture() -> String {
    let router = Router::new()
        .route(
            "/metrics/find",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let query = params.get("query").cloned().unwrap_or_default();
                let path = format!("{}.cpu", query.trim_end_matches(".*"));
                Json(json!([{"path": path, "isLeaf": true}]))
            }),
        )
        .route(
            "/render",
            get(|| async {
                Json(json!([{
                    "name": "prod.web.cpu",
                    "startTime": 0,
                    "stopTime": 180,
                    "stepTime": 60,
                    "values": [1.0, null, 3.0],
                }]))
            }),
        )
        .route("/info", get(|| async { StatusCode::NOT_FOUND }));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("fixture should bind an ephemeral port");
    let addr = listener.local_addr().expect("fixture has a local address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("fixture server should run");
    });
    format!("http://{addr}")
}

#[tokio::test(flavor = "multi_thread")]
async fn http_backend_speaks_the_json_protocol() {
    let address = spawn_fixture().await;
    let backend = HttpBackend::new(address, vec![], Duration::from_secs(2))
        .expect("backend client should build");

    let matches = backend
        .find(&FindRequest {
            query: "prod.web.*".to_string(),
        })
        .await
        .expect("find should succeed");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].path, "prod.web.cpu");
    assert!(matches[0].is_leaf);

    let series = backend
        .render(&RenderRequest {
            targets: vec!["prod.web.cpu".to_string()],
            from: 0,
            until: 180,
        })
        .await
        .expect("render should succeed");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].values, vec![1.0, 0.0, 3.0]);
    assert_eq!(series[0].is_absent, vec![false, true, false]);

    let err = backend
        .info(&InfoRequest {
            target: "prod.web.cpu".to_string(),
        })
        .await
        .expect_err("fixture answers info with 404");
    assert!(matches!(err, FetchError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_backends_report_opaque_errors() {
    // Nothing listens on this port; the client should fail fast and keep the
    // not-found sentinel out of transport errors.
    let backend = HttpBackend::new(
        "http://127.0.0.1:1".to_string(),
        vec![],
        Duration::from_millis(200),
    )
    .expect("backend client should build");

    let err = backend
        .find(&FindRequest {
            query: "x".to_string(),
        })
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, FetchError::Other(_)));
}
