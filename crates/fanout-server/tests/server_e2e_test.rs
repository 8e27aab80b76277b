//! End-to-end tests for the batch server
//!
//! A small hyper application stands in for the upstream service; the batch
//! server forwards to it through `HttpInvoker` and is driven with reqwest.

use fanout_server::{BatchServer, ServerConfig};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn upstream(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = req.into_body().collect().await.map(|b| b.to_bytes()).unwrap_or_default();

    let (status, bytes) = match (method.as_str(), path.as_str()) {
        ("POST", "/echo") => (StatusCode::OK, body),
        ("GET", "/users/0") => (StatusCode::OK, Bytes::from_static(br#"{"id":0,"name":"Ben"}"#)),
        ("GET", "/users/Ben") => {
            (StatusCode::OK, Bytes::from_static(br#"{"id":0,"name":"Ben","role":"admin"}"#))
        }
        ("GET", "/text") => (StatusCode::OK, Bytes::from_static(b"plain text")),
        ("GET", "/error") => (
            StatusCode::NOT_FOUND,
            Bytes::from_static(br#"{"statusCode":404,"error":"Not Found","message":"no such thing"}"#),
        ),
        _ => (StatusCode::NOT_FOUND, Bytes::new()),
    };

    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = status;
    Ok(response)
}

async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(upstream))
                    .await;
            });
        }
    });
    addr
}

/// Running batch server; dropping the guard stops it.
struct TestServer {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let server = BatchServer::from_config(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve_with_shutdown(async move {
            let _ = shutdown_rx.await;
        }));
        Self { addr, _shutdown: shutdown_tx }
    }

    async fn with_upstream(batch_path: &str) -> Self {
        let upstream = spawn_upstream().await;
        Self::start(ServerConfig {
            address: "127.0.0.1:0".to_string(),
            batch_path: batch_path.to_string(),
            upstream_url: format!("http://{}", upstream),
            request_timeout_secs: 5,
            ..ServerConfig::default()
        })
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let response = reqwest::Client::new().post(self.url(path)).json(body).send().await.unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_batch_forwards_to_upstream() {
    let server = TestServer::with_upstream("/batch").await;

    let (status, body) = server
        .post(
            "/batch",
            &json!({"requests": [
                {"method": "post", "path": "/echo", "payload": "Hello!"},
                {"method": "post", "path": "/echo", "payload": {"hello": "world"}},
                {"path": "/text"}
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["Hello!", {"hello": "world"}, "plain text"]));
}

#[tokio::test]
async fn test_references_across_upstream_calls() {
    let server = TestServer::with_upstream("/batch").await;

    let (status, body) = server
        .post(
            "/batch",
            &json!({"requests": [
                {"path": "/users/0"},
                {"path": "/users/$$0.name"},
                {"method": "post", "path": "/echo", "payload": {"role": "$$1.role", "id": "$$0.id"}}
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[1]["role"], "admin");
    assert_eq!(body[2], json!({"role": "admin", "id": 0}));
}

#[tokio::test]
async fn test_error_responses_are_included() {
    let server = TestServer::with_upstream("/batch").await;

    let (status, body) = server
        .post("/batch", &json!({"requests": [{"path": "/error"}, {"path": "/nowhere"}]}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"statusCode": 404, "error": "Not Found", "message": "no such thing"},
            {"statusCode": 404, "error": "Not Found"}
        ])
    );
}

#[tokio::test]
async fn test_custom_batch_path() {
    let server = TestServer::with_upstream("/custom-batch").await;
    let batch = json!({"requests": [{"method": "post", "path": "/echo", "payload": "Hello!"}]});

    let (status, body) = server.post("/custom-batch", &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["Hello!"]));

    let (status, _) = server.post("/batch", &batch).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_invalid_batches() {
    let server = TestServer::with_upstream("/batch").await;

    for batch in [
        json!({}),
        json!({"requests": []}),
        json!({"requests": "nope"}),
        json!({"requests": [{"method": "get"}]}),
    ] {
        let (status, body) = server.post("/batch", &batch).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
    }
}

#[tokio::test]
async fn test_rejects_oversized_body() {
    let upstream = spawn_upstream().await;
    let server = TestServer::start(ServerConfig {
        address: "127.0.0.1:0".to_string(),
        upstream_url: format!("http://{}", upstream),
        max_body_bytes: 128,
        ..ServerConfig::default()
    })
    .await;

    let (status, body) = server.post("/batch", &json!({"requests": [{"path": "/users/0"}]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"id": 0, "name": "Ben"}]));

    let payload = "x".repeat(256);
    let (status, body) = server
        .post("/batch", &json!({"requests": [{"method": "post", "path": "/echo", "payload": payload}]}))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["statusCode"], 413);
}

#[tokio::test]
async fn test_rejects_get_on_batch_path() {
    let server = TestServer::with_upstream("/batch").await;

    let response = reqwest::get(server.url("/batch")).await.unwrap();
    assert_eq!(response.status().as_u16(), 405);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = TestServer::with_upstream("/batch").await;

    let response = reqwest::Client::new()
        .post(server.url("/batch"))
        .header("x-request-id", "test-123")
        .json(&json!({"requests": [{"path": "/users/0"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "test-123");

    let response = reqwest::Client::new()
        .post(server.url("/batch"))
        .json(&json!({"requests": [{"path": "/users/0"}]}))
        .send()
        .await
        .unwrap();
    assert!(!response.headers()["x-request-id"].is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_becomes_sub_result() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let server = TestServer::start(ServerConfig {
        address: "127.0.0.1:0".to_string(),
        upstream_url: format!("http://{}", closed),
        request_timeout_secs: 5,
        ..ServerConfig::default()
    })
    .await;

    let (status, body) = server.post("/batch", &json!({"requests": [{"path": "/users/0"}]})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["statusCode"], 502);
    assert_eq!(body[0]["error"], "Bad Gateway");
}
