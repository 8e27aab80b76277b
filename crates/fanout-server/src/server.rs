//! HTTP/1.1 batch server.
//!
//! Accepts connections on a TCP listener and hands every request to the
//! [`BatchHandler`]. Each request runs inside a tracing span carrying its
//! `x-request-id`, taken from the request or generated, and echoed back.
//! Bodies larger than the configured cap are answered with 413 before the
//! handler sees them.

use fanout_abstraction::SubResult;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ServerConfig, default_max_body_bytes};
use crate::error::{Result, ServerError};
use crate::handler::BatchHandler;
use crate::invoker::HttpInvoker;

/// Header name for request ID
const REQUEST_ID_HEADER: &str = "x-request-id";

/// A bound batch server.
#[derive(Debug)]
pub struct BatchServer {
    listener: TcpListener,
    handler: BatchHandler,
    max_body_bytes: usize,
}

impl BatchServer {
    /// Binds `address` and serves `handler` once started.
    pub async fn bind(address: &str, handler: BatchHandler) -> Result<Self> {
        let listener = TcpListener::bind(address).await.map_err(|source| ServerError::Bind {
            address: address.to_string(),
            source,
        })?;
        Ok(Self { listener, handler, max_body_bytes: default_max_body_bytes() })
    }

    /// Sets the largest request body accepted, in bytes.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Builds the forwarding invoker, executor and handler from `config` and binds.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let invoker = Arc::new(HttpInvoker::from_config(config)?);
        let handler = BatchHandler::from_config(config, invoker);
        Ok(Self::bind(&config.address, handler).await?.with_max_body_bytes(config.max_body_bytes))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until the process is stopped.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves. Connections already accepted run to
    /// completion on their own tasks.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let address = self.local_addr()?;
        info!(
            address = %address,
            batch_path = %self.handler.batch_path(),
            max_body_bytes = self.max_body_bytes,
            "Batch server listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "New connection");
                            let handler = self.handler.clone();
                            let max_body_bytes = self.max_body_bytes;
                            tokio::spawn(async move {
                                handle_connection(stream, handler, max_body_bytes).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, handler: BatchHandler, max_body_bytes: usize) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(handle_http_request(req, &handler, max_body_bytes).await)
        }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        debug!(error = %e, "Error serving connection");
    }
}

async fn handle_http_request(
    req: Request<Incoming>,
    handler: &BatchHandler,
    max_body_bytes: usize,
) -> Response<Full<Bytes>> {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri
    );

    async move {
        let start_time = Instant::now();
        info!("Request started");

        let (status, body) = match read_body(req.into_body(), max_body_bytes).await {
            Ok(bytes) => handler.handle(&method, &uri, &bytes).await,
            Err(rejection) => rejection,
        };

        let duration = start_time.elapsed();
        if status.is_success() {
            info!(status = status.as_u16(), duration_ms = duration.as_millis(), "Request completed");
        } else {
            warn!(status = status.as_u16(), duration_ms = duration.as_millis(), "Request failed");
        }

        json_response(status, &body, &request_id)
    }
    .instrument(span)
    .await
}

/// Collects `body`, refusing anything over `limit` bytes.
async fn read_body<B>(body: B, limit: usize) -> std::result::Result<Bytes, (StatusCode, Value)>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(limit, "Request body too large");
            let message = format!("Request body exceeds {} bytes", limit);
            Err((StatusCode::PAYLOAD_TOO_LARGE, SubResult::error(413, message).body))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            Err((StatusCode::BAD_REQUEST, SubResult::error(400, e.to_string()).body))
        }
    }
}

fn json_response(status: StatusCode, body: &Value, request_id: &str) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(header_value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}
