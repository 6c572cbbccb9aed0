//! HTTP exchange with the sink

use std::sync::Arc;
use std::time::Duration;

use ureq::Agent;
use ureq::http;
use uuid::Uuid;

use crate::error::SenderError;
use crate::message::{Headers, OutboundRequest};

/// What came back from the sink
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
    /// Body bytes, or why they could not be read
    pub body: Result<Vec<u8>, String>,
}

/// The exchange did not produce a response
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Blocking HTTP client seam
pub trait Transport: Send + Sync {
    /// HEAD the url; any response means the sink is reachable
    fn probe(&self, url: &str) -> Result<(), TransportError>;

    fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError>;
}

/// ureq-backed transport
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .into();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn probe(&self, url: &str) -> Result<(), TransportError> {
        self.agent
            .head(url)
            .call()
            .map(|_| ())
            .map_err(|e| TransportError(e.to_string()))
    }

    fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let result = if request.body.is_empty() {
            let req = builder.body(()).map_err(|e| TransportError(e.to_string()))?;
            self.agent.run(req)
        } else {
            let req = builder
                .body(request.body.as_slice())
                .map_err(|e| TransportError(e.to_string()))?;
            self.agent.run(req)
        };
        let mut response = result.map_err(|e| TransportError(e.to_string()))?;

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.add(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_vec().map_err(|e| e.to_string());

        Ok(RawResponse { status, headers, body })
    }
}

/// Runs exchanges off the async runtime and adds trace propagation when asked
#[derive(Clone)]
pub struct Transmitter {
    transport: Arc<dyn Transport>,
    tracing: bool,
}

impl Transmitter {
    pub fn new(transport: Arc<dyn Transport>, tracing: bool) -> Self {
        Self { transport, tracing }
    }

    /// Send the request. Trace headers, when enabled, are written into the
    /// request itself so callers see exactly what went out.
    pub async fn transmit(
        &self,
        request: &mut OutboundRequest,
    ) -> Result<Result<RawResponse, TransportError>, SenderError> {
        if self.tracing {
            inject_trace_headers(request);
        }
        let transport = Arc::clone(&self.transport);
        let outbound = request.clone();
        tokio::task::spawn_blocking(move || transport.send(&outbound))
            .await
            .map_err(SenderError::Join)
    }

    pub async fn probe(&self, url: &str) -> Result<Result<(), TransportError>, SenderError> {
        let transport = Arc::clone(&self.transport);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || transport.probe(&url))
            .await
            .map_err(SenderError::Join)
    }
}

/// W3C trace context plus B3 single-span headers for a new sampled trace
fn inject_trace_headers(request: &mut OutboundRequest) {
    let trace_id = Uuid::new_v4().simple().to_string();
    let span_id = Uuid::new_v4().simple().to_string()[..16].to_string();

    request
        .headers
        .set("traceparent", format!("00-{}-{}-01", trace_id, span_id));
    request.headers.set("X-B3-TraceId", trace_id);
    request.headers.set("X-B3-SpanId", span_id);
    request.headers.set("X-B3-Sampled", "1");
}
