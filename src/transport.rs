// HTTP transport seam
// -------------------
// `EsaClient` builds `HttpRequest` values and hands them to a `Transport`.
// Production uses a blocking reqwest client; tests plug in a scripted
// transport instead of a live server.

use reqwest::blocking::Client;
use reqwest::Method;

use crate::error::{EsaError, Result};

/// A fully-specified API call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Bearer token sent in the `Authorization` header.
    pub token: String,
    pub body: Option<serde_json::Value>,
}

/// Status and raw body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one request. Any status code is a successful execution; only
/// failures to get a response are errors.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Blocking reqwest transport. No timeout beyond reqwest's defaults, no retries.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("esa-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EsaError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .bearer_auth(&request.token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let res = builder
            .send()
            .map_err(|e| EsaError::Transport(e.to_string()))?;
        let status = res.status().as_u16();
        let body = res
            .text()
            .map_err(|e| EsaError::Transport(format!("failed to read response body: {e}")))?;

        tracing::debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse { status, body })
    }
}
