// =============================================================================
// transport.rs - THE WIRE
// =============================================================================
//
// The executor never talks to reqwest directly. It talks to an HttpTransport,
// which does exactly one thing: send a GET, return a status and (sometimes) a
// body. Production uses reqwest; tests use a scripted double that can answer
// instantly, answer slowly, refuse to connect, or never answer at all.
//
// The transport does NOT enforce the probe timeout. The executor wraps every
// fetch in tokio::time::timeout and drops the future on expiry, which aborts
// the request no matter which transport is underneath.
// =============================================================================

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::fmt;
use tracing::trace;

use crate::error::ProbeError;

/// One outbound GET as the executor wants it sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Final URL to request (already proxied, if proxying is on).
    pub url: String,
    /// Browser-like User-Agent. `None` when going through the forwarding proxy.
    pub user_agent: Option<String>,
    /// Read and return the body when the status is 200.
    pub read_body_on_ok: bool,
}

/// What came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Present only when asked for and the status was 200.
    pub body: Option<String>,
}

/// The seam between the executor and the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a single GET. Any failure to get a status (and the body, when
    /// requested) is a `ProbeError::Transport`.
    async fn fetch(&self, request: &ProbeRequest) -> Result<TransportResponse, ProbeError>;
}

/// The real transport, backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with the default redirect policy. No client-level
    /// timeout: the executor owns the deadline.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, request: &ProbeRequest) -> Result<TransportResponse, ProbeError> {
        let mut builder = self.client.get(&request.url);
        if let Some(ua) = &request.user_agent {
            builder = builder.header(USER_AGENT, ua.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        trace!(url = %request.url, status, "Transport: response headers received");

        let body = if request.read_body_on_ok && status == 200 {
            Some(
                response
                    .text()
                    .await
                    .map_err(|e| ProbeError::Transport(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(TransportResponse { status, body })
    }
}
