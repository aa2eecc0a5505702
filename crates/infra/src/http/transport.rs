//! reqwest-backed implementation of the transport port.
//!
//! The transport reports non-success statuses as ordinary responses; only
//! failures to reach the server at all become errors. Interpreting a 4xx or
//! 5xx body is the pipeline's job, not the transport's.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use lifeline_core::Transport;
use lifeline_domain::{CallError, Result, TransportRequest, TransportResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, StatusCode};
use tracing::debug;

/// HTTP transport that resolves relative request paths against a base URL.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    base_url: String,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder(base_url: impl Into<String>) -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new(base_url)
    }

    /// Convenience constructor with default configuration.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    fn resolve_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse> {
        let method = Method::from_str(&request.method)
            .map_err(|err| CallError::Transport(format!("invalid http method: {err}")))?;
        let url = self.resolve_url(&request.url);

        let mut builder = self.client.request(method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(%method, %url, "sending HTTP request");

        let response =
            builder.send().await.map_err(|err| CallError::Transport(err.to_string()))?;

        let status = response.status();
        debug!(%method, %url, %status, "received HTTP response");

        let body =
            response.text().await.map_err(|err| CallError::Transport(err.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status_text(status),
            body,
        })
    }
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
}

impl ReqwestTransportBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            user_agent: None,
            default_headers: Vec::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Add a header sent with every request, e.g. an authorization token.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<ReqwestTransport> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if !self.default_headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in &self.default_headers {
                let name = HeaderName::from_str(name)
                    .map_err(|err| CallError::Transport(format!("invalid header name: {err}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|err| CallError::Transport(format!("invalid header value: {err}")))?;
                headers.insert(name, value);
            }
            builder = builder.default_headers(headers);
        }

        let client =
            builder.build().map_err(|err| CallError::Transport(err.to_string()))?;

        Ok(ReqwestTransport { client, base_url: self.base_url })
    }
}
