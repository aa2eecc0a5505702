//! Interceptable request pipeline.
//!
//! Folds an ordered list of interceptors and one fixed terminal transport
//! step into a single invocable chain. A response-validation/decoding step
//! always wraps the entire user chain: it executes first on the way in and
//! last on the way out, so user interceptors observe raw transport
//! responses and can substitute them, but can never bypass validation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use lifeline_domain::{
    CallContext, CallError, Result, TransportRequest, TransportResponse, ValidationErrorEntry,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::ports::{LoadingIndicator, Transport};

/// An interceptor in the call chain.
///
/// Receives the call context and the remainder of the chain; proceeds by
/// running `next`, or substitutes a response without doing so.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn intercept(&self, context: CallContext, next: Next) -> Result<TransportResponse>;
}

/// The remainder of the middleware chain from one interceptor's viewpoint.
pub struct Next {
    middlewares: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    terminal: Arc<TerminalStep>,
}

impl Next {
    /// Run the rest of the chain with the given context.
    pub fn run(self, context: CallContext) -> BoxFuture<'static, Result<TransportResponse>> {
        Box::pin(async move {
            match self.middlewares.get(self.index).cloned() {
                Some(middleware) => {
                    let next = Next {
                        middlewares: Arc::clone(&self.middlewares),
                        index: self.index + 1,
                        terminal: Arc::clone(&self.terminal),
                    };
                    middleware.intercept(context, next).await
                }
                None => self.terminal.send(context).await,
            }
        })
    }
}

/// Wrap a plain async closure as a [`Middleware`].
///
/// Stateful interceptors implement the trait directly; this adapter covers
/// the function-shaped variant so both register into the same ordered list.
pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(CallContext, Next) -> BoxFuture<'static, Result<TransportResponse>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnMiddleware(f))
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(CallContext, Next) -> BoxFuture<'static, Result<TransportResponse>>
        + Send
        + Sync
        + 'static,
{
    async fn intercept(&self, context: CallContext, next: Next) -> Result<TransportResponse> {
        (self.0)(context, next).await
    }
}

/// Innermost step of the chain: the transport call, bracketed by the
/// loading-indicator hook.
struct TerminalStep {
    transport: Arc<dyn Transport>,
    loading: Option<Arc<dyn LoadingIndicator>>,
}

impl TerminalStep {
    async fn send(&self, context: CallContext) -> Result<TransportResponse> {
        self.set_loading(true);
        let result = self.transport.send(&context.request).await;
        self.set_loading(false);
        result
    }

    fn set_loading(&self, loading: bool) {
        if let Some(indicator) = &self.loading {
            indicator.set_loading(loading);
        }
    }
}

/// Structured error document returned by the backend on non-success
/// statuses. Validation documents may omit the top-level message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDocument {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    detail: Option<Value>,
    validation_error_data: Option<Vec<ValidationErrorEntry>>,
}

/// The composed call pipeline: context construction, interceptor chain,
/// terminal transport step, response validation and decoding.
pub struct CallPipeline {
    prefix: String,
    middlewares: Arc<[Arc<dyn Middleware>]>,
    terminal: Arc<TerminalStep>,
}

impl CallPipeline {
    pub fn new(
        prefix: impl Into<String>,
        middlewares: Vec<Arc<dyn Middleware>>,
        transport: Arc<dyn Transport>,
        loading: Option<Arc<dyn LoadingIndicator>>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            middlewares: middlewares.into(),
            terminal: Arc::new(TerminalStep { transport, loading }),
        }
    }

    /// Invoke the endpoint method through the full chain and return the
    /// decoded response body.
    pub async fn invoke(
        &self,
        endpoint: &str,
        method: &str,
        params: Option<Value>,
        is_deferred: bool,
    ) -> Result<Value> {
        if endpoint.is_empty() {
            return Err(CallError::InvalidArguments("endpoint name must not be empty".into()));
        }
        if method.is_empty() {
            return Err(CallError::InvalidArguments("method name must not be empty".into()));
        }

        let request = self.build_request(endpoint, method, params.as_ref())?;
        let context = CallContext {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            params,
            is_deferred,
            request,
        };

        debug!(endpoint, method, is_deferred, "invoking endpoint call");

        let chain = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            terminal: Arc::clone(&self.terminal),
        };
        let response = chain.run(context).await?;

        assert_response_is_ok(&response)?;
        response.json().map_err(|err| CallError::Decode(err.to_string()))
    }

    fn build_request(
        &self,
        endpoint: &str,
        method: &str,
        params: Option<&Value>,
    ) -> Result<TransportRequest> {
        let body = match params {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|err| CallError::InvalidArguments(err.to_string()))?,
            ),
            None => None,
        };

        Ok(TransportRequest {
            url: format!("{}/{}/{}", self.prefix, endpoint, method),
            method: "POST".to_string(),
            headers: vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        })
    }
}

/// Interpret a non-success response per the validation policy: structured
/// validation document, then structured endpoint error, then raw body,
/// then bare unexpected status.
fn assert_response_is_ok(response: &TransportResponse) -> Result<()> {
    if response.is_ok() {
        return Ok(());
    }

    let body = response.text();
    if let Ok(document) = serde_json::from_str::<ErrorDocument>(body) {
        if let Some(entries) = document.validation_error_data {
            return Err(CallError::Validation {
                message: document.message.unwrap_or_default(),
                entries,
            });
        }
        // A JSON body with no message is not an error document.
        if let Some(message) = document.message {
            return Err(CallError::Endpoint {
                message,
                kind: document.kind,
                detail: document.detail,
            });
        }
    }

    if !body.is_empty() {
        return Err(CallError::UnexpectedResponse {
            status: response.status,
            status_text: response.status_text.clone(),
            body: body.to_string(),
        });
    }

    Err(CallError::Protocol { status: response.status, status_text: response.status_text.clone() })
}
