//! Data types shared across the call pipeline and the deferred-call queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote endpoint call that could not be completed online and is parked
/// in the durable queue until connectivity returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredCall {
    /// Store-assigned key. `None` until the record is first persisted.
    pub id: Option<i64>,
    pub endpoint: String,
    pub method: String,
    pub params: Option<Value>,
    /// Claim marker: `true` while a drain pass owns this record.
    pub submitting: bool,
}

impl DeferredCall {
    /// Create an unpersisted, unclaimed deferred call.
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Self {
        Self {
            id: None,
            endpoint: endpoint.into(),
            method: method.into(),
            params,
            submitting: false,
        }
    }
}

/// Transport-agnostic request representation handed to the terminal step of
/// the middleware chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// Request path, `{prefix}/{endpoint}/{method}`.
    pub url: String,
    /// HTTP verb; endpoint calls are always `POST`.
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// JSON-encoded params; absent when the call carries no params.
    pub body: Option<String>,
}

/// Raw response produced by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl TransportResponse {
    /// Whether the status is in the 2xx success range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The raw response body text.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

/// Ephemeral per-attempt context threaded through the middleware chain.
///
/// Constructed fresh for every attempt, including every replay of a
/// deferred call; never persisted.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub endpoint: String,
    pub method: String,
    pub params: Option<Value>,
    /// `true` when the attempt is a replay from the deferred-call queue.
    pub is_deferred: bool,
    pub request: TransportRequest,
}

/// Outcome of a deferrable call: either completed against the backend or
/// parked in the queue with its assigned id.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferrableResult {
    /// The call went through online; carries the decoded response body.
    Completed(Value),
    /// The call was persisted for later submission.
    Deferred(DeferredCall),
}

impl DeferrableResult {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// The decoded result, when the call completed online.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }

    /// The persisted record, when the call was deferred.
    pub fn deferred_call(&self) -> Option<&DeferredCall> {
        match self {
            Self::Completed(_) => None,
            Self::Deferred(call) => Some(call),
        }
    }
}

/// One field-level entry from a structured validation error document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_deferred_call_is_unpersisted_and_unclaimed() {
        let call = DeferredCall::new("FooEndpoint", "fooMethod", Some(json!({"fooData": "foo"})));

        assert_eq!(call.id, None);
        assert!(!call.submitting);
        assert_eq!(call.endpoint, "FooEndpoint");
        assert_eq!(call.method, "fooMethod");
    }

    #[test]
    fn response_ok_covers_the_2xx_range() {
        let mut response =
            TransportResponse { status: 200, status_text: "OK".into(), body: String::new() };
        assert!(response.is_ok());

        response.status = 204;
        assert!(response.is_ok());

        response.status = 302;
        assert!(!response.is_ok());

        response.status = 500;
        assert!(!response.is_ok());
    }

    #[test]
    fn response_json_parses_body() {
        let response = TransportResponse {
            status: 200,
            status_text: "OK".into(),
            body: r#"{"fooData":"foo"}"#.into(),
        };

        let value = response.json().expect("valid json body");
        assert_eq!(value["fooData"], "foo");
    }

    #[test]
    fn deferrable_result_accessors_match_variant() {
        let completed = DeferrableResult::Completed(json!({"ok": true}));
        assert!(!completed.is_deferred());
        assert!(completed.result().is_some());
        assert!(completed.deferred_call().is_none());

        let deferred = DeferrableResult::Deferred(DeferredCall::new("Foo", "bar", None));
        assert!(deferred.is_deferred());
        assert!(deferred.result().is_none());
        assert_eq!(deferred.deferred_call().map(|c| c.endpoint.as_str()), Some("Foo"));
    }

    #[test]
    fn validation_entry_uses_camel_case_wire_names() {
        let entry: ValidationErrorEntry = serde_json::from_value(json!({
            "message": "must not be empty",
            "parameterName": "fooData"
        }))
        .expect("entry parses");

        assert_eq!(entry.parameter_name.as_deref(), Some("fooData"));
    }
}
