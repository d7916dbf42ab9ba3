//! Invocation data structures.

use crate::identity::{BaseContext, invoke_id};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Error type reported when a runtime submits a response that is not a
/// proxy response object.
pub const INVALID_RESPONSE_ERROR: &str = "Runtime.InvalidResponse";

/// A single invocation travelling from the front door to the worker.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Unique identifier for this invocation.
    pub invoke_id: String,

    /// The serialized event handed to the function.
    pub event_body: String,

    /// When a worker took this invocation. `None` while queued.
    pub started_at: Option<Instant>,

    /// Identity shared by all invocations.
    pub base: Arc<BaseContext>,
}

impl InvocationContext {
    /// Creates a queued invocation with a fresh ID.
    ///
    /// # Examples
    ///
    /// ```
    /// use lambda_gateway::{BaseContext, GatewayConfig, InvocationContext};
    /// use std::sync::Arc;
    ///
    /// let base = Arc::new(BaseContext::from_config(&GatewayConfig::default()));
    /// let context = InvocationContext::new("{}".to_string(), base);
    /// assert!(context.started_at.is_none());
    /// ```
    pub fn new(event_body: String, base: Arc<BaseContext>) -> Self {
        Self {
            invoke_id: invoke_id(),
            event_body,
            started_at: None,
            base,
        }
    }

    /// Parses the event body back into JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn event(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.event_body)
    }
}

/// The HTTP response a handler asks the gateway to send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    /// HTTP status code.
    pub status_code: u16,

    /// Response body. Non-string JSON bodies are serialized.
    #[serde(default, deserialize_with = "text_or_json")]
    pub body: String,

    /// Response headers. Non-string values are serialized.
    #[serde(default, deserialize_with = "header_map")]
    pub headers: HashMap<String, String>,
}

impl ProxyResponse {
    /// Creates a response with no headers.
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn text_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(stringify)
}

fn header_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<HashMap<String, Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| (name, stringify(value)))
        .collect())
}

/// What a handler reports when it finishes an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    /// The handler produced a proxy response.
    Success(ProxyResponse),

    /// The handler finished without a usable response.
    Failure {
        /// Error type, sent back as the response body.
        error_type: String,
    },
}

impl InvocationResult {
    /// A successful result.
    pub fn success(response: ProxyResponse) -> Self {
        Self::Success(response)
    }

    /// A failed result carrying an error type.
    pub fn failure(error_type: impl Into<String>) -> Self {
        Self::Failure {
            error_type: error_type.into(),
        }
    }

    /// Interprets a serialized handler result.
    ///
    /// Anything that is not an object with a numeric `statusCode` becomes a
    /// [`InvocationResult::Failure`] with [`INVALID_RESPONSE_ERROR`].
    pub fn from_payload(payload: &str) -> Self {
        match serde_json::from_str::<ProxyResponse>(payload) {
            Ok(response) => Self::Success(response),
            Err(e) => {
                tracing::debug!("Handler result is not a proxy response: {}", e);
                Self::failure(INVALID_RESPONSE_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[test]
    fn test_new_context_is_unstarted() {
        let base = Arc::new(BaseContext::from_config(&GatewayConfig::default()));
        let a = InvocationContext::new("{\"a\":1}".to_string(), base.clone());
        let b = InvocationContext::new("{}".to_string(), base);

        assert_ne!(a.invoke_id, b.invoke_id);
        assert!(a.started_at.is_none());
        assert_eq!(a.event().unwrap()["a"], 1);
    }

    #[test]
    fn test_from_payload_success() {
        let result = InvocationResult::from_payload(
            r#"{"statusCode":200,"body":"{\"status\":\"ok\"}","headers":{"Content-Type":"application/json"}}"#,
        );

        let expected = ProxyResponse::new(200, r#"{"status":"ok"}"#)
            .with_header("Content-Type", "application/json");
        assert_eq!(result, InvocationResult::Success(expected));
    }

    #[test]
    fn test_from_payload_is_lenient_about_body_and_headers() {
        let result = InvocationResult::from_payload(
            r#"{"statusCode":201,"body":{"id":7},"headers":{"X-Count":3}}"#,
        );

        let InvocationResult::Success(response) = result else {
            panic!("expected success");
        };
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, r#"{"id":7}"#);
        assert_eq!(response.headers["X-Count"], "3");

        let result = InvocationResult::from_payload(r#"{"statusCode":204,"headers":null}"#);
        assert_eq!(result, InvocationResult::Success(ProxyResponse::new(204, "")));
    }

    #[test]
    fn test_from_payload_without_status_code_is_failure() {
        for payload in ["\"hello\"", "{\"body\":\"x\"}", "not json", "null"] {
            assert_eq!(
                InvocationResult::from_payload(payload),
                InvocationResult::failure(INVALID_RESPONSE_ERROR),
                "payload {payload}"
            );
        }
    }
}
