//! Lambda Runtime API endpoints over the runtime control surface.
//!
//! Lets an out-of-process runtime (anything built on the Lambda Runtime
//! Interface) act as the hosted handler. Documented at:
//! <https://docs.aws.amazon.com/lambda/latest/dg/runtimes-api.html>

use crate::control::RuntimeControl;
use crate::invocation::InvocationResult;
use crate::log_stream::LogKind;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value;

/// Largest result or error payload a runtime may post, matching Lambda's
/// synchronous response limit.
pub(crate) const MAX_PAYLOAD_BYTES: usize = 6 * 1024 * 1024;

/// Error type sent to the client when a posted result is over
/// [`MAX_PAYLOAD_BYTES`].
pub(crate) const RESPONSE_TOO_LARGE: &str = "Function.ResponseSizeTooLarge";

/// Shared state for Runtime API endpoints.
#[derive(Clone)]
pub(crate) struct RuntimeApiState {
    pub control: RuntimeControl,
}

/// Creates the Runtime API router.
pub(crate) fn create_runtime_api_router(state: RuntimeApiState) -> Router {
    Router::new()
        .route("/2018-06-01/runtime/invocation/next", get(next_invocation))
        .route(
            "/2018-06-01/runtime/invocation/{request_id}/response",
            post(invocation_response),
        )
        .route(
            "/2018-06-01/runtime/invocation/{request_id}/error",
            post(invocation_error),
        )
        .route("/2018-06-01/runtime/init/error", post(init_error))
        .fallback(|req: axum::extract::Request| async move {
            tracing::warn!(
                method = %req.method(),
                uri = %req.uri(),
                "Unhandled request"
            );
            StatusCode::NOT_FOUND
        })
        .with_state(state)
}

/// Helper function to safely insert a header value.
#[allow(clippy::result_large_err)]
fn safe_header_insert(
    headers: &mut HeaderMap,
    name: &'static str,
    value: impl AsRef<str>,
) -> Result<(), Response> {
    match HeaderValue::from_str(value.as_ref()) {
        Ok(header_value) => {
            headers.insert(name, header_value);
            Ok(())
        }
        Err(_) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create header {}", name),
        )
            .into_response()),
    }
}

/// GET /2018-06-01/runtime/invocation/next
///
/// Long-polls until an invocation is available. The first call also
/// initializes the runtime.
///
/// Returns 409 if the worker slot is busy or another runtime is already
/// polling.
async fn next_invocation(State(state): State<RuntimeApiState>) -> Response {
    state.control.init_runtime();

    let invocation = match state.control.next_invocation().await {
        Ok(invocation) => invocation,
        Err(e) => return (StatusCode::CONFLICT, e.to_string()).into_response(),
    };

    let remaining_ms =
        i64::try_from(state.control.remaining_time().as_millis()).unwrap_or(i64::MAX);
    let deadline_ms = Utc::now().timestamp_millis().saturating_add(remaining_ms);

    let mut headers = HeaderMap::new();

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Aws-Request-Id",
        &invocation.invoke_id,
    ) {
        return e;
    }

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Deadline-Ms",
        deadline_ms.to_string(),
    ) {
        return e;
    }

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Invoked-Function-Arn",
        &invocation.base.invoked_function_arn,
    ) {
        return e;
    }

    if let Err(e) = safe_header_insert(&mut headers, "Content-Type", "application/json") {
        return e;
    }

    (StatusCode::OK, headers, invocation.event_body).into_response()
}

/// POST /2018-06-01/runtime/invocation/:request_id/response
///
/// Reports a result. A body that is not a proxy response object completes
/// the HTTP request with a 500 carrying the error type. A body over
/// [`MAX_PAYLOAD_BYTES`] completes it with [`RESPONSE_TOO_LARGE`] and is
/// answered with 413.
///
/// Returns 404 if the request ID is unknown or already reported.
async fn invocation_response(
    State(state): State<RuntimeApiState>,
    Path(request_id): Path<String>,
    body: Body,
) -> Response {
    let (result, accepted) = match read_payload(body).await {
        Some(payload) => (InvocationResult::from_payload(&payload), StatusCode::ACCEPTED),
        None => {
            tracing::warn!(request_id = %request_id, "Response payload too large");
            (
                InvocationResult::failure(RESPONSE_TOO_LARGE),
                StatusCode::PAYLOAD_TOO_LARGE,
            )
        }
    };

    if !state.control.report_done(&request_id, result) {
        return unknown_request(&request_id);
    }

    accepted.into_response()
}

/// POST /2018-06-01/runtime/invocation/:request_id/error
///
/// Reports a handler fault. An unreadable or oversized body still faults the
/// invocation, with the default message.
///
/// Returns 404 if the request ID is unknown or already reported.
async fn invocation_error(
    State(state): State<RuntimeApiState>,
    Path(request_id): Path<String>,
    body: Body,
) -> Response {
    let error_payload = parse_error_payload(read_payload(body).await);

    let error_message = error_payload
        .get("errorMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error");

    let error_type = error_payload.get("errorType").and_then(|v| v.as_str());

    let stack_trace = error_payload
        .get("stackTrace")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        });

    if !state.control.report_fault(
        &request_id,
        error_message,
        error_type,
        stack_trace.as_deref(),
    ) {
        return unknown_request(&request_id);
    }

    StatusCode::ACCEPTED.into_response()
}

/// Buffers a posted payload up to [`MAX_PAYLOAD_BYTES`].
///
/// Returns `None` if the body is too large or cannot be read.
async fn read_payload(body: Body) -> Option<String> {
    match to_bytes(body, MAX_PAYLOAD_BYTES).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read runtime payload");
            None
        }
    }
}

// lambda_runtime doesn't always send a Content-Type header
fn parse_error_payload(payload: Option<String>) -> Value {
    payload
        .and_then(|body| serde_json::from_str(&body).ok())
        .unwrap_or(Value::Null)
}

fn unknown_request(request_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Unknown request ID: {}", request_id),
    )
        .into_response()
}

/// POST /2018-06-01/runtime/init/error
///
/// Reports an initialization error.
async fn init_error(State(state): State<RuntimeApiState>, body: Body) -> Response {
    let error_payload = parse_error_payload(read_payload(body).await);

    let error_type = error_payload
        .get("errorType")
        .and_then(|v| v.as_str())
        .unwrap_or("UnknownError");

    let error_message = error_payload
        .get("errorMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error");

    state
        .control
        .core()
        .log()
        .write(LogKind::Error, &format!("{}: {}", error_message, error_type));

    StatusCode::ACCEPTED.into_response()
}
