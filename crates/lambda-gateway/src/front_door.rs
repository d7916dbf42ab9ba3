//! The HTTP front door: every inbound request becomes one invocation.

use crate::event::ProxyEvent;
use crate::invocation::{InvocationContext, ProxyResponse};
use crate::state::{OVERFLOW_STATUS, RuntimeCore, SERVER_ERROR_STATUS};
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Shared state for the front door.
#[derive(Clone)]
pub(crate) struct FrontDoorState {
    pub core: Arc<RuntimeCore>,
}

/// Creates the catch-all router.
pub(crate) fn create_front_door_router(state: FrontDoorState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

/// Accepts any method and path.
///
/// The body is read to completion before anything is queued. The response
/// is whatever the handler later reports for this invocation, or an
/// immediate overflow status if the queue is full.
async fn handle_request(State(state): State<FrontDoorState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    let event = ProxyEvent::from_request(&parts.method, &parts.uri, &parts.headers, &body);
    let context = InvocationContext::new(event.to_json(), state.core.base().clone());
    let request_id = context.invoke_id.clone();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "Request received"
    );

    let pending = match state.core.enqueue(context) {
        Ok(pending) => pending,
        Err(_) => return empty_response(OVERFLOW_STATUS),
    };

    match pending.await {
        Ok(response) => into_http_response(response),
        Err(_) => {
            tracing::error!(request_id = %request_id, "Response channel closed without a result");
            empty_response(SERVER_ERROR_STATUS)
        }
    }
}

fn empty_response(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Body::empty()).into_response()
}

/// Writes a handler-reported response.
///
/// Headers with names or values HTTP cannot carry are dropped with a
/// warning; an out-of-range status becomes 500.
pub(crate) fn into_http_response(response: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or_else(|_| {
        tracing::warn!(status = response.status_code, "Handler returned an invalid status");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid response header"),
        }
    }

    (status, headers, Body::from(response.body)).into_response()
}
