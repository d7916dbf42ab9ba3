//! Running a handler in process against the runtime control surface.
//!
//! [`run`] is the hosted-handler loop: it initializes the runtime, then pulls
//! invocations one at a time and reports each result. Every invocation runs
//! in its own task, so a panicking handler is reported as a fault instead of
//! taking the loop down with it.
//!
//! ```no_run
//! use lambda_gateway::{Gateway, handler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::builder().build().await?;
//! tokio::spawn(handler::run(gateway.control(), handler::status_ok));
//! # Ok(())
//! # }
//! ```

use crate::control::RuntimeControl;
use crate::error::RuntimeResult;
use crate::invocation::{InvocationContext, InvocationResult, ProxyResponse};
use std::any::Any;
use std::future::Future;
use thiserror::Error;

/// Error name reported when a handler task panics.
pub const PANIC_ERROR_NAME: &str = "Panic";

/// A failure raised by a handler.
///
/// Reported as a fault: the message and name go to the error stream and the
/// client gets an empty 500.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable message.
    pub message: String,
    /// Error class name, e.g. `TypeError`.
    pub name: Option<String>,
    /// Stack trace, if the handler has one.
    pub stack: Option<String>,
}

impl HandlerError {
    /// Creates an error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            stack: None,
        }
    }

    /// Sets the error name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::new(err.to_string()).with_name("SyntaxError")
    }
}

/// Runs `handler` for every invocation until the control surface refuses
/// to hand out another one.
///
/// The handler receives the invocation and a control handle it can use to
/// forward console output.
///
/// # Errors
///
/// Returns the error from [`RuntimeControl::next_invocation`] if another
/// worker is already attached to the same core.
pub async fn run<F, Fut>(control: RuntimeControl, handler: F) -> RuntimeResult<()>
where
    F: Fn(InvocationContext, RuntimeControl) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProxyResponse, HandlerError>> + Send + 'static,
{
    let base = control.init_runtime();
    control.report_done(
        &base.init_invoke_id,
        InvocationResult::success(ProxyResponse::new(200, "")),
    );

    loop {
        let invocation = control.next_invocation().await?;
        let invoke_id = invocation.invoke_id.clone();
        control.report_running(&invoke_id);

        let task = tokio::spawn(handler(invocation, control.clone()));

        match task.await {
            Ok(Ok(response)) => {
                control.report_done(&invoke_id, InvocationResult::success(response));
            }
            Ok(Err(e)) => {
                control.report_fault(
                    &invoke_id,
                    &e.message,
                    e.name.as_deref(),
                    e.stack.as_deref(),
                );
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(request_id = %invoke_id, "Handler panicked: {}", message);
                control.report_fault(&invoke_id, &message, Some(PANIC_ERROR_NAME), None);
            }
            Err(e) => {
                control.report_fault(&invoke_id, &e.to_string(), Some("Cancelled"), None);
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .unwrap_or_else(|| "handler panicked".to_string()),
    }
}

/// The bundled example handler: answers every request with
/// `{"status":"ok"}` as JSON.
pub async fn status_ok(
    _invocation: InvocationContext,
    _control: RuntimeControl,
) -> Result<ProxyResponse, HandlerError> {
    Ok(ProxyResponse::new(200, r#"{"status":"ok"}"#)
        .with_header("Content-Type", "application/json"))
}
