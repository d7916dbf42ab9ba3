//! Shared test utilities for lambda-gateway integration tests.

#![allow(dead_code)]

use lambda_gateway::{
    CaptureSink, Gateway, GatewayBuilder, HandlerError, InvocationContext, LogKind, ProxyResponse,
    RuntimeControl, handler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long tests wait for asynchronous state to settle.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds and starts a gateway that logs into a capture sink.
pub async fn start_gateway(builder: GatewayBuilder) -> (Gateway, Arc<CaptureSink>) {
    let sink = Arc::new(CaptureSink::new());
    let gateway = builder
        .log_sink(sink.clone())
        .build()
        .await
        .expect("Failed to start gateway");
    (gateway, sink)
}

/// Runs `handler` in process against `gateway`.
pub fn spawn_handler<F, Fut>(gateway: &Gateway, handler: F) -> JoinHandle<()>
where
    F: Fn(InvocationContext, RuntimeControl) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ProxyResponse, HandlerError>> + Send + 'static,
{
    let control = gateway.control();
    tokio::spawn(async move {
        let _ = handler::run(control, handler).await;
    })
}

/// Answers every invocation with its own event as a JSON body.
pub async fn echo_event(
    invocation: InvocationContext,
    _control: RuntimeControl,
) -> Result<ProxyResponse, HandlerError> {
    Ok(ProxyResponse::new(200, invocation.event_body)
        .with_header("Content-Type", "application/json"))
}

/// System lines starting with `prefix`, e.g. `"START"`.
pub fn system_lines(sink: &CaptureSink, prefix: &str) -> Vec<String> {
    sink.lines_of(LogKind::System)
        .into_iter()
        .filter(|line| line.starts_with(prefix))
        .collect()
}

/// Waits until `count` REPORT lines have been written.
pub async fn wait_for_reports(gateway: &Gateway, sink: &CaptureSink, count: usize) {
    gateway
        .wait_for(
            |_| system_lines(sink, "REPORT").len() >= count,
            SETTLE_TIMEOUT,
        )
        .await
        .expect("REPORT lines were not written");
}

/// Extracts the request ID from a `START`, `END` or `REPORT` line.
pub fn request_id_of(line: &str) -> &str {
    line.split("RequestId: ")
        .nth(1)
        .and_then(|rest| rest.split(['\t', ' ']).next())
        .unwrap_or_default()
}
