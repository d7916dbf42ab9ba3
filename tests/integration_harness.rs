//! Integration test harness that runs the whole stack together:
//! - the gateway built from environment configuration
//! - an out-of-process style runtime talking to the Runtime API over HTTP
//! - HTTP clients hitting the front door
//!
//! This mirrors how the emulator is used locally: point a client at the
//! gateway and a Lambda runtime at `AWS_LAMBDA_RUNTIME_API`.

use lambda_gateway::{CaptureSink, Gateway, GatewayConfig, LogKind, handler};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use temp_env::async_with_vars;
use tokio::time::timeout;

/// A minimal runtime: polls `/next`, answers with the upper-cased path, and
/// fails any request to `/fail` through the error endpoint.
async fn run_external_runtime(
    runtime_api: String,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = Client::new();

    loop {
        let invocation = client
            .get(format!("{runtime_api}/2018-06-01/runtime/invocation/next"))
            .send()
            .await?;

        let request_id = invocation
            .headers()
            .get("Lambda-Runtime-Aws-Request-Id")
            .ok_or("Missing Lambda-Runtime-Aws-Request-Id header")?
            .to_str()?
            .to_string();

        let event: Value = invocation.json().await?;
        let path = event["path"].as_str().unwrap_or_default();

        if path == "/fail" {
            client
                .post(format!(
                    "{runtime_api}/2018-06-01/runtime/invocation/{request_id}/error"
                ))
                .json(&json!({"errorMessage": "failed on purpose", "errorType": "Error"}))
                .send()
                .await?;
            continue;
        }

        client
            .post(format!(
                "{runtime_api}/2018-06-01/runtime/invocation/{request_id}/response"
            ))
            .json(&json!({
                "statusCode": 200,
                "headers": {"Content-Type": "text/plain"},
                "body": path.to_uppercase()
            }))
            .send()
            .await?;
    }
}

#[tokio::test]
async fn test_gateway_from_environment_with_bundled_handler() {
    async_with_vars(
        [
            ("LAMBDA_GATEWAY_CONFIG", Some("/nonexistent/gateway.toml")),
            ("AWS_LAMBDA_FUNCTION_NAME", Some("harness")),
            ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", Some("512")),
            ("PORT", Some("0")),
            ("LAMBDA_GATEWAY_HOST", Some("127.0.0.1")),
        ],
        async {
            let config = GatewayConfig::load().expect("Failed to load configuration");
            assert_eq!(config.function_name, "harness");
            assert_eq!(config.memory_size_mb, 512);

            let sink = Arc::new(CaptureSink::new());
            let gateway = Gateway::builder()
                .config(config)
                .log_sink(sink.clone())
                .build()
                .await
                .expect("Failed to start gateway");

            tokio::spawn(handler::run(gateway.control(), handler::status_ok));

            let response = timeout(
                Duration::from_secs(5),
                Client::new().get(format!("{}/anything", gateway.url())).send(),
            )
            .await
            .expect("Request timed out")
            .expect("Request failed");

            assert_eq!(response.status(), 200);
            assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);

            gateway
                .wait_for(
                    |_| sink.contains(LogKind::System, "REPORT RequestId: "),
                    Duration::from_secs(5),
                )
                .await
                .expect("No REPORT line");
            assert!(sink.contains(LogKind::System, "\tMemory Size: 512 MB\t"));

            gateway.shutdown().await;
        },
    )
    .await;
}

#[tokio::test]
async fn test_external_runtime_serves_front_door() {
    let sink = Arc::new(CaptureSink::new());
    let gateway = Gateway::builder()
        .function_name("external")
        .runtime_api_port(0)
        .log_sink(sink.clone())
        .build()
        .await
        .expect("Failed to start gateway");

    let runtime_api = gateway.runtime_api_url().expect("Runtime API not served");
    let runtime = tokio::spawn(run_external_runtime(runtime_api));

    let client = Client::new();
    for path in ["/alpha", "/fail", "/beta/gamma"] {
        let response = timeout(
            Duration::from_secs(5),
            client.get(format!("{}{}", gateway.url(), path)).send(),
        )
        .await
        .expect("Request timed out")
        .expect("Request failed");

        if path == "/fail" {
            assert_eq!(response.status(), 500);
            assert_eq!(response.text().await.unwrap(), "");
        } else {
            assert_eq!(response.status(), 200);
            assert_eq!(response.headers()["content-type"], "text/plain");
            assert_eq!(response.text().await.unwrap(), path.to_uppercase());
        }
    }

    gateway
        .wait_for(
            |_| {
                sink.lines_of(LogKind::System)
                    .iter()
                    .filter(|line| line.starts_with("REPORT"))
                    .count()
                    == 2
            },
            Duration::from_secs(5),
        )
        .await
        .expect("Expected two REPORT lines");

    assert!(sink.contains(LogKind::Error, "failed on purpose: Error"));
    assert_eq!(
        sink.lines_of(LogKind::System)
            .iter()
            .filter(|line| line.starts_with("START"))
            .count(),
        3
    );

    runtime.abort();
    gateway.shutdown().await;
}
