//! End-to-end tests for the HTTP front door with an in-process handler.

mod common;

use common::*;
use lambda_gateway::{
    Gateway, HandlerError, InvocationContext, LogKind, ProxyResponse, RuntimeControl,
};
use reqwest::Client;
use serde_json::Value;

#[tokio::test]
async fn test_get_request_becomes_proxy_event() {
    let (gateway, sink) = start_gateway(Gateway::builder()).await;
    let _runner = spawn_handler(&gateway, echo_event);

    let response = Client::new()
        .get(format!("{}/foo/bar", gateway.url()))
        .header("X-Test", "1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");

    let event: Value = response.json().await.unwrap();
    assert_eq!(event["resource"], "/{proxy+}");
    assert_eq!(event["path"], "/foo/bar");
    assert_eq!(event["pathParameters"]["proxy"], "foo/bar");
    assert_eq!(event["httpMethod"], "GET");
    assert_eq!(event["headers"]["x-test"], "1");
    assert_eq!(event["queryStringParameters"], Value::Null);
    assert_eq!(event["body"], "");
    assert_eq!(event["isBase64Encoded"], false);

    wait_for_reports(&gateway, &sink, 1).await;
    let start = system_lines(&sink, "START");
    let end = system_lines(&sink, "END");
    let report = system_lines(&sink, "REPORT");
    assert_eq!(start.len(), 1);
    assert!(start[0].ends_with(" Version: $LATEST"));
    assert_eq!(request_id_of(&start[0]), request_id_of(&end[0]));
    assert_eq!(request_id_of(&start[0]), request_id_of(&report[0]));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_post_body_and_query_string() {
    let (gateway, _sink) = start_gateway(Gateway::builder()).await;
    let _runner = spawn_handler(&gateway, echo_event);

    let event: Value = Client::new()
        .post(format!("{}/items?color=red&size=xl", gateway.url()))
        .body(r#"{"name":"widget"}"#)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(event["httpMethod"], "POST");
    assert_eq!(event["body"], r#"{"name":"widget"}"#);
    assert_eq!(event["queryStringParameters"]["color"], "red");
    assert_eq!(event["queryStringParameters"]["size"], "xl");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_handler_status_headers_and_body_are_forwarded() {
    let (gateway, _sink) = start_gateway(Gateway::builder()).await;
    let _runner = spawn_handler(&gateway, |_: InvocationContext, _: RuntimeControl| async {
        Ok::<_, HandlerError>(
            ProxyResponse::new(418, "short and stout")
                .with_header("X-Teapot", "yes")
                .with_header("Cache-Control", "no-store"),
        )
    });

    let response = Client::new()
        .delete(format!("{}/pot", gateway.url()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 418);
    assert_eq!(response.headers()["x-teapot"], "yes");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert!(response.headers().get("content-type").is_none());
    assert_eq!(response.text().await.unwrap(), "short and stout");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_bundled_handler_answers_ok() {
    let (gateway, sink) = start_gateway(Gateway::builder()).await;
    let _runner = spawn_handler(&gateway, lambda_gateway::handler::status_ok);

    let response = Client::new().get(gateway.url()).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);

    wait_for_reports(&gateway, &sink, 1).await;
    let report = &system_lines(&sink, "REPORT")[0];
    assert!(report.contains("\tBilled Duration: 100 ms\t"));
    assert!(report.contains("\tMemory Size: 1536 MB\t"));
    assert!(report.ends_with(" MB\t"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_console_output_reaches_log_stream() {
    let (gateway, sink) = start_gateway(Gateway::builder()).await;
    let _runner = spawn_handler(
        &gateway,
        |invocation: InvocationContext, control: RuntimeControl| async move {
            control.send_console_logs(&format!(
                "2024-01-01T00:00:00.000Z\t{}\thello\n",
                invocation.invoke_id
            ));
            Ok::<_, HandlerError>(ProxyResponse::new(204, ""))
        },
    );

    let response = Client::new().get(gateway.url()).send().await.unwrap();
    assert_eq!(response.status(), 204);

    assert!(sink.contains(LogKind::Console, "\thello\n"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_init_invocation_writes_no_report() {
    let (gateway, sink) = start_gateway(Gateway::builder()).await;
    let _runner = spawn_handler(&gateway, echo_event);

    let control = gateway.control();
    gateway
        .wait_for(|_| control.is_initialized(), SETTLE_TIMEOUT)
        .await
        .unwrap();
    gateway
        .wait_for(|core| core.is_worker_waiting(), SETTLE_TIMEOUT)
        .await
        .unwrap();

    assert!(system_lines(&sink, "REPORT").is_empty());
    assert!(system_lines(&sink, "END").is_empty());

    gateway.shutdown().await;
}
