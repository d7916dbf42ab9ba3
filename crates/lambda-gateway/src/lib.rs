//! # Lambda Gateway
//!
//! A local stand-in for API Gateway in front of a single Lambda-style
//! function runtime.
//!
//! ## Overview
//!
//! Every HTTP request to the gateway is turned into an API Gateway proxy
//! event and queued as one invocation. A single worker takes invocations in
//! arrival order and reports a result for each; the gateway answers the
//! waiting HTTP client with whatever the worker reported. The gateway also
//! writes the familiar `START`, `END` and `REPORT` lines for every
//! invocation.
//!
//! The worker can be:
//!
//! - an in-process handler driven by [`handler::run`]
//! - any Lambda runtime, connected to the Runtime API served when a
//!   runtime API port is configured
//! - your own code, pulling from [`RuntimeControl`] directly
//!
//! ## Quick Start
//!
//! ```no_run
//! use lambda_gateway::{Gateway, handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::builder()
//!         .function_name("my-function")
//!         .build()
//!         .await?;
//!
//!     tokio::spawn(handler::run(gateway.control(), handler::status_ok));
//!
//!     println!("Try: curl {}/hello", gateway.url());
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Driving invocations yourself
//!
//! ```no_run
//! use lambda_gateway::{Gateway, InvocationResult, ProxyResponse};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::builder().build().await?;
//! let control = gateway.control();
//! control.init_runtime();
//!
//! loop {
//!     let invocation = control.next_invocation().await?;
//!     control.report_running(&invocation.invoke_id);
//!     let response = ProxyResponse::new(200, invocation.event_body.clone());
//!     control.report_done(&invocation.invoke_id, InvocationResult::success(response));
//! }
//! # }
//! ```
//!
//! ## Queue limit
//!
//! With a queue limit configured, requests arriving while the queue is over
//! the limit are answered immediately with an empty 502 and never reach the
//! worker.

pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub(crate) mod front_door;
pub mod gateway;
pub mod handler;
pub mod identity;
pub mod invocation;
pub mod log_stream;
pub mod report;
pub(crate) mod runtime_api;
pub mod state;

pub use config::GatewayConfig;
pub use control::RuntimeControl;
pub use error::{EnqueueError, GatewayError, GatewayResult, RuntimeError, RuntimeResult};
pub use event::ProxyEvent;
pub use gateway::{Gateway, GatewayBuilder};
pub use handler::HandlerError;
pub use identity::BaseContext;
pub use invocation::{InvocationContext, InvocationResult, ProxyResponse};
pub use log_stream::{CaptureSink, LogKind, LogSink, StderrSink};
pub use state::{OVERFLOW_STATUS, RuntimeCore, SERVER_ERROR_STATUS};
