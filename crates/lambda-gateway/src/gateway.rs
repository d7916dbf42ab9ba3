//! Gateway orchestration and builder.

use crate::config::GatewayConfig;
use crate::control::RuntimeControl;
use crate::error::{GatewayError, GatewayResult};
use crate::front_door::{FrontDoorState, create_front_door_router};
use crate::identity::BaseContext;
use crate::log_stream::{LogSink, StderrSink};
use crate::runtime_api::{RuntimeApiState, create_runtime_api_router};
use crate::state::RuntimeCore;
use axum::Router;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Builder for creating a gateway.
///
/// Without [`config`](Self::config), the gateway listens on a random port on
/// `127.0.0.1` and uses the default function identity.
///
/// # Examples
///
/// ```no_run
/// use lambda_gateway::Gateway;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = Gateway::builder()
///     .function_name("my-function")
///     .timeout(Duration::from_secs(30))
///     .queue_limit(10)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct GatewayBuilder {
    config: GatewayConfig,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            config: GatewayConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
                ..GatewayConfig::default()
            },
            log_sink: None,
        }
    }
}

impl GatewayBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration, including the listen address.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the front door to.
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    /// Sets the front door port. `0` picks a random free port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Serves the Lambda Runtime API on `port`. `0` picks a random free port.
    pub fn runtime_api_port(mut self, port: u16) -> Self {
        self.config.runtime_api_port = Some(port);
        self
    }

    /// Limits how many invocations may wait in the queue.
    pub fn queue_limit(mut self, limit: usize) -> Self {
        self.config.queue_limit = Some(limit);
        self
    }

    /// Sets the function name.
    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.config.function_name = name.into();
        self
    }

    /// Sets the function memory size in MB.
    pub fn memory_size_mb(mut self, memory: u32) -> Self {
        self.config.memory_size_mb = memory;
        self
    }

    /// Sets the invocation timeout. Sub-second precision is dropped.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_secs = timeout.as_secs();
        self
    }

    /// Sets where `START`/`END`/`REPORT`, error and console lines go.
    ///
    /// Defaults to [`StderrSink`].
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Binds the listeners and starts serving.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound.
    pub async fn build(self) -> GatewayResult<Gateway> {
        let base = Arc::new(BaseContext::from_config(&self.config));
        let log_sink = self.log_sink.unwrap_or_else(|| Arc::new(StderrSink));
        let core = RuntimeCore::new_shared(base.clone(), self.config.queue_limit, log_sink);
        let control = RuntimeControl::new(core.clone());

        let front_door_router = create_front_door_router(FrontDoorState { core: core.clone() });
        let (addr, server_handle) =
            serve(SocketAddr::new(self.config.host, self.config.port), front_door_router).await?;

        let runtime_api = match self.config.runtime_api_port {
            Some(port) => {
                let router = create_runtime_api_router(RuntimeApiState {
                    control: control.clone(),
                });
                match serve(SocketAddr::new(self.config.host, port), router).await {
                    Ok(served) => Some(served),
                    Err(e) => {
                        server_handle.abort();
                        let _ = server_handle.await;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        tracing::info!(
            function = %base.function_name,
            arn = %base.invoked_function_arn,
            "Listening on {}",
            addr
        );
        if let Some((runtime_api_addr, _)) = &runtime_api {
            tracing::info!("Runtime API listening on {}", runtime_api_addr);
        }

        let (runtime_api_addr, runtime_api_handle) = runtime_api.unzip();

        Ok(Gateway {
            core,
            control,
            addr,
            server_handle,
            runtime_api_addr,
            runtime_api_handle,
        })
    }
}

async fn serve(
    addr: SocketAddr,
    router: Router,
) -> GatewayResult<(SocketAddr, JoinHandle<GatewayResult<()>>)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::BindError(format!("{addr}: {e}")))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::ServerStart(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .map_err(|e| GatewayError::ServerStart(e.to_string()))
    });

    Ok((local_addr, handle))
}

/// A running gateway.
///
/// Every HTTP request to [`url`](Self::url) becomes an invocation that waits
/// until a handler reports a result through [`control`](Self::control) or the
/// Runtime API.
#[derive(Debug)]
pub struct Gateway {
    core: Arc<RuntimeCore>,
    control: RuntimeControl,
    addr: SocketAddr,
    server_handle: JoinHandle<GatewayResult<()>>,
    runtime_api_addr: Option<SocketAddr>,
    runtime_api_handle: Option<JoinHandle<GatewayResult<()>>>,
}

impl Gateway {
    /// Creates a new gateway builder.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// The socket address the front door is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the front door.
    ///
    /// An unspecified bind address is reported as `127.0.0.1`.
    pub fn url(&self) -> String {
        format!("http://{}", connectable(self.addr))
    }

    /// Base URL of the Runtime API, if it is served.
    pub fn runtime_api_url(&self) -> Option<String> {
        self.runtime_api_host_port()
            .map(|host_port| format!("http://{host_port}"))
    }

    /// `host:port` of the Runtime API, the form `AWS_LAMBDA_RUNTIME_API`
    /// expects.
    pub fn runtime_api_host_port(&self) -> Option<String> {
        self.runtime_api_addr
            .map(|addr| connectable(addr).to_string())
    }

    /// A handle for driving invocations in process.
    pub fn control(&self) -> RuntimeControl {
        self.control.clone()
    }

    /// The shared invocation state.
    pub fn core(&self) -> &Arc<RuntimeCore> {
        &self.core
    }

    /// The identity shared by all invocations.
    pub fn base(&self) -> &Arc<BaseContext> {
        self.core.base()
    }

    /// Environment for an out-of-process runtime attached to this gateway.
    #[must_use]
    pub fn lambda_env_vars(&self) -> HashMap<String, String> {
        self.base()
            .lambda_env_vars(self.runtime_api_host_port().as_deref())
    }

    /// Polls `condition` every 10 ms until it holds or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Timeout`] if the condition never held.
    pub async fn wait_for<F>(&self, condition: F, timeout: Duration) -> GatewayResult<()>
    where
        F: Fn(&RuntimeCore) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let poll_interval = Duration::from_millis(10);

        loop {
            if condition(&self.core) {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(GatewayError::Timeout(format!(
                    "Condition did not become true within {:?}",
                    timeout
                )));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Stops both listeners. Open requests are dropped.
    pub async fn shutdown(self) {
        self.server_handle.abort();
        let _ = self.server_handle.await;

        if let Some(handle) = self.runtime_api_handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

fn connectable(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}
