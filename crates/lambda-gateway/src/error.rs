//! Error types for the Lambda gateway.

use thiserror::Error;

/// Errors that can occur while starting or running the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Error binding to the specified address.
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    /// Error starting the HTTP server.
    #[error("Failed to start server: {0}")]
    ServerStart(String),

    /// A condition was not met in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration could not be loaded.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),
}

impl From<figment::Error> for GatewayError {
    fn from(err: figment::Error) -> Self {
        GatewayError::Config(Box::new(err))
    }
}

/// Errors returned by the runtime control surface.
///
/// These are contract violations on the worker side; none of them affect
/// invocations that are already queued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The worker slot still holds an invocation that has not been reported.
    #[error("Worker slot is busy with invocation {0}")]
    WorkerBusy(String),

    /// Another worker is already waiting for the next invocation.
    #[error("A worker is already waiting for the next invocation")]
    WorkerAlreadyWaiting,
}

/// Errors that can occur when enqueueing an invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    /// The pending queue is longer than the configured limit.
    #[error("Invocation queue is full (limit {limit})")]
    QueueFull {
        /// The configured queue limit.
        limit: usize,
    },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for runtime control operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
