//! The runtime control surface used by the hosted handler.

use crate::error::RuntimeResult;
use crate::identity::BaseContext;
use crate::invocation::{InvocationContext, InvocationResult, ProxyResponse};
use crate::log_stream::LogKind;
use crate::report::{self, ReportMetrics};
use crate::state::{RuntimeCore, SERVER_ERROR_STATUS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Handle through which a handler pulls invocations and reports results.
///
/// Cheap to clone; every clone drives the same [`RuntimeCore`].
#[derive(Debug, Clone)]
pub struct RuntimeControl {
    core: Arc<RuntimeCore>,
    initialized: Arc<AtomicBool>,
}

impl RuntimeControl {
    /// Creates a control handle for `core`.
    pub fn new(core: Arc<RuntimeCore>) -> Self {
        Self {
            core,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks the runtime as up and returns the shared context template.
    ///
    /// The HTTP listener is already bound when the gateway is built; calling
    /// this more than once just returns the same template.
    pub fn init_runtime(&self) -> Arc<BaseContext> {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                function = %self.core.base().function_name,
                init_invoke_id = %self.core.base().init_invoke_id,
                "Runtime initialized"
            );
        }
        self.core.base().clone()
    }

    /// Whether [`init_runtime`](Self::init_runtime) has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Waits for the next invocation.
    ///
    /// # Errors
    ///
    /// Fails if the worker slot is still busy or another caller is already
    /// waiting. See [`RuntimeCore::next_invocation`].
    pub async fn next_invocation(&self) -> RuntimeResult<InvocationContext> {
        self.core.next_invocation().await
    }

    /// Lifecycle hook; currently does nothing.
    pub fn report_running(&self, invoke_id: &str) {
        tracing::trace!(request_id = %invoke_id, "Invocation running");
    }

    /// Reports that the handler finished an invocation.
    ///
    /// The reserved init ID is ignored. Otherwise the HTTP response is
    /// completed from `result`, then the `END` and `REPORT` lines are written
    /// if the invocation was running.
    ///
    /// Returns `true` if this call completed a response or finished a running
    /// invocation, `false` if the ID is not held by the worker slot (unknown,
    /// still queued, or already reported).
    pub fn report_done(&self, invoke_id: &str, result: InvocationResult) -> bool {
        let base = self.core.base();
        if invoke_id == base.init_invoke_id {
            tracing::debug!("Init invocation reported done");
            return false;
        }

        let response = match result {
            InvocationResult::Success(response) => response,
            InvocationResult::Failure { error_type } => {
                ProxyResponse::new(SERVER_ERROR_STATUS, error_type)
            }
        };
        let completed = self.core.complete(invoke_id, response);

        let Some(elapsed) = self.core.finish(invoke_id) else {
            return completed;
        };

        let metrics = ReportMetrics::new(elapsed, base.timeout_ms(), base.memory_size_mb);
        let log = self.core.log();
        log.write(LogKind::System, &report::end_line(invoke_id));
        log.write(LogKind::System, &report::report_line(invoke_id, &metrics));

        tracing::debug!(
            request_id = %invoke_id,
            duration_ms = metrics.duration_ms,
            billed_duration_ms = metrics.billed_duration_ms,
            "Invocation done"
        );
        true
    }

    /// Reports that the handler failed an invocation.
    ///
    /// The fault is written to the error stream and the HTTP response is
    /// completed with an empty 500. Timing state is always cleared. IDs not
    /// held by the worker slot are ignored.
    pub fn report_fault(
        &self,
        invoke_id: &str,
        message: &str,
        error_name: Option<&str>,
        error_stack: Option<&str>,
    ) -> bool {
        let completed = self
            .core
            .complete_with_fault(invoke_id, message, error_name, error_stack);
        let finished = self.core.finish(invoke_id).is_some();

        tracing::debug!(request_id = %invoke_id, completed, "Invocation faulted");
        completed || finished
    }

    /// Time left for the current invocation.
    ///
    /// This is the configured timeout, not a countdown.
    pub fn remaining_time(&self) -> Duration {
        self.core.base().timeout
    }

    /// Forwards function output to the log stream.
    pub fn send_console_logs(&self, text: &str) {
        self.core.log().write(LogKind::Console, text);
    }

    /// The core this handle drives.
    pub fn core(&self) -> &Arc<RuntimeCore> {
        &self.core
    }
}
