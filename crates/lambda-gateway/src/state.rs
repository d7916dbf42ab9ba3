//! The invocation queue, worker slot, and response registry.
//!
//! [`RuntimeCore`] owns all state shared between the HTTP front door and the
//! runtime control surface:
//!
//! - the FIFO queue of invocations waiting for the worker
//! - the single worker slot (idle, waiting, or busy with one invocation)
//! - the registry of open HTTP responses, keyed by invocation ID
//! - the start time of the running invocation
//!
//! Everything sits behind one mutex, so the inbound and outbound paths are
//! serialized against each other. The lock is never held across an `.await`.

use crate::error::{EnqueueError, RuntimeError, RuntimeResult};
use crate::identity::BaseContext;
use crate::invocation::{InvocationContext, ProxyResponse};
use crate::log_stream::{LogKind, LogSink};
use crate::report;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, oneshot};

/// Status written for a handler fault or an unusable result.
pub const SERVER_ERROR_STATUS: u16 = 500;

/// Status written when the queue is over its limit.
pub const OVERFLOW_STATUS: u16 = 502;

/// The receiving end of a registry entry, held by the front door until the
/// handler reports.
pub type PendingResponse = oneshot::Receiver<ProxyResponse>;

#[derive(Debug, Default)]
struct CoreState {
    queue: VecDeque<InvocationContext>,
    worker_waiting: bool,
    active: Option<String>,
    responses: HashMap<String, oneshot::Sender<ProxyResponse>>,
    start_times: HashMap<String, Instant>,
}

/// Shared state for one hosted function.
pub struct RuntimeCore {
    base: Arc<BaseContext>,
    queue_limit: Option<usize>,
    state: Mutex<CoreState>,
    invocation_available: Notify,
    log: Arc<dyn LogSink>,
}

impl std::fmt::Debug for RuntimeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeCore")
            .field("base", &self.base)
            .field("queue_limit", &self.queue_limit)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RuntimeCore {
    /// Creates an empty core.
    pub fn new(base: Arc<BaseContext>, queue_limit: Option<usize>, log: Arc<dyn LogSink>) -> Self {
        Self {
            base,
            queue_limit,
            state: Mutex::new(CoreState::default()),
            invocation_available: Notify::new(),
            log,
        }
    }

    /// Creates a new core wrapped in an `Arc`.
    pub fn new_shared(
        base: Arc<BaseContext>,
        queue_limit: Option<usize>,
        log: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self::new(base, queue_limit, log))
    }

    /// The identity shared by all invocations.
    pub fn base(&self) -> &Arc<BaseContext> {
        &self.base
    }

    /// The log stream.
    pub fn log(&self) -> &dyn LogSink {
        self.log.as_ref()
    }

    /// Registers a response channel for `context` and appends it to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::QueueFull`] when a queue limit is configured and
    /// the queue is already longer than it. Nothing is registered or queued in
    /// that case; the caller must answer with [`OVERFLOW_STATUS`] itself.
    pub fn enqueue(&self, context: InvocationContext) -> Result<PendingResponse, EnqueueError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();

            if let Some(limit) = self.queue_limit
                && state.queue.len() > limit
            {
                tracing::warn!(
                    request_id = %context.invoke_id,
                    queue_len = state.queue.len(),
                    limit,
                    "Rejecting invocation, queue is full"
                );
                return Err(EnqueueError::QueueFull { limit });
            }

            state.responses.insert(context.invoke_id.clone(), tx);
            state.queue.push_back(context);
        }

        self.invocation_available.notify_one();
        Ok(rx)
    }

    /// Waits for the next invocation and assigns it to the worker slot.
    ///
    /// Delivery is strictly FIFO. The start time is recorded here, not at
    /// enqueue, and a `START` line is written. Dropping the returned future
    /// before it resolves releases the waiting state without losing an
    /// invocation.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::WorkerBusy`] if the previous invocation has not been
    ///   reported yet
    /// - [`RuntimeError::WorkerAlreadyWaiting`] if another caller is already
    ///   waiting
    pub async fn next_invocation(&self) -> RuntimeResult<InvocationContext> {
        {
            let mut state = self.state.lock();
            if let Some(active) = &state.active {
                tracing::warn!(request_id = %active, "Worker asked for an invocation while busy");
                return Err(RuntimeError::WorkerBusy(active.clone()));
            }
            if state.worker_waiting {
                tracing::warn!("Ignoring second worker ready signal");
                return Err(RuntimeError::WorkerAlreadyWaiting);
            }
            state.worker_waiting = true;
        }

        let mut guard = WaitingGuard {
            core: self,
            armed: true,
        };

        loop {
            let notified = self.invocation_available.notified();

            if let Some(context) = self.try_assign() {
                guard.armed = false;
                self.log.write(
                    LogKind::System,
                    &report::start_line(&context.invoke_id, &self.base.function_version),
                );
                return Ok(context);
            }

            notified.await;
        }
    }

    fn try_assign(&self) -> Option<InvocationContext> {
        let mut state = self.state.lock();
        let mut context = state.queue.pop_front()?;

        let now = Instant::now();
        context.started_at = Some(now);
        state.start_times.insert(context.invoke_id.clone(), now);
        state.active = Some(context.invoke_id.clone());
        state.worker_waiting = false;

        tracing::debug!(request_id = %context.invoke_id, "Invocation assigned to worker");
        Some(context)
    }

    /// Completes the open response for `invoke_id`.
    ///
    /// Only the invocation held by the worker slot can be completed. Returns
    /// `false` without side effects for queued or unknown IDs and for
    /// repeated completions.
    pub fn complete(&self, invoke_id: &str, response: ProxyResponse) -> bool {
        let Some(tx) = self.take_active_response(invoke_id) else {
            return false;
        };

        if tx.send(response).is_err() {
            tracing::debug!(request_id = %invoke_id, "Client went away before the response");
        }
        true
    }

    /// Logs a fault and completes the response with an empty server error.
    ///
    /// Nothing is logged unless `invoke_id` is held by the worker slot and
    /// still has an open response.
    pub fn complete_with_fault(
        &self,
        invoke_id: &str,
        message: &str,
        error_name: Option<&str>,
        error_stack: Option<&str>,
    ) -> bool {
        let Some(tx) = self.take_active_response(invoke_id) else {
            return false;
        };

        let headline = match error_name {
            Some(name) if !name.is_empty() => format!("{message}: {name}"),
            _ => message.to_string(),
        };
        self.log.write(LogKind::Error, &headline);
        if let Some(stack) = error_stack.filter(|s| !s.is_empty()) {
            self.log.write(LogKind::Error, stack);
        }

        if tx.send(ProxyResponse::new(SERVER_ERROR_STATUS, "")).is_err() {
            tracing::debug!(request_id = %invoke_id, "Client went away before the fault");
        }
        true
    }

    fn take_active_response(&self, invoke_id: &str) -> Option<oneshot::Sender<ProxyResponse>> {
        let mut state = self.state.lock();
        if state.active.as_deref() != Some(invoke_id) {
            tracing::debug!(request_id = %invoke_id, "Invocation is not held by the worker");
            return None;
        }

        let tx = state.responses.remove(invoke_id);
        if tx.is_none() {
            tracing::debug!(request_id = %invoke_id, "No open response to complete");
        }
        tx
    }

    /// Clears the timing record for `invoke_id` and frees the worker slot if
    /// it holds that invocation.
    ///
    /// Returns how long the invocation ran, if it was running.
    pub fn finish(&self, invoke_id: &str) -> Option<Duration> {
        let mut state = self.state.lock();
        if state.active.as_deref() == Some(invoke_id) {
            state.active = None;
        }
        state
            .start_times
            .remove(invoke_id)
            .map(|started| started.elapsed())
    }

    /// Number of invocations waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of HTTP responses still open.
    pub fn open_responses(&self) -> usize {
        self.state.lock().responses.len()
    }

    /// ID of the invocation currently held by the worker slot.
    pub fn active_invocation(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    /// Whether a worker is currently waiting for an invocation.
    pub fn is_worker_waiting(&self) -> bool {
        self.state.lock().worker_waiting
    }
}

/// Resets the waiting flag when `next_invocation` is cancelled.
struct WaitingGuard<'a> {
    core: &'a RuntimeCore,
    armed: bool,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.core.state.lock().worker_waiting = false;
        }
    }
}
