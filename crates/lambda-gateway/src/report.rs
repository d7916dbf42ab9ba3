//! Duration accounting and the START/END/REPORT system lines.

use std::time::Duration;

/// Billing granularity in milliseconds.
const BILLING_INCREMENT_MS: u64 = 100;

/// Metrics reported when an invocation completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMetrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Billed duration in milliseconds.
    pub billed_duration_ms: u64,
    /// Configured memory in MB.
    pub memory_size_mb: u32,
    /// Peak resident memory of this process in MB.
    pub max_memory_used_mb: u64,
}

impl ReportMetrics {
    /// Computes the metrics for an invocation that ran for `elapsed`.
    pub fn new(elapsed: Duration, timeout_ms: u64, memory_size_mb: u32) -> Self {
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        Self {
            duration_ms,
            billed_duration_ms: billed_duration_ms(duration_ms, timeout_ms),
            memory_size_mb,
            max_memory_used_mb: peak_resident_memory_mb(),
        }
    }
}

/// Rounds a duration up to the next 100 ms boundary, capped at the timeout.
///
/// An exact multiple of 100 ms still moves to the following boundary.
///
/// ```
/// use lambda_gateway::report::billed_duration_ms;
///
/// assert_eq!(billed_duration_ms(137.4, 300_000), 200);
/// assert_eq!(billed_duration_ms(0.2, 300_000), 100);
/// assert_eq!(billed_duration_ms(4_050.0, 3_000), 3_000);
/// ```
pub fn billed_duration_ms(duration_ms: f64, timeout_ms: u64) -> u64 {
    let whole_increments = (duration_ms.max(0.0) / BILLING_INCREMENT_MS as f64).floor() as u64;
    whole_increments
        .saturating_add(1)
        .saturating_mul(BILLING_INCREMENT_MS)
        .min(timeout_ms)
}

/// `START RequestId: <id> Version: <version>`
pub fn start_line(invoke_id: &str, version: &str) -> String {
    format!("START RequestId: {invoke_id} Version: {version}")
}

/// `END RequestId: <id>`
pub fn end_line(invoke_id: &str) -> String {
    format!("END RequestId: {invoke_id}")
}

/// The tab-separated REPORT line, including its trailing tab.
pub fn report_line(invoke_id: &str, metrics: &ReportMetrics) -> String {
    [
        format!("REPORT RequestId: {invoke_id}"),
        format!("Duration: {:.2} ms", metrics.duration_ms),
        format!("Billed Duration: {} ms", metrics.billed_duration_ms),
        format!("Memory Size: {} MB", metrics.memory_size_mb),
        format!("Max Memory Used: {} MB", metrics.max_memory_used_mb),
        String::new(),
    ]
    .join("\t")
}

/// Peak resident set size of the current process, rounded to MB.
#[cfg(target_os = "linux")]
pub fn peak_resident_memory_mb() -> u64 {
    let peak_kb = procfs::process::Process::myself()
        .and_then(|process| process.status())
        .ok()
        .and_then(|status| status.vmhwm.or(status.vmrss));

    match peak_kb {
        Some(kb) => (kb + 512) / 1024,
        None => 0,
    }
}

/// Peak resident set size of the current process, rounded to MB.
#[cfg(not(target_os = "linux"))]
pub fn peak_resident_memory_mb() -> u64 {
    0
}
