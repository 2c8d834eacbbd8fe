//! Metrics registry for Tortoise VPA management
//!
//! Provides OpenTelemetry metrics for:
//! - VPA lifecycle operations (create, disable, delete, set-policy)
//! - Write conflicts resolved by retrying
//! - Monitor VPA readiness

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

/// Global meter for Tortoise metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("tortoise"));

/// Counter of VPA lifecycle operations
///
/// Labels:
/// - `operation`: create, disable, delete, set_policy
/// - `role`: monitor, updater
/// - `result`: success, skipped, error
pub static VPA_OPERATIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tortoise_vpa_operations_total")
        .with_description("Total number of VPA lifecycle operations")
        .with_unit("{operations}")
        .build()
});

/// Counter of write conflicts that triggered a refetch-and-retry
///
/// Labels:
/// - `operation`: name passed to the retry wrapper
pub static VPA_CONFLICT_RETRIES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tortoise_vpa_conflict_retries_total")
        .with_description("Total number of VPA write conflicts retried")
        .with_unit("{retries}")
        .build()
});

/// Gauge of monitor VPA readiness (1 = ready, 0 = not ready)
///
/// Labels:
/// - `tortoise`: namespace/name of the Tortoise
pub static MONITOR_VPA_READY: Lazy<Gauge<u64>> = Lazy::new(|| {
    METER
        .u64_gauge("tortoise_monitor_vpa_ready")
        .with_description("Whether the monitor VPA has a complete recommendation")
        .build()
});

/// Outcome of a VPA lifecycle operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The operation changed the VPA
    Success,
    /// The operation was a no-op (deletion policy, ownership, already gone)
    Skipped,
    /// The operation failed
    Error,
}

impl OperationResult {
    /// Label value for this result
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

/// Record a VPA lifecycle operation
pub fn record_vpa_operation(operation: &str, role: &str, result: OperationResult) {
    VPA_OPERATIONS.add(
        1,
        &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("role", role.to_string()),
            KeyValue::new("result", result.as_str()),
        ],
    );
}

/// Record a conflict that is about to be retried
pub fn record_conflict_retry(operation: &str) {
    VPA_CONFLICT_RETRIES.add(1, &[KeyValue::new("operation", operation.to_string())]);
}

/// Record the readiness of a Tortoise's monitor VPA
pub fn set_monitor_vpa_ready(tortoise: &str, ready: bool) {
    MONITOR_VPA_READY.record(
        u64::from(ready),
        &[KeyValue::new("tortoise", tortoise.to_string())],
    );
}
