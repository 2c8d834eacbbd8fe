//! Configuration for the VPA service

use tortoise_common::retry::RetryConfig;
use tortoise_common::DEFAULT_CONTROLLER_NAME;

/// Settings shared by every VPA lifecycle operation
#[derive(Clone, Debug)]
pub struct VpaServiceConfig {
    /// Budget for re-running a read-modify-write after a version conflict
    pub conflict_retry: RetryConfig,
    /// Reporting component on emitted events
    pub controller_name: String,
}

impl Default for VpaServiceConfig {
    fn default() -> Self {
        Self {
            conflict_retry: RetryConfig::conflict(),
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
        }
    }
}

impl VpaServiceConfig {
    /// Override the number of conflict attempts, keeping the default backoff.
    ///
    /// At least one attempt is always made.
    pub fn with_conflict_attempts(mut self, attempts: u32) -> Self {
        self.conflict_retry.max_attempts = attempts.max(1);
        self
    }

    /// Override the reporting component on emitted events
    pub fn with_controller_name(mut self, name: impl Into<String>) -> Self {
        self.controller_name = name.into();
        self
    }
}
