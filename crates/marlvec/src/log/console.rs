//! Console logging backend.

use super::{MetricLogger, Metrics};

/// Logger that reports metrics as `tracing` events.
pub struct ConsoleLogger {
    prefix: String,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    /// Prepend `prefix/` to every metric name
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn qualified(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    /// Single-line rendering of a metric group
    pub fn format_metrics(&self, metrics: &Metrics, step: u64) -> String {
        let body: Vec<String> = metrics
            .iter()
            .map(|(name, value)| format!("{}={:.4}", self.qualified(name), value))
            .collect();
        format!("Step {}: {}", step, body.join(", "))
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        tracing::info!("Step {}: {} = {:.4}", step, self.qualified(name), value);
    }

    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        // one line per group
        tracing::info!("{}", self.format_metrics(metrics, step));
    }
}
