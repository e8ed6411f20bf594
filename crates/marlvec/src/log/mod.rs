//! Metric reporting for rollouts.
//!
//! Provides:
//! - `MetricLogger` trait for composable backends
//! - `ConsoleLogger` reporting through `tracing`
//! - `CompositeLogger` for multi-backend logging

mod console;
mod logger;

pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, MetricLogger, Metrics, NoOpLogger};
