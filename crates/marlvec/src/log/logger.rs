//! Metric logger traits and composites.

use std::collections::BTreeMap;

/// Named scalar metrics, iterated in name order
pub type Metrics = BTreeMap<String, f64>;

/// Sink for rollout metrics.
pub trait MetricLogger: Send + Sync {
    /// Log a scalar value (e.g. mean reward).
    fn log_scalar(&self, name: &str, value: f64, step: u64);

    /// Log a group of metrics recorded at the same step.
    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        for (name, value) in metrics {
            self.log_scalar(name, *value, step);
        }
    }

    /// Flush any pending output.
    fn close(&self) {}
}

/// A logger that does nothing (default).
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn log_scalar(&self, _name: &str, _value: f64, _step: u64) {}
    fn log_metrics(&self, _metrics: &Metrics, _step: u64) {}
}

/// Dispatches to multiple backends.
#[derive(Default)]
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricLogger for CompositeLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        for logger in &self.loggers {
            logger.log_scalar(name, value, step);
        }
    }

    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        for logger in &self.loggers {
            logger.log_metrics(metrics, step);
        }
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(String, u64)>>>);

    impl MetricLogger for Recorder {
        fn log_scalar(&self, name: &str, _value: f64, step: u64) {
            self.0.lock().unwrap().push((name.to_string(), step));
        }
    }

    #[test]
    fn test_composite_fans_out_in_name_order() {
        let first = Recorder::default();
        let second = Recorder::default();
        let mut logger = CompositeLogger::new(vec![Box::new(first.clone())]);
        logger.add(Box::new(second.clone()));
        logger.add(Box::new(NoOpLogger));
        assert_eq!(logger.len(), 3);

        let metrics: Metrics = [("reward".to_string(), 1.0), ("done".to_string(), 0.5)]
            .into_iter()
            .collect();
        logger.log_metrics(&metrics, 7);

        let expected = vec![("done".to_string(), 7), ("reward".to_string(), 7)];
        assert_eq!(*first.0.lock().unwrap(), expected);
        assert_eq!(*second.0.lock().unwrap(), expected);
    }
}
