//! Counters for operators blocked by a scheduling limit.
//!
//! The controller only needs a single increment, keyed by the checker that
//! proposed the operator and the operator category. The sink is injected so
//! tests can observe increments without a process-wide registry.

use cairn_types::OperatorKind;
use prometheus::{IntCounterVec, Opts, Registry};

use crate::checker::CheckerKind;
use crate::error::Result;

/// Name of the exported limit counter.
pub const OPERATOR_LIMIT_METRIC: &str = "cairn_checker_operator_limit_total";

/// Sink for "operator blocked by limit" events.
pub trait LimitMetrics: Send + Sync {
    fn inc_limit_exceeded(&self, checker: CheckerKind, kind: OperatorKind);
}

/// Prometheus-backed limit counter labelled by `type` and `name`.
#[derive(Debug, Clone)]
pub struct PrometheusLimitMetrics {
    counter: IntCounterVec,
}

impl PrometheusLimitMetrics {
    /// Creates the counter and registers it with `registry`.
    pub fn new(registry: &Registry) -> Result<Self> {
        let counter = IntCounterVec::new(
            Opts::new(
                OPERATOR_LIMIT_METRIC,
                "Counter of operators the checkers could not schedule because of a limit.",
            ),
            &["type", "name"],
        )?;
        registry.register(Box::new(counter.clone()))?;
        Ok(Self { counter })
    }

    /// Registers with the process-wide default registry.
    pub fn with_default_registry() -> Result<Self> {
        Self::new(prometheus::default_registry())
    }

    /// Current value of the counter for one label pair.
    pub fn value(&self, checker: CheckerKind, kind: OperatorKind) -> u64 {
        self.counter
            .with_label_values(&[checker.type_label(), kind.as_str()])
            .get()
    }
}

impl LimitMetrics for PrometheusLimitMetrics {
    fn inc_limit_exceeded(&self, checker: CheckerKind, kind: OperatorKind) {
        self.counter
            .with_label_values(&[checker.type_label(), kind.as_str()])
            .inc();
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLimitMetrics;

impl LimitMetrics for NoopLimitMetrics {
    fn inc_limit_exceeded(&self, _checker: CheckerKind, _kind: OperatorKind) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_labelled_per_checker() {
        let registry = Registry::new();
        let metrics = PrometheusLimitMetrics::new(&registry).unwrap();

        metrics.inc_limit_exceeded(CheckerKind::Rule, OperatorKind::Replica);
        metrics.inc_limit_exceeded(CheckerKind::Rule, OperatorKind::Replica);
        metrics.inc_limit_exceeded(CheckerKind::Merge, OperatorKind::Merge);

        assert_eq!(metrics.value(CheckerKind::Rule, OperatorKind::Replica), 2);
        assert_eq!(metrics.value(CheckerKind::Replica, OperatorKind::Replica), 0);
        assert_eq!(metrics.value(CheckerKind::Merge, OperatorKind::Merge), 1);
    }

    #[test]
    fn registered_counter_is_exported() {
        let registry = Registry::new();
        let metrics = PrometheusLimitMetrics::new(&registry).unwrap();
        metrics.inc_limit_exceeded(CheckerKind::Replica, OperatorKind::Replica);

        let text = prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains(OPERATOR_LIMIT_METRIC));
        assert!(text.contains("type=\"replica-checker\""));
        assert!(text.contains("name=\"replica\""));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        let _first = PrometheusLimitMetrics::new(&registry).unwrap();
        assert!(PrometheusLimitMetrics::new(&registry).is_err());
    }
}
