// Prometheus metrics for the evaluation service.
// Each AppState owns its registry so handlers stay testable in isolation.

use codegrade_common::types::SubmissionResult;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

pub struct Metrics {
    registry: Registry,
    evaluations_total: IntCounterVec,
    test_verdicts_total: IntCounterVec,
    evaluation_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let evaluations_total = IntCounterVec::new(
            Opts::new(
                "codegrade_evaluations_total",
                "Evaluations by outcome (passed, failed, halted, rejected)",
            ),
            &["outcome"],
        )?;
        let test_verdicts_total = IntCounterVec::new(
            Opts::new("codegrade_test_verdicts_total", "Test case verdicts by status"),
            &["status"],
        )?;
        let evaluation_duration = HistogramVec::new(
            HistogramOpts::new(
                "codegrade_evaluation_duration_seconds",
                "Wall-clock time spent evaluating one submission",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["language"],
        )?;

        registry.register(Box::new(evaluations_total.clone()))?;
        registry.register(Box::new(test_verdicts_total.clone()))?;
        registry.register(Box::new(evaluation_duration.clone()))?;

        Ok(Self {
            registry,
            evaluations_total,
            test_verdicts_total,
            evaluation_duration,
        })
    }

    pub fn record_result(&self, language: &str, result: &SubmissionResult, elapsed: Duration) {
        let outcome = if result.halted_early {
            "halted"
        } else if result.overall_passed {
            "passed"
        } else {
            "failed"
        };
        self.evaluations_total.with_label_values(&[outcome]).inc();

        for verdict in &result.verdicts {
            self.test_verdicts_total
                .with_label_values(&[verdict.status.as_str()])
                .inc();
        }

        self.evaluation_duration
            .with_label_values(&[language])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_rejected(&self) {
        self.evaluations_total.with_label_values(&["rejected"]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(passed: bool, halted: bool) -> SubmissionResult {
        SubmissionResult {
            verdicts: vec![],
            total_test_cases: 1,
            passed_test_cases: usize::from(passed),
            overall_passed: passed,
            score: if passed { 10 } else { 0 },
            max_score: 10,
            halted_early: halted,
            halt_reason: None,
        }
    }

    #[test]
    fn test_render_counts_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_result("python", &result(true, false), Duration::from_millis(300));
        metrics.record_result("python", &result(false, true), Duration::from_millis(300));
        metrics.record_rejected();

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"codegrade_evaluations_total{outcome="passed"} 1"#));
        assert!(text.contains(r#"codegrade_evaluations_total{outcome="halted"} 1"#));
        assert!(text.contains(r#"codegrade_evaluations_total{outcome="rejected"} 1"#));
        assert!(text.contains("codegrade_evaluation_duration_seconds_count{language=\"python\"} 2"));
    }
}
