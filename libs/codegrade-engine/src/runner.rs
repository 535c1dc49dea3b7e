//! Test Case Runner
//!
//! Runs the test cases of one submission strictly in order, one execution
//! call at a time, and turns each outcome into a verdict.
//!
//! **Stop rules:**
//! - Compile error: stop right after recording that verdict
//! - Cancellation: checked before each test case
//! - Submission budget exhausted: no further test case is started, and a
//!   call cut short by the budget is dropped without a verdict
//!
//! Transport failures and per-call timeouts are recorded as failed verdicts
//! and the run continues.

use crate::client::{looks_like_compile_error, ExecutionClient};
use crate::error::ExecutionError;
use crate::normalizer::outputs_match;
use codegrade_common::types::{
    ExecutionOutcome, ExitSignal, HaltReason, Language, TestCase, TestVerdict, VerdictStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-run limits owned by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    /// No test case is started at or after this instant
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl RunControl {
    pub fn with_budget(budget: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Some(Instant::now() + budget),
            cancel,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub verdicts: Vec<TestVerdict>,
    /// Some test cases were never executed
    pub halted_early: bool,
    pub halt_reason: Option<HaltReason>,
}

pub struct TestCaseRunner {
    client: Arc<dyn ExecutionClient>,
    test_timeout: Duration,
}

impl TestCaseRunner {
    pub fn new(client: Arc<dyn ExecutionClient>, test_timeout: Duration) -> Self {
        Self {
            client,
            test_timeout,
        }
    }

    /// Execute `test_cases` in order against the submission.
    ///
    /// Only `ExecutionError::LanguageUnsupported` on the first test case is
    /// returned as an error. Reported later, it is recorded like a transport
    /// failure so the verdicts already gathered are kept.
    pub async fn run(
        &self,
        source_code: &str,
        language: &Language,
        version: &str,
        test_cases: &[TestCase],
        control: &RunControl,
    ) -> Result<RunOutcome, ExecutionError> {
        let mut verdicts = Vec::with_capacity(test_cases.len());
        let mut halt = None;

        for (idx, test_case) in test_cases.iter().enumerate() {
            if control.cancel.is_cancelled() {
                warn!(
                    completed = idx,
                    total = test_cases.len(),
                    "Evaluation cancelled, stopping before next test case"
                );
                halt = Some(HaltReason::Cancelled);
                break;
            }

            let call_timeout = match control.remaining() {
                Some(remaining) if remaining.is_zero() => {
                    warn!(
                        completed = idx,
                        total = test_cases.len(),
                        "Submission time budget exhausted"
                    );
                    halt = Some(HaltReason::BudgetExhausted);
                    break;
                }
                Some(remaining) => remaining.min(self.test_timeout),
                None => self.test_timeout,
            };
            let cut_by_budget = call_timeout < self.test_timeout;

            let started = Instant::now();
            let call = self
                .client
                .execute(language, version, source_code, &test_case.input);

            let verdict = match tokio::time::timeout(call_timeout, call).await {
                Ok(Ok(outcome)) => judge(test_case, outcome),
                Ok(Err(ExecutionError::Unavailable(message))) => {
                    warn!(
                        test_id = %test_case.id,
                        provider = self.client.name(),
                        error = %message,
                        "Execution service unavailable for test case"
                    );
                    unavailable(test_case, &message)
                }
                Ok(Err(err @ ExecutionError::LanguageUnsupported { .. })) => {
                    if idx == 0 {
                        return Err(err);
                    }
                    warn!(
                        test_id = %test_case.id,
                        provider = self.client.name(),
                        error = %err,
                        "Provider rejected the language mid-run"
                    );
                    unavailable(test_case, &err.to_string())
                }
                Err(_) if cut_by_budget => {
                    warn!(
                        test_id = %test_case.id,
                        completed = idx,
                        total = test_cases.len(),
                        "Submission time budget exhausted during execution call"
                    );
                    halt = Some(HaltReason::BudgetExhausted);
                    break;
                }
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    warn!(
                        test_id = %test_case.id,
                        timeout_ms = call_timeout.as_millis() as u64,
                        "Execution call timed out"
                    );
                    judge(test_case, ExecutionOutcome::timeout(waited_ms))
                }
            };

            debug!(
                test_num = idx + 1,
                test_id = %verdict.test_case_id,
                status = %verdict.status,
                wall_time_ms = verdict.wall_time_ms,
                "Test case judged"
            );

            let compile_failed = verdict.status == VerdictStatus::CompileError;
            verdicts.push(verdict);

            if compile_failed {
                warn!(
                    test_id = %test_case.id,
                    skipped = test_cases.len() - verdicts.len(),
                    "Compilation failed, skipping remaining test cases"
                );
                halt = Some(HaltReason::CompileError);
                break;
            }
        }

        let halted_early = verdicts.len() < test_cases.len();
        Ok(RunOutcome {
            verdicts,
            halted_early,
            halt_reason: if halted_early { halt } else { None },
        })
    }
}

/// Exit signal after applying the stderr heuristic for providers that do not
/// flag compile errors themselves
pub fn effective_signal(outcome: &ExecutionOutcome) -> ExitSignal {
    match outcome.exit_signal {
        ExitSignal::Normal | ExitSignal::RuntimeError if looks_like_compile_error(&outcome.stderr) => {
            ExitSignal::CompileError
        }
        signal => signal,
    }
}

/// Judge one execution outcome against its test case.
///
/// A test passes only when the normalized outputs are equal, stderr is
/// empty, and the program exited normally.
pub fn judge(test_case: &TestCase, outcome: ExecutionOutcome) -> TestVerdict {
    let (status, error_message) = match effective_signal(&outcome) {
        ExitSignal::CompileError => (
            VerdictStatus::CompileError,
            with_details("Compilation error", &outcome.stderr),
        ),
        ExitSignal::Timeout => (
            VerdictStatus::TimeLimitExceeded,
            format!("Time limit exceeded after {} ms", outcome.wall_time_ms),
        ),
        ExitSignal::RuntimeError => {
            let head = match outcome.exit_code {
                Some(code) => format!("Runtime error (exit code {})", code),
                None => "Runtime error".to_string(),
            };
            (VerdictStatus::RuntimeError, with_details(&head, &outcome.stderr))
        }
        ExitSignal::Normal => {
            if !outputs_match(&outcome.stdout, &test_case.expected_output) {
                (VerdictStatus::WrongAnswer, "Output mismatch".to_string())
            } else if !outcome.stderr.is_empty() {
                (
                    VerdictStatus::WrongAnswer,
                    with_details("Unexpected output on stderr", &outcome.stderr),
                )
            } else {
                (VerdictStatus::Passed, String::new())
            }
        }
    };

    TestVerdict {
        test_case_id: test_case.id.clone(),
        passed: status == VerdictStatus::Passed,
        status,
        actual_output: outcome.stdout,
        expected_output: test_case.expected_output.clone(),
        error_message,
        explanation: test_case.explanation.clone(),
        wall_time_ms: outcome.wall_time_ms,
        memory_kb: outcome.memory_kb,
        is_hidden: test_case.is_hidden,
    }
}

fn unavailable(test_case: &TestCase, message: &str) -> TestVerdict {
    TestVerdict {
        test_case_id: test_case.id.clone(),
        passed: false,
        status: VerdictStatus::ExecutionUnavailable,
        actual_output: String::new(),
        expected_output: test_case.expected_output.clone(),
        error_message: format!("Execution service unavailable: {}", message),
        explanation: test_case.explanation.clone(),
        wall_time_ms: 0,
        memory_kb: 0,
        is_hidden: test_case.is_hidden,
    }
}

fn with_details(head: &str, details: &str) -> String {
    let details = details.trim();
    if details.is_empty() {
        head.to_string()
    } else {
        format!("{}: {}", head, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ScriptedClient, ScriptedResponse};

    fn cases(n: usize) -> Vec<TestCase> {
        (1..=n)
            .map(|i| TestCase::new(format!("t{}", i), i.to_string(), (i * 2).to_string()))
            .collect()
    }

    fn doubler() -> ScriptedClient {
        ScriptedClient::responder(|stdin| {
            let n: usize = stdin.trim().parse().unwrap_or(0);
            ExecutionOutcome::normal(format!("{}\n", n * 2)).into()
        })
    }

    async fn run_with(client: ScriptedClient, test_cases: &[TestCase], control: &RunControl) -> RunOutcome {
        TestCaseRunner::new(Arc::new(client), Duration::from_secs(5))
            .run("src", &"python".into(), "3.10.0", test_cases, control)
            .await
            .unwrap()
    }

    #[test]
    fn test_judge_exact_match() {
        let verdict = judge(
            &TestCase::new("1", "5", "120"),
            ExecutionOutcome::normal("120\n").with_metrics(42, 512),
        );
        assert!(verdict.passed);
        assert_eq!(verdict.status, VerdictStatus::Passed);
        assert!(verdict.error_message.is_empty());
        assert_eq!(verdict.actual_output, "120\n");
        assert_eq!(verdict.wall_time_ms, 42);
        assert_eq!(verdict.memory_kb, 512);
    }

    #[test]
    fn test_judge_mismatch() {
        let verdict = judge(&TestCase::new("1", "", "expected"), ExecutionOutcome::normal("actual"));
        assert!(!verdict.passed);
        assert_eq!(verdict.status, VerdictStatus::WrongAnswer);
        assert_eq!(verdict.error_message, "Output mismatch");
    }

    #[test]
    fn test_judge_stderr_fails_matching_output() {
        let outcome = ExecutionOutcome::normal("ok").with_stderr("warning: deprecated call");
        let verdict = judge(&TestCase::new("1", "", "ok"), outcome);
        assert!(!verdict.passed);
        assert!(verdict.error_message.contains("deprecated call"));
    }

    #[test]
    fn test_judge_runtime_error() {
        let outcome = ExecutionOutcome::runtime_error("ZeroDivisionError: division by zero\n", 1);
        let verdict = judge(&TestCase::new("1", "", "0"), outcome);
        assert_eq!(verdict.status, VerdictStatus::RuntimeError);
        assert_eq!(
            verdict.error_message,
            "Runtime error (exit code 1): ZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn test_judge_heuristic_compile_error() {
        let outcome = ExecutionOutcome::runtime_error("error: compilation failed", 1);
        let verdict = judge(&TestCase::new("1", "", "0"), outcome);
        assert_eq!(verdict.status, VerdictStatus::CompileError);
    }

    #[test]
    fn test_judge_timeout_keeps_explanation() {
        let test_case = TestCase::new("1", "", "0").with_explanation("loops forever otherwise");
        let verdict = judge(&test_case, ExecutionOutcome::timeout(5000));
        assert_eq!(verdict.status, VerdictStatus::TimeLimitExceeded);
        assert_eq!(verdict.error_message, "Time limit exceeded after 5000 ms");
        assert_eq!(verdict.explanation.as_deref(), Some("loops forever otherwise"));
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let client = Arc::new(doubler());
        let runner = TestCaseRunner::new(client.clone(), Duration::from_secs(5));
        let test_cases = cases(4);

        let outcome = runner
            .run("src", &"python".into(), "3.10.0", &test_cases, &RunControl::default())
            .await
            .unwrap();

        assert!(!outcome.halted_early);
        assert_eq!(outcome.halt_reason, None);
        let ids: Vec<_> = outcome.verdicts.iter().map(|v| v.test_case_id.to_string()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "t4"]);
        let stdins: Vec<_> = client.calls().into_iter().map(|c| c.stdin).collect();
        assert_eq!(stdins, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_compile_error_stops_run() {
        let client = ScriptedClient::new(vec![
            ExecutionOutcome::normal("2").into(),
            ExecutionOutcome::compile_error("Main.java:1: error").into(),
            ExecutionOutcome::normal("6").into(),
        ]);

        let outcome = run_with(client, &cases(3), &RunControl::default()).await;

        assert_eq!(outcome.verdicts.len(), 2);
        assert!(outcome.halted_early);
        assert_eq!(outcome.halt_reason, Some(HaltReason::CompileError));
    }

    #[tokio::test]
    async fn test_compile_error_on_last_case_is_not_a_halt() {
        let client = ScriptedClient::new(vec![
            ExecutionOutcome::normal("2").into(),
            ExecutionOutcome::compile_error("boom").into(),
        ]);

        let outcome = run_with(client, &cases(2), &RunControl::default()).await;

        assert_eq!(outcome.verdicts.len(), 2);
        assert!(!outcome.halted_early);
        assert_eq!(outcome.halt_reason, None);
    }

    #[tokio::test]
    async fn test_unavailable_does_not_stop_run() {
        let client = ScriptedClient::new(vec![
            ScriptedResponse::Unavailable("connection refused".into()),
            ExecutionOutcome::normal("4").into(),
        ]);

        let outcome = run_with(client, &cases(2), &RunControl::default()).await;

        assert_eq!(outcome.verdicts.len(), 2);
        assert_eq!(outcome.verdicts[0].status, VerdictStatus::ExecutionUnavailable);
        assert!(outcome.verdicts[0].error_message.contains("connection refused"));
        assert!(outcome.verdicts[1].passed);
    }

    #[tokio::test]
    async fn test_unsupported_language_rejects_run() {
        let client = ScriptedClient::new(vec![ScriptedResponse::Unsupported]);
        let err = TestCaseRunner::new(Arc::new(client), Duration::from_secs(5))
            .run("src", &"cobol".into(), "1", &cases(2), &RunControl::default())
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::unsupported("cobol"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_recorded_and_run_continues() {
        let client = ScriptedClient::new(vec![
            ScriptedResponse::delayed(Duration::from_secs(60), ExecutionOutcome::normal("2").into()),
            ExecutionOutcome::normal("4").into(),
        ]);

        let outcome = run_with(client, &cases(2), &RunControl::default()).await;

        assert_eq!(outcome.verdicts[0].status, VerdictStatus::TimeLimitExceeded);
        assert_eq!(outcome.verdicts[0].wall_time_ms, 5000);
        assert!(outcome.verdicts[1].passed);
        assert!(!outcome.halted_early);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let control = RunControl {
            deadline: None,
            cancel,
        };

        let outcome = run_with(doubler(), &cases(3), &control).await;

        assert!(outcome.verdicts.is_empty());
        assert!(outcome.halted_early);
        assert_eq!(outcome.halt_reason, Some(HaltReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_keeps_gathered_verdicts() {
        let slow = |out: &str| {
            ScriptedResponse::delayed(Duration::from_secs(2), ExecutionOutcome::normal(out).into())
        };
        let client = ScriptedClient::new(vec![slow("2"), slow("4"), slow("6")]);
        let control = RunControl::with_budget(Duration::from_secs(3), CancellationToken::new());

        let outcome = run_with(client, &cases(3), &control).await;

        // second call is cut at the budget boundary and gets no verdict
        assert_eq!(outcome.verdicts.len(), 1);
        assert!(outcome.verdicts[0].passed);
        assert!(outcome.halted_early);
        assert_eq!(outcome.halt_reason, Some(HaltReason::BudgetExhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_cut_on_last_case_is_a_halt() {
        let slow = |out: &str| {
            ScriptedResponse::delayed(Duration::from_secs(7), ExecutionOutcome::normal(out).into())
        };
        let client = ScriptedClient::new(vec![slow("2"), slow("4")]);
        let control = RunControl::with_budget(Duration::from_secs(12), CancellationToken::new());

        let outcome = TestCaseRunner::new(Arc::new(client), Duration::from_secs(10))
            .run("src", &"python".into(), "3.10.0", &cases(2), &control)
            .await
            .unwrap();

        assert_eq!(outcome.verdicts.len(), 1);
        assert!(outcome.verdicts[0].passed);
        assert!(outcome.halted_early);
        assert_eq!(outcome.halt_reason, Some(HaltReason::BudgetExhausted));
    }

    #[tokio::test]
    async fn test_unsupported_after_first_case_keeps_verdicts() {
        let client = ScriptedClient::new(vec![
            ExecutionOutcome::normal("2").into(),
            ScriptedResponse::Unsupported,
            ExecutionOutcome::normal("6").into(),
        ]);

        let outcome = run_with(client, &cases(3), &RunControl::default()).await;

        assert_eq!(outcome.verdicts.len(), 3);
        assert!(outcome.verdicts[0].passed);
        assert_eq!(outcome.verdicts[1].status, VerdictStatus::ExecutionUnavailable);
        assert!(outcome.verdicts[1].error_message.contains("not supported"));
        assert!(outcome.verdicts[2].passed);
        assert!(!outcome.halted_early);
    }
}
