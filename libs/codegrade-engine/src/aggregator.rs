/// Score Aggregator - Submission-Level Scoring
///
/// **Core Responsibility:**
/// Reduce the ordered verdicts of one run plus the question's marks into a
/// single `SubmissionResult`.
///
/// **Scoring Rules:**
/// - Every test case carries equal weight, hidden or visible
/// - score = marks * passed / total, rounded half up
/// - A partial pass never rounds up to full marks
/// - max_score = marks
///
/// **Redaction:**
/// Hidden verdicts leave this module with their outputs, error message and
/// explanation cleared. Only pass flag, status and metrics survive.
use codegrade_common::types::{HaltReason, SubmissionResult, TestVerdict};
use tracing::debug;

/// Aggregate verdicts into a submission result.
///
/// `total_test_cases` is the number of test cases in the request, which can
/// exceed `verdicts.len()` when the run halted early.
pub fn aggregate(
    mut verdicts: Vec<TestVerdict>,
    total_test_cases: usize,
    question_marks: u32,
    halt_reason: Option<HaltReason>,
) -> SubmissionResult {
    let passed_test_cases = verdicts.iter().filter(|v| v.passed).count();
    let overall_passed = total_test_cases > 0 && passed_test_cases == total_test_cases;
    let score = partial_score(question_marks, passed_test_cases, total_test_cases);
    let halted_early = verdicts.len() < total_test_cases;

    for verdict in verdicts.iter_mut().filter(|v| v.is_hidden) {
        verdict.redact();
    }

    debug!(
        passed = passed_test_cases,
        total = total_test_cases,
        score,
        max_score = question_marks,
        halted_early,
        "Submission aggregated"
    );

    SubmissionResult {
        verdicts,
        total_test_cases,
        passed_test_cases,
        overall_passed,
        score,
        max_score: question_marks,
        halted_early,
        halt_reason: if halted_early { halt_reason } else { None },
    }
}

/// Linear partial credit, rounded half up in integer arithmetic.
///
/// Capped at `marks - 1` unless every test case passed, so full marks are
/// reserved for a full pass.
pub fn partial_score(marks: u32, passed: usize, total: usize) -> u32 {
    if total == 0 || passed == 0 {
        return 0;
    }
    if passed >= total {
        return marks;
    }
    let (marks, passed, total) = (u64::from(marks), passed as u64, total as u64);
    let rounded = (2 * marks * passed + total) / (2 * total);
    rounded.min(marks.saturating_sub(1)) as u32
}
