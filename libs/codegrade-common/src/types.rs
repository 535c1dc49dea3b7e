use serde::{Deserialize, Serialize};
use std::fmt;

/// Marks awarded for a question when the caller does not send any
pub const DEFAULT_MARKS: u32 = 10;

/// Language identifier as sent by the caller.
///
/// Stored trimmed and lowercased so `"Python "` and `"python"` resolve to the
/// same table entry. Whether the language is actually supported is decided by
/// the language table, not by this type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Language(String);

impl Language {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Language {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for Language {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque test case identifier assigned by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCaseId(pub String);

impl From<&str> for TestCaseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TestCaseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: TestCaseId,
    #[serde(default)]
    pub input: String,
    #[serde(alias = "output")]
    pub expected_output: String,
    #[serde(default, alias = "hidden")]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl TestCase {
    pub fn new(
        id: impl Into<TestCaseId>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected_output: expected_output.into(),
            is_hidden: false,
            explanation: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// One learner submission for a single programming question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    #[serde(default)]
    pub language: Language,
    /// Pinned runtime version; the language table default is used when absent
    #[serde(default, alias = "version", skip_serializing_if = "Option::is_none")]
    pub language_version: Option<String>,
    #[serde(alias = "code")]
    pub source_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default = "default_marks")]
    pub marks: u32,
}

fn default_marks() -> u32 {
    DEFAULT_MARKS
}

impl SubmissionRequest {
    pub fn new(
        language: impl Into<Language>,
        source_code: impl Into<String>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            language: language.into(),
            language_version: None,
            source_code: source_code.into(),
            test_cases,
            marks: DEFAULT_MARKS,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.language_version = Some(version.into());
        self
    }

    pub fn with_marks(mut self, marks: u32) -> Self {
        self.marks = marks;
        self
    }
}

/// How the submitted program terminated, as reported by the execution boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitSignal {
    Normal,
    CompileError,
    RuntimeError,
    Timeout,
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ExitSignal::Normal => "normal",
            ExitSignal::CompileError => "compile_error",
            ExitSignal::RuntimeError => "runtime_error",
            ExitSignal::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Raw process output for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_signal: ExitSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    pub wall_time_ms: u64,
    pub memory_kb: u64,
}

impl ExecutionOutcome {
    pub fn normal(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_signal: ExitSignal::Normal,
            exit_code: Some(0),
            wall_time_ms: 0,
            memory_kb: 0,
        }
    }

    pub fn compile_error(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_signal: ExitSignal::CompileError,
            exit_code: Some(1),
            wall_time_ms: 0,
            memory_kb: 0,
        }
    }

    pub fn runtime_error(stderr: impl Into<String>, exit_code: i64) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_signal: ExitSignal::RuntimeError,
            exit_code: Some(exit_code),
            wall_time_ms: 0,
            memory_kb: 0,
        }
    }

    pub fn timeout(wall_time_ms: u64) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_signal: ExitSignal::Timeout,
            exit_code: None,
            wall_time_ms,
            memory_kb: 0,
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_metrics(mut self, wall_time_ms: u64, memory_kb: u64) -> Self {
        self.wall_time_ms = wall_time_ms;
        self.memory_kb = memory_kb;
        self
    }
}

/// Per-test status shown next to the pass/fail flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerdictStatus {
    Passed,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    ExecutionUnavailable,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Passed => "passed",
            VerdictStatus::WrongAnswer => "wrong_answer",
            VerdictStatus::CompileError => "compile_error",
            VerdictStatus::RuntimeError => "runtime_error",
            VerdictStatus::TimeLimitExceeded => "time_limit_exceeded",
            VerdictStatus::ExecutionUnavailable => "execution_unavailable",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVerdict {
    pub test_case_id: TestCaseId,
    pub passed: bool,
    pub status: VerdictStatus,
    pub actual_output: String,
    pub expected_output: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub wall_time_ms: u64,
    pub memory_kb: u64,
    pub is_hidden: bool,
}

impl TestVerdict {
    /// Drop everything that could disclose the test's content.
    ///
    /// Only the pass flag, status and metrics survive.
    pub fn redact(&mut self) {
        self.actual_output.clear();
        self.expected_output.clear();
        self.error_message.clear();
        self.explanation = None;
    }
}

/// Why a run stopped before every test case was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HaltReason {
    CompileError,
    BudgetExhausted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub verdicts: Vec<TestVerdict>,
    pub total_test_cases: usize,
    pub passed_test_cases: usize,
    pub overall_passed: bool,
    pub score: u32,
    pub max_score: u32,
    pub halted_early: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
}
