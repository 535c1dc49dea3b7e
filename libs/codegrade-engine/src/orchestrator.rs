/// Evaluation Orchestrator - Public Entry Point
///
/// **Responsibility:**
/// Validate a submission, resolve its runtime, run it, and score it.
///
/// **Architecture:**
/// 1. Validate request shape and resolve the language version
/// 2. Use TestCaseRunner to execute test cases in order (runner.rs)
/// 3. Use the aggregator to score and redact (aggregator.rs)
///
/// This module is the glue layer. It knows nothing about:
/// - How code executes (the client's job)
/// - How outputs are compared (the normalizer's job)
/// - How scoring works (the aggregator's job)
///
/// It owns the per-submission time budget and is the unit of cancellation.
use crate::aggregator;
use crate::client::{self, ExecutionClient};
use crate::error::EvaluationError;
use crate::runner::{RunControl, TestCaseRunner};
use anyhow::Result;
use codegrade_common::config::Settings;
use codegrade_common::languages::LanguageTable;
use codegrade_common::types::{ExecutionOutcome, Language, SubmissionRequest, SubmissionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorSettings {
    /// Upper bound for a single execution call
    pub test_timeout: Duration,
    /// Wall-clock budget for all test cases of one submission
    pub submission_budget: Duration,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(10),
            submission_budget: Duration::from_secs(60),
        }
    }
}

impl From<&Settings> for EvaluatorSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            test_timeout: settings.test_timeout,
            submission_budget: settings.submission_budget,
        }
    }
}

pub struct Evaluator {
    client: Arc<dyn ExecutionClient>,
    languages: LanguageTable,
    settings: EvaluatorSettings,
}

impl Evaluator {
    pub fn new(
        client: Arc<dyn ExecutionClient>,
        languages: LanguageTable,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            client,
            languages,
            settings,
        }
    }

    /// Load the language table and build the configured provider
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let languages = LanguageTable::load_or_builtin(&settings.languages_path)?;
        let client = client::from_settings(settings, &languages)?;
        info!(
            provider = %settings.provider,
            url = %settings.execution_url,
            languages = languages.list_languages().len(),
            "Evaluator initialized"
        );
        Ok(Self::new(client, languages, EvaluatorSettings::from(settings)))
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    pub fn settings(&self) -> EvaluatorSettings {
        self.settings
    }

    pub fn provider(&self) -> &'static str {
        self.client.name()
    }

    /// Evaluate a submission against all of its test cases.
    ///
    /// Fails only for request-shape problems and unsupported languages;
    /// everything that happens during execution is reported in the result.
    pub async fn evaluate(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResult, EvaluationError> {
        self.evaluate_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Like `evaluate`, stopping between test cases once `cancel` fires.
    /// Verdicts gathered before cancellation are scored.
    pub async fn evaluate_with_cancel(
        &self,
        request: &SubmissionRequest,
        cancel: CancellationToken,
    ) -> Result<SubmissionResult, EvaluationError> {
        self.evaluate_tracked(request, Uuid::new_v4(), cancel).await
    }

    /// Like `evaluate_with_cancel`, logging under a caller-supplied id
    #[instrument(
        skip_all,
        fields(
            evaluation_id = %evaluation_id,
            language = %request.language,
            test_count = request.test_cases.len()
        )
    )]
    pub async fn evaluate_tracked(
        &self,
        request: &SubmissionRequest,
        evaluation_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<SubmissionResult, EvaluationError> {
        validate(request)?;
        let (language, version) =
            self.resolve(&request.language, request.language_version.as_deref())?;

        info!(version = %version, provider = self.client.name(), "Starting evaluation");
        let started = Instant::now();

        let runner = TestCaseRunner::new(self.client.clone(), self.settings.test_timeout);
        let control = RunControl::with_budget(self.settings.submission_budget, cancel);
        let run = runner
            .run(
                &request.source_code,
                &language,
                &version,
                &request.test_cases,
                &control,
            )
            .await?;

        let result = aggregator::aggregate(
            run.verdicts,
            request.test_cases.len(),
            request.marks,
            run.halt_reason,
        );

        if let Some(reason) = result.halt_reason {
            warn!(
                reason = ?reason,
                executed = result.verdicts.len(),
                total = result.total_test_cases,
                "Evaluation halted early"
            );
        }
        info!(
            passed = result.passed_test_cases,
            total = result.total_test_cases,
            score = result.score,
            max_score = result.max_score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation complete"
        );

        Ok(result)
    }

    /// Run source code once with the given stdin, without grading.
    ///
    /// Subject to the per-call timeout; transport failures are returned as
    /// `ExecutionUnavailable` since there is no result to record them in.
    pub async fn execute_once(
        &self,
        language: &Language,
        version: Option<&str>,
        source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionOutcome, EvaluationError> {
        if language.is_empty() {
            return Err(EvaluationError::InvalidRequest(
                "language is required".to_string(),
            ));
        }
        let (language, version) = self.resolve(language, version)?;

        let started = Instant::now();
        let call = self
            .client
            .execute(&language, &version, source_code, stdin);
        match tokio::time::timeout(self.settings.test_timeout, call).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => {
                warn!(language = %language, "Single execution timed out");
                Ok(ExecutionOutcome::timeout(
                    started.elapsed().as_millis() as u64
                ))
            }
        }
    }

    /// Canonical language name and effective version.
    ///
    /// An explicit version wins; otherwise the configured default is used.
    /// A language with neither is unsupported.
    fn resolve(
        &self,
        language: &Language,
        version: Option<&str>,
    ) -> Result<(Language, String), EvaluationError> {
        let config = self.languages.get_config(language);
        let canonical = config
            .map(|c| Language::new(&c.name))
            .unwrap_or_else(|| language.clone());

        let explicit = version.map(str::trim).filter(|v| !v.is_empty());
        match (explicit, config) {
            (Some(version), _) => Ok((canonical, version.to_string())),
            (None, Some(config)) => Ok((canonical, config.version.clone())),
            (None, None) => Err(EvaluationError::LanguageUnsupported {
                language: language.to_string(),
            }),
        }
    }
}

fn validate(request: &SubmissionRequest) -> Result<(), EvaluationError> {
    if request.language.is_empty() {
        return Err(EvaluationError::InvalidRequest(
            "language is required".to_string(),
        ));
    }
    if request.test_cases.is_empty() {
        return Err(EvaluationError::InvalidRequest(
            "at least one test case is required".to_string(),
        ));
    }
    if request.marks == 0 {
        return Err(EvaluationError::InvalidRequest(
            "marks must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
