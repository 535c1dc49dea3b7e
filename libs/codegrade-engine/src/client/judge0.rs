// Judge0 execution provider.
// Submissions are sent base64-encoded with wait=true; if the service answers
// before the run finished we poll the submission token a bounded number of times.

use super::{http_client, seconds_to_ms, ExecutionClient};
use crate::error::ExecutionError;
use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use codegrade_common::languages::LanguageTable;
use codegrade_common::types::{ExecutionOutcome, ExitSignal, Language};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const RESULT_FIELDS: &str = "token,stdout,stderr,compile_output,message,time,memory,exit_code,status";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_POLLS: u32 = 10;

// Judge0 status ids
const STATUS_PROCESSING: u32 = 2;
const STATUS_ACCEPTED: u32 = 3;
const STATUS_WRONG_ANSWER: u32 = 4;
const STATUS_TIME_LIMIT: u32 = 5;
const STATUS_COMPILATION_ERROR: u32 = 6;
const STATUS_RUNTIME_FIRST: u32 = 7;
const STATUS_RUNTIME_LAST: u32 = 12;

#[derive(Debug, Serialize)]
struct SubmissionPayload {
    source_code: String,
    language_id: u32,
    stdin: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Judge0Status {
    id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Judge0Submission {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// Seconds, as a decimal string
    #[serde(default)]
    time: Option<String>,
    /// Kilobytes
    #[serde(default)]
    memory: Option<u64>,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(default)]
    status: Option<Judge0Status>,
}

impl Judge0Submission {
    fn status_id(&self) -> u32 {
        self.status.as_ref().map(|s| s.id).unwrap_or(0)
    }

    fn is_finished(&self) -> bool {
        self.status_id() > STATUS_PROCESSING
    }
}

pub struct Judge0Client {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_host: Option<String>,
    languages: LanguageTable,
    poll_interval: Duration,
    max_polls: u32,
}

impl Judge0Client {
    pub fn new(base_url: &str, api_key: Option<String>, languages: LanguageTable) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let api_host = reqwest::Url::parse(&base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));

        Ok(Self {
            http: http_client()?,
            base_url,
            api_key,
            api_host,
            languages,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.api_key, &self.api_host) {
            (Some(key), Some(host)) => request
                .header("X-RapidAPI-Key", key)
                .header("X-RapidAPI-Host", host),
            (Some(key), None) => request.header("X-RapidAPI-Key", key),
            _ => request,
        }
    }

    async fn read_submission(
        response: reqwest::Response,
        language: &Language,
    ) -> Result<Judge0Submission, ExecutionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 422 && body.contains("language") {
                return Err(ExecutionError::unsupported(language.as_str()));
            }
            warn!(status = %status, body = %body, "Judge0 rejected submission");
            return Err(ExecutionError::unavailable(format!(
                "Judge0 returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ExecutionError::unavailable(format!("malformed Judge0 response: {}", e)))
    }

    async fn poll(
        &self,
        token: &str,
        language: &Language,
    ) -> Result<Judge0Submission, ExecutionError> {
        let url = format!("{}/submissions/{}", self.base_url, token);

        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval * attempt).await;

            let response = self
                .authorize(self.http.get(&url))
                .query(&[("base64_encoded", "true"), ("fields", RESULT_FIELDS)])
                .send()
                .await
                .map_err(|e| ExecutionError::unavailable(format!("request to Judge0 failed: {}", e)))?;

            let submission = Self::read_submission(response, language).await?;
            if submission.is_finished() {
                return Ok(submission);
            }
            debug!(token = token, attempt = attempt, "Judge0 submission still processing");
        }

        Err(ExecutionError::unavailable(format!(
            "Judge0 submission {} did not finish after {} polls",
            token, self.max_polls
        )))
    }
}

#[async_trait]
impl ExecutionClient for Judge0Client {
    fn name(&self) -> &'static str {
        "judge0"
    }

    async fn execute(
        &self,
        language: &Language,
        _version: &str,
        source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        // Judge0 pins the runtime through the language id
        let language_id = self
            .languages
            .get_config(language)
            .and_then(|c| c.judge0_id)
            .ok_or_else(|| ExecutionError::unsupported(language.as_str()))?;

        let payload = SubmissionPayload {
            source_code: general_purpose::STANDARD.encode(source_code),
            language_id,
            stdin: general_purpose::STANDARD.encode(stdin),
        };

        let response = self
            .authorize(self.http.post(format!("{}/submissions", self.base_url)))
            .query(&[("base64_encoded", "true"), ("wait", "true")])
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExecutionError::unavailable(format!("request to Judge0 failed: {}", e)))?;

        let mut submission = Self::read_submission(response, language).await?;

        if !submission.is_finished() {
            let token = submission.token.clone().ok_or_else(|| {
                ExecutionError::unavailable("Judge0 queued the submission without a token")
            })?;
            submission = self.poll(&token, language).await?;
        }

        map_submission(submission)
    }
}

fn decode(field: Option<String>) -> Result<String, ExecutionError> {
    let Some(encoded) = field else {
        return Ok(String::new());
    };
    // Judge0 wraps base64 output at 60 columns
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ExecutionError::unavailable(format!("undecodable Judge0 output: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Map a finished Judge0 submission onto an outcome
pub(crate) fn map_submission(submission: Judge0Submission) -> Result<ExecutionOutcome, ExecutionError> {
    let status_id = submission.status_id();
    let description = submission
        .status
        .as_ref()
        .map(|s| s.description.clone())
        .unwrap_or_default();

    let exit_signal = match status_id {
        STATUS_ACCEPTED | STATUS_WRONG_ANSWER => ExitSignal::Normal,
        STATUS_TIME_LIMIT => ExitSignal::Timeout,
        STATUS_COMPILATION_ERROR => ExitSignal::CompileError,
        STATUS_RUNTIME_FIRST..=STATUS_RUNTIME_LAST => ExitSignal::RuntimeError,
        _ => {
            let message = decode(submission.message).unwrap_or_default();
            return Err(ExecutionError::unavailable(format!(
                "Judge0 status {} ({}) {}",
                status_id,
                description,
                message.trim()
            )));
        }
    };

    let stdout = decode(submission.stdout)?;
    let mut stderr = decode(submission.stderr)?;
    if exit_signal == ExitSignal::CompileError {
        let compile_output = decode(submission.compile_output)?;
        if !compile_output.is_empty() {
            stderr = compile_output;
        }
    }
    if exit_signal == ExitSignal::RuntimeError && stderr.is_empty() {
        stderr = description;
    }

    let wall_time_ms = submission
        .time
        .as_deref()
        .and_then(|t| t.trim().parse::<f64>().ok())
        .map(seconds_to_ms)
        .unwrap_or(0);

    Ok(ExecutionOutcome {
        stdout,
        stderr,
        exit_signal,
        exit_code: submission.exit_code,
        wall_time_ms,
        memory_kb: submission.memory.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegrade_common::languages::LanguageConfig;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(s: &str) -> String {
        general_purpose::STANDARD.encode(s)
    }

    fn parse(value: serde_json::Value) -> Judge0Submission {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_map_accepted() {
        let outcome = map_submission(parse(json!({
            "stdout": b64("6\n"),
            "time": "0.013",
            "memory": 3240,
            "exit_code": 0,
            "status": {"id": 3, "description": "Accepted"}
        })))
        .unwrap();

        assert_eq!(outcome.exit_signal, ExitSignal::Normal);
        assert_eq!(outcome.stdout, "6\n");
        assert_eq!(outcome.wall_time_ms, 13);
        assert_eq!(outcome.memory_kb, 3240);
    }

    #[test]
    fn test_map_compile_error_uses_compile_output() {
        let outcome = map_submission(parse(json!({
            "compile_output": b64("main.cpp:1:1: error: expected unqualified-id"),
            "status": {"id": 6, "description": "Compilation Error"}
        })))
        .unwrap();

        assert_eq!(outcome.exit_signal, ExitSignal::CompileError);
        assert!(outcome.stderr.contains("expected unqualified-id"));
    }

    #[test]
    fn test_map_wrapped_base64() {
        let long = "x".repeat(100);
        let encoded = b64(&long);
        let wrapped = format!("{}\n{}", &encoded[..60], &encoded[60..]);
        let outcome = map_submission(parse(json!({
            "stdout": wrapped,
            "status": {"id": 3, "description": "Accepted"}
        })))
        .unwrap();
        assert_eq!(outcome.stdout, long);
    }

    #[test]
    fn test_map_runtime_and_timeout_statuses() {
        let crash = map_submission(parse(json!({
            "status": {"id": 11, "description": "Runtime Error (NZEC)"},
            "exit_code": 1
        })))
        .unwrap();
        assert_eq!(crash.exit_signal, ExitSignal::RuntimeError);
        assert_eq!(crash.stderr, "Runtime Error (NZEC)");

        let slow = map_submission(parse(json!({"status": {"id": 5, "description": "Time Limit Exceeded"}}))).unwrap();
        assert_eq!(slow.exit_signal, ExitSignal::Timeout);
    }

    #[test]
    fn test_map_internal_error_is_unavailable() {
        let err = map_submission(parse(json!({"status": {"id": 13, "description": "Internal Error"}}))).unwrap_err();
        assert!(matches!(err, ExecutionError::Unavailable(msg) if msg.contains("Internal Error")));
    }

    #[tokio::test]
    async fn test_execute_sends_encoded_submission() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submissions"))
            .and(query_param("base64_encoded", "true"))
            .and(query_param("wait", "true"))
            .and(header("X-RapidAPI-Key", "key-123"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "stdout": b64("10\n"),
                "stderr": null,
                "time": "0.004",
                "memory": 1024,
                "status": {"id": 3, "description": "Accepted"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Judge0Client::new(&server.uri(), Some("key-123".into()), LanguageTable::builtin()).unwrap();
        let outcome = client
            .execute(&"python".into(), "3.10.0", "print(int(input())*2)", "5")
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "10\n");
        assert_eq!(outcome.exit_signal, ExitSignal::Normal);
    }

    #[tokio::test]
    async fn test_execute_polls_queued_submission() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submissions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "tok-1",
                "status": {"id": 1, "description": "In Queue"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/submissions/tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1",
                "stdout": b64("ok"),
                "status": {"id": 3, "description": "Accepted"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = Judge0Client::new(&server.uri(), None, LanguageTable::builtin())
            .unwrap()
            .with_polling(Duration::from_millis(1), 3);
        let outcome = client.execute(&"c".into(), "10.2.0", "", "").await.unwrap();

        assert_eq!(outcome.stdout, "ok");
    }

    #[tokio::test]
    async fn test_language_without_judge0_id_is_unsupported() {
        let table = LanguageTable::from_entries(vec![LanguageConfig::new("rust", "1.68.2", "main.rs")]).unwrap();
        let client = Judge0Client::new("http://127.0.0.1:9", None, table).unwrap();

        let err = client.execute(&"rust".into(), "1.68.2", "", "").await.unwrap_err();

        assert_eq!(err, ExecutionError::unsupported("rust"));
    }
}
