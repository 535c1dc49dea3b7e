// Piston execution provider (reference provider).
// POST {base}/execute with the source as a single file; the response carries
// an optional compile stage and a run stage.

use super::{http_client, looks_like_compile_error, seconds_to_ms, ExecutionClient};
use crate::error::ExecutionError;
use anyhow::Result;
use async_trait::async_trait;
use codegrade_common::languages::LanguageTable;
use codegrade_common::types::{ExecutionOutcome, ExitSignal, Language};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Limits forwarded to Piston with every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PistonLimits {
    /// Milliseconds
    pub compile_timeout: u64,
    /// Milliseconds
    pub run_timeout: u64,
    pub compile_memory_limit: i64,
    pub run_memory_limit: i64,
}

impl Default for PistonLimits {
    fn default() -> Self {
        Self {
            compile_timeout: 10_000,
            run_timeout: 5_000,
            compile_memory_limit: 350_000,
            run_memory_limit: 350_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct PistonFile<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct PistonRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<PistonFile<'a>>,
    stdin: &'a str,
    #[serde(flatten)]
    limits: PistonLimits,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PistonStage {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    signal: Option<String>,
    /// Short status code on newer Piston builds ("TO" = timed out)
    #[serde(default)]
    status: Option<String>,
    /// Seconds
    #[serde(default)]
    time: Option<f64>,
    /// Milliseconds
    #[serde(default)]
    wall_time: Option<f64>,
    /// Kilobytes
    #[serde(default)]
    memory: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PistonResponse {
    run: PistonStage,
    #[serde(default)]
    compile: Option<PistonStage>,
}

#[derive(Debug, Deserialize)]
struct PistonErrorBody {
    message: String,
}

pub struct PistonClient {
    http: reqwest::Client,
    execute_url: String,
    languages: LanguageTable,
    limits: PistonLimits,
}

impl PistonClient {
    pub fn new(base_url: &str, languages: LanguageTable, limits: PistonLimits) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            execute_url: format!("{}/execute", base_url.trim_end_matches('/')),
            languages,
            limits,
        })
    }

    fn file_name(&self, language: &Language) -> String {
        self.languages
            .get_config(language)
            .map(|c| c.file_name.clone())
            .unwrap_or_else(|| format!("main.{}", language))
    }
}

#[async_trait]
impl ExecutionClient for PistonClient {
    fn name(&self) -> &'static str {
        "piston"
    }

    async fn execute(
        &self,
        language: &Language,
        version: &str,
        source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let file_name = self.file_name(language);
        let request = PistonRequest {
            language: language.as_str(),
            version,
            files: vec![PistonFile {
                name: &file_name,
                content: source_code,
            }],
            stdin,
            limits: self.limits,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(&self.execute_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExecutionError::unavailable(format!("request to Piston failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<PistonErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            if status.is_client_error() && message.contains("runtime is unknown") {
                return Err(ExecutionError::unsupported(format!("{}-{}", language, version)));
            }
            warn!(status = %status, message = %message, "Piston rejected execution request");
            return Err(ExecutionError::unavailable(format!(
                "Piston returned {}: {}",
                status, message
            )));
        }

        let body: PistonResponse = response.json().await.map_err(|e| {
            ExecutionError::unavailable(format!("malformed Piston response: {}", e))
        })?;
        let round_trip_ms = started.elapsed().as_millis() as u64;

        let outcome = map_response(body, round_trip_ms);
        debug!(
            language = %language,
            exit_signal = %outcome.exit_signal,
            wall_time_ms = outcome.wall_time_ms,
            "Piston execution finished"
        );
        Ok(outcome)
    }
}

/// Map a Piston response onto an outcome.
///
/// A failed compile stage is an explicit compile error. For the run stage a
/// timeout status or SIGKILL means timeout, and a non-zero exit is a runtime
/// error unless stderr looks like compiler output (interpreted languages that
/// report syntax errors at run time).
pub(crate) fn map_response(response: PistonResponse, round_trip_ms: u64) -> ExecutionOutcome {
    if let Some(compile) = response.compile {
        if compile.code.unwrap_or(0) != 0 || compile.signal.is_some() {
            let stderr = compile.stderr.unwrap_or_default();
            let stdout = compile.stdout.unwrap_or_default();
            return ExecutionOutcome {
                // javac and friends sometimes write diagnostics to stdout
                stderr: if stderr.is_empty() { stdout } else { stderr },
                stdout: String::new(),
                exit_signal: ExitSignal::CompileError,
                exit_code: compile.code,
                wall_time_ms: round_trip_ms,
                memory_kb: 0,
            };
        }
    }

    let run = response.run;
    let stdout = run.stdout.unwrap_or_default();
    let stderr = run.stderr.unwrap_or_default();

    let wall_time_ms = run
        .wall_time
        .map(|ms| ms.max(0.0).round() as u64)
        .or_else(|| run.time.map(seconds_to_ms))
        .unwrap_or(round_trip_ms);
    let memory_kb = run.memory.map(|kb| kb.max(0.0) as u64).unwrap_or(0);

    let timed_out = run.status.as_deref() == Some("TO") || run.signal.as_deref() == Some("SIGKILL");
    let exit_signal = if timed_out {
        ExitSignal::Timeout
    } else if run.code.unwrap_or(0) != 0 || run.signal.is_some() {
        if looks_like_compile_error(&stderr) {
            ExitSignal::CompileError
        } else {
            ExitSignal::RuntimeError
        }
    } else {
        ExitSignal::Normal
    };

    ExecutionOutcome {
        stdout,
        stderr,
        exit_signal,
        exit_code: run.code,
        wall_time_ms,
        memory_kb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(value: serde_json::Value) -> PistonResponse {
        serde_json::from_value(value).unwrap()
    }

    fn client(base_url: &str) -> PistonClient {
        PistonClient::new(base_url, LanguageTable::builtin(), PistonLimits::default()).unwrap()
    }

    #[test]
    fn test_map_normal_run() {
        let outcome = map_response(
            parse(json!({
                "run": {"stdout": "120\n", "stderr": "", "code": 0, "signal": null, "time": 0.042, "memory": 9120}
            })),
            300,
        );
        assert_eq!(outcome.exit_signal, ExitSignal::Normal);
        assert_eq!(outcome.stdout, "120\n");
        assert_eq!(outcome.wall_time_ms, 42);
        assert_eq!(outcome.memory_kb, 9120);
    }

    #[test]
    fn test_map_failed_compile_stage() {
        let outcome = map_response(
            parse(json!({
                "compile": {"stdout": "", "stderr": "Main.java:3: error: ';' expected", "code": 1, "signal": null},
                "run": {"stdout": "", "stderr": "", "code": null, "signal": null}
            })),
            120,
        );
        assert_eq!(outcome.exit_signal, ExitSignal::CompileError);
        assert!(outcome.stderr.contains("';' expected"));
        assert_eq!(outcome.wall_time_ms, 120);
    }

    #[test]
    fn test_map_timeout_and_runtime_error() {
        let timeout = map_response(
            parse(json!({"run": {"stdout": "", "stderr": "", "code": null, "signal": "SIGKILL"}})),
            5000,
        );
        assert_eq!(timeout.exit_signal, ExitSignal::Timeout);
        assert_eq!(timeout.wall_time_ms, 5000);

        let crash = map_response(
            parse(json!({"run": {"stdout": "", "stderr": "ZeroDivisionError: division by zero", "code": 1, "signal": null}})),
            10,
        );
        assert_eq!(crash.exit_signal, ExitSignal::RuntimeError);
        assert_eq!(crash.exit_code, Some(1));
    }

    #[test]
    fn test_map_syntax_error_at_run_time() {
        let outcome = map_response(
            parse(json!({"run": {"stdout": "", "stderr": "SyntaxError: invalid syntax", "code": 1, "signal": null}})),
            10,
        );
        assert_eq!(outcome.exit_signal, ExitSignal::CompileError);
    }

    #[tokio::test]
    async fn test_execute_posts_source_as_file() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_partial_json(json!({
                "language": "python",
                "version": "3.10.0",
                "files": [{"name": "main.py", "content": "print(input())"}],
                "stdin": "hello",
                "run_timeout": 5000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "language": "python",
                "version": "3.10.0",
                "run": {"stdout": "hello\n", "stderr": "", "output": "hello\n", "code": 0, "signal": null}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server.uri())
            .execute(&"python".into(), "3.10.0", "print(input())", "hello")
            .await
            .unwrap();

        assert_eq!(outcome.exit_signal, ExitSignal::Normal);
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_unknown_runtime_is_unsupported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"message": "cobol-1.0 runtime is unknown"})),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .execute(&"cobol".into(), "1.0", "", "")
            .await
            .unwrap_err();

        assert_eq!(err, ExecutionError::unsupported("cobol-1.0"));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .execute(&"python".into(), "3.10.0", "", "")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Unavailable(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .execute(&"python".into(), "3.10.0", "", "")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Unavailable(msg) if msg.contains("malformed")));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Nothing listens on port 9 (discard) in the test environment
        let err = client("http://127.0.0.1:9")
            .execute(&"python".into(), "3.10.0", "", "")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Unavailable(_)));
    }
}
