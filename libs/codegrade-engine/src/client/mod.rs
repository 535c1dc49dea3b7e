//! Execution Client - boundary to the remote execution service
//!
//! **Core Responsibility:**
//! Submit one (language, version, source, stdin) unit and return the raw
//! process output.
//!
//! **Boundary:**
//! - Knows HOW to reach a provider (Piston, Judge0)
//! - Does NOT compare outputs or score anything
//! - Does NOT retry; a failed call surfaces as `ExecutionError::Unavailable`
//!
//! Providers are injected into the evaluator as `Arc<dyn ExecutionClient>`,
//! so a self-hosted sandbox or a test double can replace them without touching
//! the runner or the aggregator.

mod judge0;
mod piston;
#[cfg(any(test, feature = "testing"))]
mod scripted;

pub use judge0::Judge0Client;
pub use piston::{PistonClient, PistonLimits};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedCall, ScriptedClient, ScriptedResponse};

use crate::error::ExecutionError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use codegrade_common::config::{Provider, Settings};
use codegrade_common::languages::LanguageTable;
use codegrade_common::types::{ExecutionOutcome, Language};
use std::sync::Arc;
use std::time::Duration;

/// Substrings that mark stderr as compiler output rather than a runtime failure
const COMPILE_INDICATORS: &[&str] = &["compil", "syntaxerror", "syntax error"];

/// Connect timeout for provider HTTP clients; the per-call bound is enforced by the runner
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &'static str;

    /// Run `source_code` once with `stdin` on the given runtime.
    ///
    /// Each call is independent; providers hold no session state.
    async fn execute(
        &self,
        language: &Language,
        version: &str,
        source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Heuristic for providers that do not report compile failures explicitly:
/// stderr mentions an error together with a compilation indicator.
pub fn looks_like_compile_error(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("error") && COMPILE_INDICATORS.iter().any(|i| lowered.contains(i))
}

/// Shared reqwest client builder used by every provider
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Build the configured provider
pub fn from_settings(
    settings: &Settings,
    languages: &LanguageTable,
) -> Result<Arc<dyn ExecutionClient>> {
    let client: Arc<dyn ExecutionClient> = match settings.provider {
        Provider::Piston => Arc::new(PistonClient::new(
            &settings.execution_url,
            languages.clone(),
            PistonLimits::default(),
        )?),
        Provider::Judge0 => Arc::new(Judge0Client::new(
            &settings.execution_url,
            settings.api_key.clone(),
            languages.clone(),
        )?),
    };
    Ok(client)
}

/// Convert a provider-reported duration in seconds to whole milliseconds
pub(crate) fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_heuristic() {
        assert!(looks_like_compile_error("error: compilation terminated."));
        assert!(looks_like_compile_error(
            "  File \"main.py\", line 1\n    print(\nSyntaxError: unexpected EOF while parsing"
        ));
        assert!(!looks_like_compile_error("Traceback: ZeroDivisionError: division by zero"));
        assert!(!looks_like_compile_error("compiled with warnings"));
        assert!(!looks_like_compile_error(""));
    }

    #[test]
    fn test_seconds_to_ms() {
        assert_eq!(seconds_to_ms(0.002), 2);
        assert_eq!(seconds_to_ms(1.5), 1500);
        assert_eq!(seconds_to_ms(-1.0), 0);
        assert_eq!(seconds_to_ms(f64::NAN), 0);
    }
}
