// Runtime settings shared by the API service and the CLI.
// Read from CODEGRADE_* environment variables.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::languages::DEFAULT_LANGUAGES_PATH;

pub const DEFAULT_PISTON_URL: &str = "https://emkc.org/api/v2/piston";
pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SUBMISSION_BUDGET_MS: u64 = 60_000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Which remote execution service to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Piston,
    Judge0,
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "piston" => Ok(Provider::Piston),
            "judge0" => Ok(Provider::Judge0),
            other => bail!("Unknown execution provider '{}' (expected piston or judge0)", other),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Provider::Piston => f.write_str("piston"),
            Provider::Judge0 => f.write_str("judge0"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub execution_url: String,
    pub api_key: Option<String>,
    pub languages_path: PathBuf,
    /// Bound on a single execution call
    pub test_timeout: Duration,
    /// Bound on all execution calls of one submission
    pub submission_budget: Duration,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::Piston,
            execution_url: DEFAULT_PISTON_URL.to_string(),
            api_key: None,
            languages_path: PathBuf::from(DEFAULT_LANGUAGES_PATH),
            test_timeout: Duration::from_millis(DEFAULT_TEST_TIMEOUT_MS),
            submission_budget: Duration::from_millis(DEFAULT_SUBMISSION_BUDGET_MS),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(provider) = lookup("CODEGRADE_PROVIDER") {
            settings.provider = provider.parse()?;
        }
        if let Some(url) = lookup("CODEGRADE_EXECUTION_URL") {
            settings.execution_url = url.trim_end_matches('/').to_string();
        }
        settings.api_key = lookup("CODEGRADE_API_KEY").filter(|k| !k.is_empty());
        if let Some(path) = lookup("CODEGRADE_LANGUAGES") {
            settings.languages_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("CODEGRADE_TEST_TIMEOUT_MS") {
            settings.test_timeout = parse_millis("CODEGRADE_TEST_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("CODEGRADE_SUBMISSION_BUDGET_MS") {
            settings.submission_budget = parse_millis("CODEGRADE_SUBMISSION_BUDGET_MS", &ms)?;
        }
        if let Some(addr) = lookup("CODEGRADE_BIND_ADDR") {
            settings.bind_addr = addr;
        }

        Ok(settings)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number of milliseconds, got '{}'", key, value))?;
    if ms == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_millis(ms))
}
