// Deterministic execution client for tests.
// Replays a script of responses in call order, or answers from a responder
// function keyed on stdin.

use super::ExecutionClient;
use crate::error::ExecutionError;
use async_trait::async_trait;
use codegrade_common::types::{ExecutionOutcome, Language};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Outcome(ExecutionOutcome),
    Unavailable(String),
    Unsupported,
    /// Sleep before answering; drives per-call and per-submission timeouts
    Delayed(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    pub fn delayed(delay: Duration, response: ScriptedResponse) -> Self {
        Self::Delayed(delay, Box::new(response))
    }
}

impl From<ExecutionOutcome> for ScriptedResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        Self::Outcome(outcome)
    }
}

type Responder = Box<dyn Fn(&str) -> ScriptedResponse + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<ScriptedResponse>>),
    Responder(Responder),
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub language: String,
    pub version: String,
    pub stdin: String,
}

pub struct ScriptedClient {
    script: Script,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedClient {
    /// Answer calls in order; calls past the end of the script are unavailable
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call from `responder(stdin)`
    pub fn responder(responder: impl Fn(&str) -> ScriptedResponse + Send + Sync + 'static) -> Self {
        Self {
            script: Script::Responder(Box::new(responder)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn next_response(&self, stdin: &str) -> ScriptedResponse {
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .unwrap_or_else(|| ScriptedResponse::Unavailable("script exhausted".to_string())),
            Script::Responder(responder) => responder(stdin),
        }
    }
}

#[async_trait]
impl ExecutionClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        language: &Language,
        version: &str,
        _source_code: &str,
        stdin: &str,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ScriptedCall {
                language: language.to_string(),
                version: version.to_string(),
                stdin: stdin.to_string(),
            });
        }

        let mut response = self.next_response(stdin);
        loop {
            match response {
                ScriptedResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                ScriptedResponse::Outcome(outcome) => return Ok(outcome),
                ScriptedResponse::Unavailable(message) => {
                    return Err(ExecutionError::Unavailable(message))
                }
                ScriptedResponse::Unsupported => {
                    return Err(ExecutionError::unsupported(language.as_str()))
                }
            }
        }
    }
}
