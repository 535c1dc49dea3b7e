// HTTP route handlers for the CodeGrade API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use codegrade_common::types::{Language, SubmissionRequest, SubmissionResult};
use codegrade_engine::EvaluationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub result: SubmissionResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(alias = "code")]
    pub source_code: String,
    #[serde(default)]
    pub stdin: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub aliases: Vec<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn status_for(err: &EvaluationError) -> StatusCode {
    match err {
        EvaluationError::InvalidRequest(_) | EvaluationError::LanguageUnsupported { .. } => {
            StatusCode::BAD_REQUEST
        }
        EvaluationError::ExecutionUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Table name for a requested language, so aliases share one metrics series
fn canonical_language<'a>(state: &'a AppState, language: &'a Language) -> &'a str {
    state
        .evaluator
        .languages()
        .get_config(language)
        .map(|config| config.name.as_str())
        .unwrap_or_else(|| language.as_str())
}

/// POST /evaluate - Grade a submission against its test cases
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmissionRequest>,
) -> Response {
    let evaluation_id = Uuid::new_v4();
    let started = Instant::now();

    // in-flight evaluations stop between test cases on shutdown
    let cancel = state.shutdown.child_token();

    match state
        .evaluator
        .evaluate_tracked(&request, evaluation_id, cancel)
        .await
    {
        Ok(result) => {
            let language = canonical_language(&state, &request.language);
            state
                .metrics
                .record_result(language, &result, started.elapsed());
            info!(
                evaluation_id = %evaluation_id,
                score = result.score,
                max_score = result.max_score,
                "Submission evaluated"
            );
            (
                StatusCode::OK,
                Json(EvaluateResponse {
                    evaluation_id,
                    evaluated_at: Utc::now(),
                    result,
                }),
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.record_rejected();
            warn!(evaluation_id = %evaluation_id, error = %e, "Submission rejected");
            error_response(status_for(&e), e.to_string())
        }
    }
}

/// POST /execute - Run source code once with custom stdin
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    let outcome = state
        .evaluator
        .execute_once(
            &request.language,
            request.version.as_deref(),
            &request.source_code,
            &request.stdin,
        )
        .await;

    match outcome {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            warn!(language = %request.language, error = %e, "Single execution failed");
            error_response(status_for(&e), e.to_string())
        }
    }
}

/// GET /languages - Configured languages and their default versions
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages: Vec<LanguageInfo> = state
        .evaluator
        .languages()
        .list_languages()
        .into_iter()
        .map(|config| LanguageInfo {
            name: config.name.clone(),
            version: config.version.clone(),
            aliases: config.aliases.clone(),
        })
        .collect();
    Json(languages)
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
