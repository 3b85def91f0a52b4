//! Request/response shapes for the REST API

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::metadata::Priority;
use crate::planner::PlanReport;
use axum::http::StatusCode;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub mode: String,
    pub bucket: String,
    pub has_carbon_token: bool,
    pub has_llm_key: bool,
    pub task_queue_enabled: bool,
}

#[derive(Serialize)]
pub struct RunResponse {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub report: PlanReport,
}

/// One-off function submission.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    pub deadline: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub vcpus: Option<u32>,
    #[serde(default)]
    pub gpu_required: Option<bool>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub submission_id: String,
    pub function_name: String,
    pub deployment: Value,
    pub schedule: Value,
    pub optimal_execution: Value,
    pub submission_location: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// HTTP status for an error per the dispatch/planning contract.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Dispatch(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
