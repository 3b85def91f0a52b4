//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::dispatcher::{handle_event, DispatchEvent, DispatchResponse};
use crate::metadata::{RawMetadata, ResolvedMetadata};
use crate::rest_api::dto::{
    status_for, ErrorResponse, HealthResponse, RunResponse, SubmitRequest, SubmitResponse,
};
use crate::rest_api::AppState;
use crate::settings::StorageMode;
use crate::storage::keys;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: crate::error::Error) -> ApiError {
    (status_for(&e), Json(ErrorResponse::new(e.to_string())))
}

/// Health check endpoint
#[instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let settings = &state.settings;
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gridshift".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: match settings.storage_mode {
            StorageMode::Local => "local".to_string(),
            StorageMode::Cloud => "cloud".to_string(),
        },
        bucket: settings.bucket.clone(),
        has_carbon_token: !settings.carbon_api_token.is_empty(),
        has_llm_key: !settings.llm_api_key.is_empty(),
        task_queue_enabled: settings.task_queue_enabled(),
    })
}

/// Trigger one planning pass across all configured functions.
#[instrument(skip(state))]
pub async fn run_plan(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunResponse>, ApiError> {
    info!("Running carbon-aware planning pass");
    match state.planner.plan_all().await {
        Ok(report) => Ok(Json(RunResponse {
            status: "success".to_string(),
            message: "Carbon-aware schedules generated and functions deployed".to_string(),
            report,
        })),
        Err(e) => {
            error!("Planning pass failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            ))
        }
    }
}

/// Accept a one-off function: plan it, deploy it to the top-ranked
/// region and record the submission.
#[instrument(skip(state, request))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    if request.code.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing 'code' field")),
        ));
    }
    if request.deadline.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing 'deadline' field")),
        ));
    }

    let submission_id = Uuid::new_v4().to_string();
    let function_name = format!("user-func-{}", &submission_id[..8]);
    info!(%submission_id, %function_name, "New function submission");

    let raw = RawMetadata {
        description: request.description.clone(),
        memory_mb: Some(request.memory_mb.unwrap_or(256)),
        vcpus: request.vcpus,
        gpu_required: request.gpu_required,
        data_input_gb: Some(0.001),
        data_output_gb: Some(0.001),
        priority: request.priority,
        timeout_seconds: request.timeout_seconds,
        code: Some(request.code.clone()),
        requirements: request.requirements.clone(),
        ..Default::default()
    };
    let mut metadata = ResolvedMetadata::resolve(
        &function_name,
        raw,
        &state.planner.config().agent_defaults,
    );

    let schedule = state
        .planner
        .plan_one(&mut metadata)
        .await
        .map_err(api_error)?;

    // Deploy straight to the top-priority region.
    let mut schedules = std::collections::BTreeMap::new();
    schedules.insert(function_name.clone(), schedule);
    let mut metadata_map = std::collections::BTreeMap::new();
    metadata_map.insert(function_name.clone(), metadata.clone());

    let deployments = state
        .planner
        .deploy(&mut schedules, &metadata_map)
        .await
        .map_err(api_error)?;
    let deployment = &deployments[&function_name];
    let schedule = &schedules[&function_name];

    if !deployment.deployed && deployment.function_url.is_none() {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!(
                "deployment failed: {}",
                deployment
                    .error
                    .clone()
                    .unwrap_or_else(|| deployment.reason.clone())
            ))),
        ));
    }

    let top_5 = schedule.top_recommendations(5);
    let optimal = &top_5[0];

    let submission_record = json!({
        "submission_id": submission_id,
        "function_name": function_name,
        "deadline": request.deadline,
        "submitted_at": Utc::now(),
        "optimal_region": optimal.region,
        "function_url": deployment.function_url,
        "schedule": schedule,
        "metadata": metadata,
    });
    let submission_location = state
        .store
        .write(&keys::submission(&submission_id), &submission_record)
        .await
        .map_err(api_error)?;

    Ok(Json(SubmitResponse {
        status: "success".to_string(),
        submission_id,
        function_name,
        deployment: json!({
            "success": deployment.deployed || deployment.function_url.is_some(),
            "function_url": deployment.function_url,
            "region": deployment.region,
            "reason": deployment.reason,
        }),
        schedule: json!({
            "total_recommendations": schedule.recommendations.len(),
            "top_5": top_5,
        }),
        optimal_execution: json!({
            "datetime": optimal.datetime,
            "region": optimal.region,
            "carbon_intensity": optimal.carbon_intensity,
            "reasoning": optimal.reasoning,
        }),
        submission_location,
    }))
}

/// Dispatcher entrypoint: select the best feasible slot and enqueue the
/// deferred invocation.
#[instrument(skip(state, event))]
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(event): Json<DispatchEvent>,
) -> Result<Json<DispatchResponse>, ApiError> {
    handle_event(event, state.store.as_ref(), state.task_queue.as_ref())
        .await
        .map(Json)
        .map_err(api_error)
}
