//! API handlers for the approval service

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    models::{
        ApproveRequest, ListParams, RejectRequest, Request, SearchParams, SubmitRequest,
    },
    package_search::{self, PackageSearch},
    store::{RequestStore, StoreError},
    workflow::{ApprovalWorkflow, WorkflowError},
};

/// Shared application state
pub struct AppState {
    pub workflow: ApprovalWorkflow,
    pub store: Arc<dyn RequestStore>,
    pub packages: PackageSearch,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = match err {
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::InvalidState { .. } => StatusCode::CONFLICT,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from(WorkflowError::from(err))
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "approval-service"
    }))
}

/// Submit a new image request
pub async fn submit_request_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Request>), ApiError> {
    if payload.request_name.trim().is_empty() {
        return Err(ApiError::bad_request("requestName is required"));
    }
    if payload.base_repo.trim().is_empty() {
        return Err(ApiError::bad_request("baseRepo is required"));
    }
    if payload.requester_id.trim().is_empty() {
        return Err(ApiError::bad_request("requesterId is required"));
    }

    let request = state.workflow.submit(payload).await;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List requests, optionally filtered by status and/or requester
pub async fn list_requests_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requests = match (&params.status, &params.user) {
        (Some(status), Some(user)) => {
            let status = *status;
            state
                .store
                .list_by_user(user)
                .await
                .into_iter()
                .filter(|r| r.status == status)
                .collect()
        }
        (Some(status), None) => state.store.list_by_status(*status).await,
        (None, Some(user)) => state.store.list_by_user(user).await,
        (None, None) => state.store.list_all().await,
    };

    Ok(Json(serde_json::json!({
        "total": requests.len(),
        "requests": requests,
    })))
}

/// Get a single request
pub async fn get_request_handler(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<Request>, ApiError> {
    let request = state.store.get(&request_id).await?;
    Ok(Json(request))
}

/// Approve a pending request and run the build pipeline
pub async fn approve_request_handler(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<Request>, ApiError> {
    if payload.approver_id.trim().is_empty() {
        return Err(ApiError::bad_request("approverId is required"));
    }

    info!("Approval received for {} from {}", request_id, payload.approver_id);
    let request = state
        .workflow
        .approve(&request_id, &payload.approver_id)
        .await?;
    Ok(Json(request))
}

/// Reject a pending request with a reason
pub async fn reject_request_handler(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Request>, ApiError> {
    if payload.approver_id.trim().is_empty() {
        return Err(ApiError::bad_request("approverId is required"));
    }
    if payload.reason.trim().is_empty() {
        return Err(ApiError::bad_request("reason is required"));
    }

    info!("Rejection received for {} from {}", request_id, payload.approver_id);
    let request = state
        .workflow
        .reject(&request_id, &payload.approver_id, &payload.reason)
        .await?;
    Ok(Json(request))
}

/// Delete a request and stop any build monitoring for it
pub async fn delete_request_handler(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.workflow.delete(&request_id).await;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// Search the package index, or list popular packages without a term
pub async fn search_packages_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match params.q.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => {
            let outcome = state.packages.search(term).await;
            Ok(Json(serde_json::to_value(outcome).map_err(|e| ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: e.to_string(),
            })?))
        }
        _ => Ok(Json(serde_json::json!({
            "categories": package_search::popular_packages(),
        }))),
    }
}
