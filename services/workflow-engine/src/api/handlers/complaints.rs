//! Complaint and per-complaint workflow endpoints.
//!
//! Every complaint is loaded through the organization of the caller, so a
//! foreign complaint id is indistinguishable from a missing one.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use redress_models::{Complaint, ComplaintStatus, Stage, WorkflowInstance};
use redress_utils::RedressError;

use crate::api::{error::ApiResult, AppState, Principal};
use crate::lifecycle::CreateComplaintRequest;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub target_stage_id: String,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

async fn load_complaint(state: &AppState, principal: &Principal, id: Uuid) -> Result<Complaint, RedressError> {
    let complaint = state
        .services
        .lifecycle
        .get_complaint(principal.organization_id(), id)
        .await?;
    principal.authorize_complaint(&complaint)?;
    Ok(complaint)
}

async fn load_instance(state: &AppState, principal: &Principal, id: Uuid) -> Result<WorkflowInstance, RedressError> {
    let complaint = load_complaint(state, principal, id).await?;
    state
        .services
        .engine
        .get_for_complaint(complaint.id)
        .await?
        .ok_or_else(|| RedressError::not_found(format!("Workflow instance for complaint {}", complaint.id)))
}

/// POST /api/v1/complaints
pub async fn create_complaint(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateComplaintRequest>,
) -> ApiResult<(StatusCode, Json<Complaint>)> {
    let complaint = state
        .services
        .lifecycle
        .create_complaint(principal.organization_id(), principal.user_id(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(complaint)))
}

/// GET /api/v1/complaints
pub async fn list_complaints(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<Complaint>>> {
    let complainant = principal.is_complainant().then(|| principal.user_id());
    let complaints = state
        .services
        .lifecycle
        .list_complaints(principal.organization_id(), complainant)
        .await?;
    Ok(Json(complaints))
}

/// GET /api/v1/complaints/:id
pub async fn get_complaint(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Complaint>> {
    Ok(Json(load_complaint(&state, &principal, id).await?))
}

/// PUT /api/v1/complaints/:id/status
pub async fn update_complaint_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Complaint>> {
    principal.require_staff()?;
    let status = ComplaintStatus::from_str(&request.status)
        .ok_or_else(|| RedressError::validation("status", format!("Unknown complaint status '{}'", request.status)))?;

    let complaint = state
        .services
        .lifecycle
        .update_status(principal.organization_id(), id, status, Some(principal.user_id()))
        .await?;
    Ok(Json(complaint))
}

/// GET /api/v1/complaints/:id/workflow
pub async fn get_complaint_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowInstance>> {
    Ok(Json(load_instance(&state, &principal, id).await?))
}

/// POST /api/v1/complaints/:id/workflow/advance
pub async fn advance_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<AdvanceRequest>,
) -> ApiResult<Json<WorkflowInstance>> {
    let instance = load_instance(&state, &principal, id).await?;
    let advanced = state
        .services
        .engine
        .advance(
            instance.id,
            &request.target_stage_id,
            Some(principal.user_id()),
            request.comment.as_deref(),
        )
        .await?;
    Ok(Json(advanced))
}

/// GET /api/v1/complaints/:id/workflow/transitions
pub async fn available_transitions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Stage>>> {
    let instance = load_instance(&state, &principal, id).await?;
    let stages = state.services.engine.available_transitions(instance.id).await?;
    Ok(Json(stages))
}

/// POST /api/v1/complaints/:id/workflow/escalate
pub async fn escalate_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowInstance>> {
    principal.require_staff()?;
    let instance = load_instance(&state, &principal, id).await?;
    Ok(Json(state.services.engine.escalate(instance.id).await?))
}

/// POST /api/v1/complaints/:id/workflow/cancel
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    request: Option<Json<CancelRequest>>,
) -> ApiResult<Json<WorkflowInstance>> {
    principal.require_staff()?;
    let instance = load_instance(&state, &principal, id).await?;
    let reason = request.and_then(|Json(r)| r.reason);
    let canceled = state
        .services
        .engine
        .cancel(instance.id, Some(principal.user_id()), reason.as_deref())
        .await?;
    Ok(Json(canceled))
}
