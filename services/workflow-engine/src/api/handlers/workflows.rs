//! Workflow definition endpoints. Mutations require SuperAdmin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use redress_database::DefinitionFilter;
use redress_models::WorkflowDefinition;

use crate::api::{error::ApiResult, AppState, Principal};
use crate::definitions::{CreateDefinitionRequest, UpdateDefinitionRequest};

#[derive(Debug, Default, Deserialize)]
pub struct ListWorkflowsQuery {
    pub complaint_type_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub active_only: bool,
}

/// GET /api/v1/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListWorkflowsQuery>,
) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    let filter = DefinitionFilter {
        complaint_type_id: query.complaint_type_id,
        department_id: query.department_id,
        active_only: query.active_only,
        ..DefinitionFilter::default()
    };
    let definitions = state
        .services
        .definitions
        .list(principal.organization_id(), filter)
        .await?;
    Ok(Json(definitions))
}

/// POST /api/v1/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateDefinitionRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    principal.require_super_admin()?;
    let definition = state
        .services
        .definitions
        .create(principal.organization_id(), request, Some(principal.user_id()))
        .await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// GET /api/v1/workflows/:id
pub async fn get_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let definition = state.services.definitions.get(principal.organization_id(), id).await?;
    Ok(Json(definition))
}

/// PUT /api/v1/workflows/:id
pub async fn update_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateDefinitionRequest>,
) -> ApiResult<Json<WorkflowDefinition>> {
    principal.require_super_admin()?;
    let definition = state
        .services
        .definitions
        .update(principal.organization_id(), id, patch)
        .await?;
    Ok(Json(definition))
}

/// DELETE /api/v1/workflows/:id
pub async fn delete_workflow(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    principal.require_super_admin()?;
    state.services.definitions.delete(principal.organization_id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
