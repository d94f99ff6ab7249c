use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};

use redress_models::WorkflowDefinition;
use redress_utils::RedressError;

use crate::api::{error::ApiResult, AppState, Principal};
use crate::definitions::InstantiateTemplateRequest;
use crate::templates::{TemplateCategory, WorkflowTemplate};

/// GET /api/v1/workflow-templates
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<WorkflowTemplate>> {
    Json(state.services.definitions.templates().list_all().to_vec())
}

/// GET /api/v1/workflow-templates/category/:category
pub async fn list_templates_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<WorkflowTemplate>>> {
    let category = TemplateCategory::from_str(&category)
        .ok_or_else(|| RedressError::validation("category", format!("Unknown template category '{}'", category)))?;
    let templates = state
        .services
        .definitions
        .templates()
        .list_by_category(category)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(templates))
}

/// GET /api/v1/workflow-templates/:id
pub async fn get_template(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<WorkflowTemplate>> {
    let template = state
        .services
        .definitions
        .templates()
        .get_by_id(&id)
        .cloned()
        .ok_or_else(|| RedressError::not_found(format!("Workflow template {}", id)))?;
    Ok(Json(template))
}

/// POST /api/v1/workflow-templates/:id/instantiate
pub async fn instantiate_template(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(request): Json<InstantiateTemplateRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    principal.require_super_admin()?;
    let definition = state
        .services
        .definitions
        .create_from_template(principal.organization_id(), &id, request, Some(principal.user_id()))
        .await?;
    Ok((StatusCode::CREATED, Json(definition)))
}
