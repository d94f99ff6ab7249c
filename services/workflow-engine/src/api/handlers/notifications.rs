use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use redress_models::Notification;
use redress_utils::RedressError;

use crate::api::{error::ApiResult, AppState, Principal};

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListNotificationsQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state
        .services
        .stores
        .notifications
        .list_notifications(principal.user_id(), query.unread_only)
        .await?;
    Ok(Json(notifications))
}

/// POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let updated = state
        .services
        .stores
        .notifications
        .mark_notification_read(id, principal.user_id())
        .await?;
    if !updated {
        return Err(RedressError::not_found(format!("Notification {}", id)).into());
    }
    Ok(StatusCode::NO_CONTENT)
}
