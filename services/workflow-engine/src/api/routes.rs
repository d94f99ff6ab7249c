use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::{handlers::*, middleware::auth_middleware, AppState};

/// Authenticated `/api/v1` routes.
pub fn create_api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health/detailed", get(detailed_health_check))
        .nest("/workflows", workflow_routes())
        .nest("/workflow-templates", template_routes())
        .nest("/complaints", complaint_routes())
        .nest("/notifications", notification_routes())
        .route_layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}

fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/:id", get(get_workflow).put(update_workflow).delete(delete_workflow))
}

fn template_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates))
        .route("/category/:category", get(list_templates_by_category))
        .route("/:id", get(get_template))
        .route("/:id/instantiate", post(instantiate_template))
}

fn complaint_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_complaints).post(create_complaint))
        .route("/:id", get(get_complaint))
        .route("/:id/status", put(update_complaint_status))
        .route("/:id/workflow", get(get_complaint_workflow))
        .route("/:id/workflow/advance", post(advance_workflow))
        .route("/:id/workflow/transitions", get(available_transitions))
        .route("/:id/workflow/escalate", post(escalate_workflow))
        .route("/:id/workflow/cancel", post(cancel_workflow))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_notification_read))
}
