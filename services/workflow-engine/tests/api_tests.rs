//! HTTP surface tests: routing, bearer auth, role checks and error bodies.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use redress_database::{DirectoryStore, MemoryStore};
use redress_messaging::DispatchNotifier;
use redress_models::{ComplaintType, User, UserRole};
use redress_utils::AppConfig;
use redress_workflow_engine::{
    api::{create_router, token_digest, AppState},
    Services, Stores, TemplateLibrary,
};

const ADMIN_TOKEN: &str = "admin-token";
const STAFF_TOKEN: &str = "staff-token";
const COMPLAINANT_TOKEN: &str = "complainant-token";

struct TestApp {
    router: Router,
    complaint_type_id: Uuid,
}

async fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::shared(store.clone());
    let notifier = Arc::new(DispatchNotifier::new(stores.notifications.clone(), stores.directory.clone(), None));
    let templates = Arc::new(TemplateLibrary::builtin().unwrap());
    let services = Services::new(stores, notifier, templates);

    let organization_id = Uuid::new_v4();
    for (name, role, token) in [
        ("Admin", UserRole::SuperAdmin, ADMIN_TOKEN),
        ("Staff", UserRole::Department, STAFF_TOKEN),
        ("Citizen", UserRole::Complainant, COMPLAINANT_TOKEN),
    ] {
        let mut user = User::new(organization_id, name.to_string(), format!("{}@example.com", name.to_lowercase()), role);
        user.api_token_digest = Some(token_digest(token));
        store.insert_user(&user).await.unwrap();
    }

    let complaint_type = ComplaintType {
        id: Uuid::new_v4(),
        organization_id,
        department_id: None,
        name: "General".to_string(),
        description: None,
        created_at: Utc::now(),
    };
    store.insert_complaint_type(&complaint_type).await.unwrap();

    TestApp {
        router: create_router(AppState::new(services, AppConfig::default(), None)),
        complaint_type_id: complaint_type.id,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn two_stage_workflow(complaint_type_id: Uuid) -> Value {
    json!({
        "name": "General handling",
        "complaint_type_id": complaint_type_id,
        "stages": [
            {
                "id": "open",
                "name": "Open",
                "order": 1,
                "duration_in_hours": 8,
                "transitions": [{ "target_stage_id": "closed" }]
            },
            {
                "id": "closed",
                "name": "Closed",
                "order": 2,
                "actions": [{ "type": "STATUS_UPDATE", "config": { "status": "Resolved" } }]
            }
        ]
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/v1/workflows", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_ERROR");

    let (status, _) = send(&app, "GET", "/api/v1/workflows", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_only_super_admin_creates_workflows() {
    let app = app().await;
    let payload = two_stage_workflow(app.complaint_type_id);

    let (status, body) = send(&app, "POST", "/api/v1/workflows", Some(STAFF_TOKEN), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AUTHORIZATION_ERROR");

    let (status, body) = send(&app, "POST", "/api/v1/workflows", Some(ADMIN_TOKEN), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["stages"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, "GET", "/api/v1/workflows", Some(COMPLAINANT_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_graph_reports_validation_error() {
    let app = app().await;
    let mut payload = two_stage_workflow(app.complaint_type_id);
    payload["stages"][0]["transitions"][0]["target_stage_id"] = json!("nowhere");

    let (status, body) = send(&app, "POST", "/api/v1/workflows", Some(ADMIN_TOKEN), Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["field"], "stages");
}

#[tokio::test]
async fn test_complaint_workflow_round_trip() {
    let app = app().await;
    send(&app, "POST", "/api/v1/workflows", Some(ADMIN_TOKEN), Some(two_stage_workflow(app.complaint_type_id))).await;

    let (status, complaint) = send(
        &app,
        "POST",
        "/api/v1/complaints",
        Some(COMPLAINANT_TOKEN),
        Some(json!({
            "complaint_type_id": app.complaint_type_id,
            "title": "Streetlight out",
            "description": "Corner of 5th and Main"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(complaint["current_stage"], "Open");
    let id = complaint["id"].as_str().unwrap().to_string();

    let (status, instance) = send(&app, "GET", &format!("/api/v1/complaints/{}/workflow", id), Some(COMPLAINANT_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["current_stage_id"], "open");
    assert_eq!(instance["status"], "ACTIVE");

    let (status, stages) = send(
        &app,
        "GET",
        &format!("/api/v1/complaints/{}/workflow/transitions", id),
        Some(STAFF_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stages[0]["id"], "closed");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/complaints/{}/workflow/advance", id),
        Some(STAFF_TOKEN),
        Some(json!({ "target_stage_id": "open" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (status, instance) = send(
        &app,
        "POST",
        &format!("/api/v1/complaints/{}/workflow/advance", id),
        Some(STAFF_TOKEN),
        Some(json!({ "target_stage_id": "closed", "comment": "Bulb replaced" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "COMPLETED");

    let (_, complaint) = send(&app, "GET", &format!("/api/v1/complaints/{}", id), Some(COMPLAINANT_TOKEN), None).await;
    assert_eq!(complaint["status"], "Closed");
}

#[tokio::test]
async fn test_templates_are_browsable_and_instantiable() {
    let app = app().await;

    let (status, all) = send(&app, "GET", "/api/v1/workflow-templates", Some(STAFF_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(all.as_array().unwrap().len() >= 5);

    let (status, academic) = send(&app, "GET", "/api/v1/workflow-templates/category/academic", Some(STAFF_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(academic.as_array().unwrap().iter().all(|t| t["category"] == "academic"));

    let (status, _) = send(&app, "GET", "/api/v1/workflow-templates/category/legal", Some(STAFF_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, template) = send(&app, "GET", "/api/v1/workflow-templates/basic-three-stage", Some(STAFF_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, definition) = send(
        &app,
        "POST",
        "/api/v1/workflow-templates/basic-three-stage/instantiate",
        Some(ADMIN_TOKEN),
        Some(json!({ "name": "Front desk" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(definition["name"], "Front desk");
    assert_eq!(definition["stages"], template["stages"]);
}

#[tokio::test]
async fn test_complainant_cannot_escalate_or_set_status() {
    let app = app().await;
    let (_, complaint) = send(
        &app,
        "POST",
        "/api/v1/complaints",
        Some(COMPLAINANT_TOKEN),
        Some(json!({
            "complaint_type_id": app.complaint_type_id,
            "title": "Noise",
            "description": "Late night music"
        })),
    )
    .await;
    let id = complaint["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/complaints/{}/status", id),
        Some(COMPLAINANT_TOKEN),
        Some(json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/v1/complaints/{}/status", id),
        Some(STAFF_TOKEN),
        Some(json!({ "status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "In Progress");

    let (status, _) = send(&app, "GET", &format!("/api/v1/complaints/{}/workflow", id), Some(STAFF_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = app().await;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}
