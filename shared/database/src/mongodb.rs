//! MongoDB-backed store
//!
//! Records are stored as plain BSON documents keyed by a string `id` field.
//! Uuids and timestamps serialize as strings, so filters compare strings.

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
    Client, Collection, Database,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use uuid::Uuid;

use redress_models::{
    Complaint, ComplaintStatus, ComplaintType, Department, Notification, Organization, User, WorkflowDefinition,
    WorkflowInstance,
};
use redress_utils::{RedressError, RedressResult};

use crate::repositories::{
    ComplaintStore, DefinitionFilter, DefinitionStore, DirectoryStore, InstanceFilter, InstanceStore,
    NotificationStore, UserFilter,
};

pub type MongoClient = Client;
pub type MongoDatabase = Database;

pub const DEFINITIONS: &str = "workflow_definitions";
pub const INSTANCES: &str = "workflow_instances";
pub const COMPLAINTS: &str = "complaints";
pub const ORGANIZATIONS: &str = "organizations";
pub const DEPARTMENTS: &str = "departments";
pub const COMPLAINT_TYPES: &str = "complaint_types";
pub const USERS: &str = "users";
pub const NOTIFICATIONS: &str = "notifications";

const DUPLICATE_KEY: i32 = 11000;

pub async fn create_mongo_client(database_url: &str, connection_timeout: Duration) -> Result<MongoClient> {
    let mut options = ClientOptions::parse(database_url).await?;
    options.connect_timeout = Some(connection_timeout);
    options.server_selection_timeout = Some(connection_timeout);
    options.app_name = Some("redress".to_string());

    let client = Client::with_options(options)?;

    // Test connection
    health_check(&client).await?;

    tracing::info!("Connected to MongoDB database");
    Ok(client)
}

pub async fn health_check(client: &MongoClient) -> Result<()> {
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;
    Ok(())
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn by_id(id: Uuid) -> Document {
    doc! { "id": id.to_string() }
}

fn created_order() -> FindOptions {
    FindOptions::builder().sort(doc! { "created_at": 1 }).build()
}

#[derive(Clone)]
pub struct MongoStore {
    database: MongoDatabase,
}

impl MongoStore {
    pub fn new(database: MongoDatabase) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &MongoDatabase {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

    async fn insert<T: Serialize>(&self, collection: &str, record: &T, conflict: impl FnOnce() -> String) -> RedressResult<()> {
        let document = bson::to_document(record)?;
        match self.collection(collection).insert_one(document, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(RedressError::conflict(conflict())),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_one<T: DeserializeOwned>(&self, collection: &str, filter: Document) -> RedressResult<Option<T>> {
        match self.collection(collection).find_one(filter, None).await? {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    async fn find_many<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> RedressResult<Vec<T>> {
        let cursor = self.collection(collection).find(filter, options).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        documents
            .into_iter()
            .map(|d| bson::from_document(d).map_err(RedressError::from))
            .collect()
    }

    async fn exists(&self, collection: &str, id: Uuid) -> RedressResult<bool> {
        Ok(self.collection(collection).count_documents(by_id(id), None).await? > 0)
    }
}

fn definition_query(filter: &DefinitionFilter) -> Document {
    let mut query = Document::new();
    if let Some(id) = filter.organization_id {
        query.insert("organization_id", id.to_string());
    }
    if let Some(id) = filter.complaint_type_id {
        query.insert("complaint_type_id", id.to_string());
    }
    if let Some(id) = filter.department_id {
        query.insert("department_id", id.to_string());
    }
    if filter.active_only {
        query.insert("is_active", true);
    }
    query
}

fn instance_query(filter: &InstanceFilter) -> RedressResult<Document> {
    let mut query = Document::new();
    if let Some(id) = filter.organization_id {
        query.insert("organization_id", id.to_string());
    }
    if let Some(id) = filter.workflow_id {
        query.insert("workflow_id", id.to_string());
    }
    if let Some(status) = filter.status {
        query.insert("status", bson::to_bson(&status)?);
    }
    if filter.incomplete_only {
        query.insert("is_completed", false);
    }
    Ok(query)
}

fn user_query(filter: &UserFilter) -> RedressResult<Document> {
    let mut query = Document::new();
    if let Some(id) = filter.organization_id {
        query.insert("organization_id", id.to_string());
    }
    if let Some(id) = filter.department_id {
        query.insert("department_id", id.to_string());
    }
    if let Some(role) = filter.role {
        query.insert("role", bson::to_bson(&role)?);
    }
    if filter.active_only {
        query.insert("is_active", true);
    }
    Ok(query)
}

#[async_trait]
impl DefinitionStore for MongoStore {
    async fn insert_definition(&self, definition: &WorkflowDefinition) -> RedressResult<()> {
        self.insert(DEFINITIONS, definition, || {
            format!("Workflow definition {} already exists", definition.id)
        })
        .await
    }

    async fn get_definition(&self, id: Uuid) -> RedressResult<Option<WorkflowDefinition>> {
        self.find_one(DEFINITIONS, by_id(id)).await
    }

    async fn find_definitions(&self, filter: &DefinitionFilter) -> RedressResult<Vec<WorkflowDefinition>> {
        self.find_many(DEFINITIONS, definition_query(filter), created_order()).await
    }

    async fn replace_definition(&self, definition: &WorkflowDefinition) -> RedressResult<bool> {
        let document = bson::to_document(definition)?;
        let result = self
            .collection(DEFINITIONS)
            .replace_one(by_id(definition.id), document, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_definition(&self, id: Uuid) -> RedressResult<bool> {
        let result = self.collection(DEFINITIONS).delete_one(by_id(id), None).await?;
        Ok(result.deleted_count > 0)
    }
}

#[async_trait]
impl InstanceStore for MongoStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> RedressResult<()> {
        self.insert(INSTANCES, instance, || {
            format!("Complaint {} already has a workflow instance", instance.complaint_id)
        })
        .await
    }

    async fn get_instance(&self, id: Uuid) -> RedressResult<Option<WorkflowInstance>> {
        self.find_one(INSTANCES, by_id(id)).await
    }

    async fn find_instance_by_complaint(&self, complaint_id: Uuid) -> RedressResult<Option<WorkflowInstance>> {
        self.find_one(INSTANCES, doc! { "complaint_id": complaint_id.to_string() })
            .await
    }

    async fn find_instances(&self, filter: &InstanceFilter) -> RedressResult<Vec<WorkflowInstance>> {
        let options = FindOptions::builder().sort(doc! { "started_at": 1 }).build();
        self.find_many(INSTANCES, instance_query(filter)?, options).await
    }

    async fn update_instance(&self, instance: &mut WorkflowInstance) -> RedressResult<()> {
        let expected = instance.version;
        let mut next = instance.clone();
        next.version = expected + 1;

        let filter = doc! { "id": instance.id.to_string(), "version": expected as i64 };
        let result = self
            .collection(INSTANCES)
            .replace_one(filter, bson::to_document(&next)?, None)
            .await?;

        if result.matched_count == 0 {
            let resource = format!("Workflow instance {}", instance.id);
            return if self.exists(INSTANCES, instance.id).await? {
                Err(RedressError::concurrent_modification(resource))
            } else {
                Err(RedressError::not_found(resource))
            };
        }

        instance.version = next.version;
        Ok(())
    }
}

#[async_trait]
impl ComplaintStore for MongoStore {
    async fn insert_complaint(&self, complaint: &Complaint) -> RedressResult<()> {
        self.insert(COMPLAINTS, complaint, || format!("Complaint {} already exists", complaint.id))
            .await
    }

    async fn get_complaint(&self, id: Uuid) -> RedressResult<Option<Complaint>> {
        self.find_one(COMPLAINTS, by_id(id)).await
    }

    async fn update_complaint(&self, complaint: &mut Complaint) -> RedressResult<()> {
        let expected = complaint.version;
        let mut next = complaint.clone();
        next.version = expected + 1;

        let filter = doc! { "id": complaint.id.to_string(), "version": expected as i64 };
        let result = self
            .collection(COMPLAINTS)
            .replace_one(filter, bson::to_document(&next)?, None)
            .await?;

        if result.matched_count == 0 {
            let resource = format!("Complaint {}", complaint.id);
            return if self.exists(COMPLAINTS, complaint.id).await? {
                Err(RedressError::concurrent_modification(resource))
            } else {
                Err(RedressError::not_found(resource))
            };
        }

        complaint.version = next.version;
        Ok(())
    }

    async fn count_open_assigned(&self, user_id: Uuid) -> RedressResult<u64> {
        let open: Vec<String> = [
            ComplaintStatus::Pending,
            ComplaintStatus::InProgress,
            ComplaintStatus::UnderReview,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let filter = doc! {
            "assigned_to": user_id.to_string(),
            "status": { "$in": open },
        };
        Ok(self.collection(COMPLAINTS).count_documents(filter, None).await?)
    }

    async fn find_complaints(&self, organization_id: Uuid, complainant_id: Option<Uuid>) -> RedressResult<Vec<Complaint>> {
        let mut filter = doc! { "organization_id": organization_id.to_string() };
        if let Some(id) = complainant_id {
            filter.insert("complainant_id", id.to_string());
        }
        self.find_many(COMPLAINTS, filter, created_order()).await
    }
}

#[async_trait]
impl DirectoryStore for MongoStore {
    async fn insert_organization(&self, organization: &Organization) -> RedressResult<()> {
        self.insert(ORGANIZATIONS, organization, || {
            format!("Organization '{}' already exists", organization.name)
        })
        .await
    }

    async fn get_organization(&self, id: Uuid) -> RedressResult<Option<Organization>> {
        self.find_one(ORGANIZATIONS, by_id(id)).await
    }

    async fn insert_department(&self, department: &Department) -> RedressResult<()> {
        self.insert(DEPARTMENTS, department, || format!("Department {} already exists", department.id))
            .await
    }

    async fn get_department(&self, id: Uuid) -> RedressResult<Option<Department>> {
        self.find_one(DEPARTMENTS, by_id(id)).await
    }

    async fn insert_complaint_type(&self, complaint_type: &ComplaintType) -> RedressResult<()> {
        self.insert(COMPLAINT_TYPES, complaint_type, || {
            format!("Complaint type {} already exists", complaint_type.id)
        })
        .await
    }

    async fn get_complaint_type(&self, id: Uuid) -> RedressResult<Option<ComplaintType>> {
        self.find_one(COMPLAINT_TYPES, by_id(id)).await
    }

    async fn insert_user(&self, user: &User) -> RedressResult<()> {
        self.insert(USERS, user, || format!("User {} already exists", user.email)).await
    }

    async fn get_user(&self, id: Uuid) -> RedressResult<Option<User>> {
        self.find_one(USERS, by_id(id)).await
    }

    async fn find_users(&self, filter: &UserFilter) -> RedressResult<Vec<User>> {
        self.find_many(USERS, user_query(filter)?, created_order()).await
    }

    async fn find_user_by_token_digest(&self, digest: &str) -> RedressResult<Option<User>> {
        self.find_one(USERS, doc! { "api_token_digest": digest }).await
    }
}

#[async_trait]
impl NotificationStore for MongoStore {
    async fn insert_notification(&self, notification: &Notification) -> RedressResult<()> {
        self.insert(NOTIFICATIONS, notification, || {
            format!("Notification {} already exists", notification.id)
        })
        .await
    }

    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> RedressResult<Vec<Notification>> {
        let mut filter = doc! { "user_id": user_id.to_string() };
        if unread_only {
            filter.insert("is_read", false);
        }
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        self.find_many(NOTIFICATIONS, filter, options).await
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> RedressResult<bool> {
        let filter = doc! { "id": id.to_string(), "user_id": user_id.to_string() };
        let result = self
            .collection(NOTIFICATIONS)
            .update_one(filter, doc! { "$set": { "is_read": true } }, None)
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redress_models::{InstanceStatus, UserRole};

    #[test]
    fn test_definition_query_fields() {
        let org = Uuid::new_v4();
        let query = definition_query(&DefinitionFilter {
            organization_id: Some(org),
            active_only: true,
            ..DefinitionFilter::default()
        });
        assert_eq!(query.get_str("organization_id").unwrap(), org.to_string());
        assert!(query.get_bool("is_active").unwrap());
        assert!(!query.contains_key("complaint_type_id"));
    }

    #[test]
    fn test_enum_filters_match_stored_form() {
        let query = instance_query(&InstanceFilter {
            status: Some(InstanceStatus::Escalated),
            incomplete_only: true,
            ..InstanceFilter::default()
        })
        .unwrap();
        assert_eq!(query.get_str("status").unwrap(), "ESCALATED");
        assert!(!query.get_bool("is_completed").unwrap());

        let query = user_query(&UserFilter {
            role: Some(UserRole::Department),
            ..UserFilter::default()
        })
        .unwrap();
        let stored = bson::to_bson(&UserRole::Department).unwrap();
        assert_eq!(query.get("role"), Some(&stored));
    }

    #[test]
    fn test_instance_document_keeps_string_ids() {
        let now = chrono::Utc::now();
        let instance = WorkflowInstance::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "intake", now, now);
        let document = bson::to_document(&instance).unwrap();
        assert_eq!(document.get_str("complaint_id").unwrap(), instance.complaint_id.to_string());

        let restored: WorkflowInstance = bson::from_document(document).unwrap();
        assert_eq!(restored.id, instance.id);
        assert_eq!(restored.current_stage_id, "intake");
    }
}
