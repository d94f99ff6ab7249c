//! In-memory store
//!
//! Insertion-ordered tables behind tokio `RwLock`s. Backs the `memory`
//! storage backend and every engine test.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use redress_models::{
    Complaint, ComplaintType, Department, Notification, Organization, User, WorkflowDefinition,
    WorkflowInstance,
};
use redress_utils::{RedressError, RedressResult};

use crate::repositories::{
    ComplaintStore, DefinitionFilter, DefinitionStore, DirectoryStore, InstanceFilter, InstanceStore,
    NotificationStore, UserFilter,
};

type Table<T> = Arc<RwLock<Vec<T>>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    definitions: Table<WorkflowDefinition>,
    instances: Table<WorkflowInstance>,
    complaints: Table<Complaint>,
    organizations: Table<Organization>,
    departments: Table<Department>,
    complaint_types: Table<ComplaintType>,
    users: Table<User>,
    notifications: Table<Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn insert_unique<T: Clone>(table: &Table<T>, record: &T, id: Uuid, id_of: impl Fn(&T) -> Uuid, kind: &str) -> RedressResult<()> {
    let mut rows = table.write().await;
    if rows.iter().any(|r| id_of(r) == id) {
        return Err(RedressError::conflict(format!("{} {} already exists", kind, id)));
    }
    rows.push(record.clone());
    Ok(())
}

async fn find_by_id<T: Clone>(table: &Table<T>, id: Uuid, id_of: impl Fn(&T) -> Uuid) -> Option<T> {
    table.read().await.iter().find(|r| id_of(r) == id).cloned()
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn insert_definition(&self, definition: &WorkflowDefinition) -> RedressResult<()> {
        insert_unique(&self.definitions, definition, definition.id, |d| d.id, "Workflow definition").await
    }

    async fn get_definition(&self, id: Uuid) -> RedressResult<Option<WorkflowDefinition>> {
        Ok(find_by_id(&self.definitions, id, |d| d.id).await)
    }

    async fn find_definitions(&self, filter: &DefinitionFilter) -> RedressResult<Vec<WorkflowDefinition>> {
        let rows = self.definitions.read().await;
        Ok(rows.iter().filter(|d| filter.matches(d)).cloned().collect())
    }

    async fn replace_definition(&self, definition: &WorkflowDefinition) -> RedressResult<bool> {
        let mut rows = self.definitions.write().await;
        match rows.iter_mut().find(|d| d.id == definition.id) {
            Some(row) => {
                *row = definition.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_definition(&self, id: Uuid) -> RedressResult<bool> {
        let mut rows = self.definitions.write().await;
        let before = rows.len();
        rows.retain(|d| d.id != id);
        Ok(rows.len() < before)
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> RedressResult<()> {
        let mut rows = self.instances.write().await;
        if rows.iter().any(|i| i.complaint_id == instance.complaint_id) {
            return Err(RedressError::conflict(format!(
                "Complaint {} already has a workflow instance",
                instance.complaint_id
            )));
        }
        rows.push(instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> RedressResult<Option<WorkflowInstance>> {
        Ok(find_by_id(&self.instances, id, |i| i.id).await)
    }

    async fn find_instance_by_complaint(&self, complaint_id: Uuid) -> RedressResult<Option<WorkflowInstance>> {
        let rows = self.instances.read().await;
        Ok(rows.iter().find(|i| i.complaint_id == complaint_id).cloned())
    }

    async fn find_instances(&self, filter: &InstanceFilter) -> RedressResult<Vec<WorkflowInstance>> {
        let rows = self.instances.read().await;
        Ok(rows.iter().filter(|i| filter.matches(i)).cloned().collect())
    }

    async fn update_instance(&self, instance: &mut WorkflowInstance) -> RedressResult<()> {
        let mut rows = self.instances.write().await;
        let row = rows
            .iter_mut()
            .find(|i| i.id == instance.id)
            .ok_or_else(|| RedressError::not_found(format!("Workflow instance {}", instance.id)))?;

        if row.version != instance.version {
            return Err(RedressError::concurrent_modification(format!("Workflow instance {}", instance.id)));
        }

        instance.version += 1;
        *row = instance.clone();
        Ok(())
    }
}

#[async_trait]
impl ComplaintStore for MemoryStore {
    async fn insert_complaint(&self, complaint: &Complaint) -> RedressResult<()> {
        insert_unique(&self.complaints, complaint, complaint.id, |c| c.id, "Complaint").await
    }

    async fn get_complaint(&self, id: Uuid) -> RedressResult<Option<Complaint>> {
        Ok(find_by_id(&self.complaints, id, |c| c.id).await)
    }

    async fn update_complaint(&self, complaint: &mut Complaint) -> RedressResult<()> {
        let mut rows = self.complaints.write().await;
        let row = rows
            .iter_mut()
            .find(|c| c.id == complaint.id)
            .ok_or_else(|| RedressError::not_found(format!("Complaint {}", complaint.id)))?;

        if row.version != complaint.version {
            return Err(RedressError::concurrent_modification(format!("Complaint {}", complaint.id)));
        }

        complaint.version += 1;
        *row = complaint.clone();
        Ok(())
    }

    async fn count_open_assigned(&self, user_id: Uuid) -> RedressResult<u64> {
        let rows = self.complaints.read().await;
        Ok(rows
            .iter()
            .filter(|c| c.assigned_to == Some(user_id) && c.status.is_open())
            .count() as u64)
    }

    async fn find_complaints(&self, organization_id: Uuid, complainant_id: Option<Uuid>) -> RedressResult<Vec<Complaint>> {
        let rows = self.complaints.read().await;
        Ok(rows
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| complainant_id.map_or(true, |id| c.complainant_id == id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn insert_organization(&self, organization: &Organization) -> RedressResult<()> {
        let mut rows = self.organizations.write().await;
        if rows.iter().any(|o| o.name.eq_ignore_ascii_case(&organization.name)) {
            return Err(RedressError::conflict(format!("Organization '{}' already exists", organization.name)));
        }
        rows.push(organization.clone());
        Ok(())
    }

    async fn get_organization(&self, id: Uuid) -> RedressResult<Option<Organization>> {
        Ok(find_by_id(&self.organizations, id, |o| o.id).await)
    }

    async fn insert_department(&self, department: &Department) -> RedressResult<()> {
        insert_unique(&self.departments, department, department.id, |d| d.id, "Department").await
    }

    async fn get_department(&self, id: Uuid) -> RedressResult<Option<Department>> {
        Ok(find_by_id(&self.departments, id, |d| d.id).await)
    }

    async fn insert_complaint_type(&self, complaint_type: &ComplaintType) -> RedressResult<()> {
        insert_unique(&self.complaint_types, complaint_type, complaint_type.id, |t| t.id, "Complaint type").await
    }

    async fn get_complaint_type(&self, id: Uuid) -> RedressResult<Option<ComplaintType>> {
        Ok(find_by_id(&self.complaint_types, id, |t| t.id).await)
    }

    async fn insert_user(&self, user: &User) -> RedressResult<()> {
        insert_unique(&self.users, user, user.id, |u| u.id, "User").await
    }

    async fn get_user(&self, id: Uuid) -> RedressResult<Option<User>> {
        Ok(find_by_id(&self.users, id, |u| u.id).await)
    }

    async fn find_users(&self, filter: &UserFilter) -> RedressResult<Vec<User>> {
        let rows = self.users.read().await;
        Ok(rows.iter().filter(|u| filter.matches(u)).cloned().collect())
    }

    async fn find_user_by_token_digest(&self, digest: &str) -> RedressResult<Option<User>> {
        let rows = self.users.read().await;
        Ok(rows
            .iter()
            .find(|u| u.api_token_digest.as_deref() == Some(digest))
            .cloned())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> RedressResult<()> {
        self.notifications.write().await.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> RedressResult<Vec<Notification>> {
        let rows = self.notifications.read().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> RedressResult<bool> {
        let mut rows = self.notifications.write().await;
        match rows.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
