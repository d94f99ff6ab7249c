//! Workflow Repository
//!
//! Persistence contracts for workflow definitions and instances.

use async_trait::async_trait;
use redress_models::{InstanceStatus, WorkflowDefinition, WorkflowInstance};
use redress_utils::RedressResult;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionFilter {
    pub organization_id: Option<Uuid>,
    pub complaint_type_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub active_only: bool,
}

impl DefinitionFilter {
    pub fn for_organization(organization_id: Uuid) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, definition: &WorkflowDefinition) -> bool {
        self.organization_id.map_or(true, |id| definition.organization_id == id)
            && self
                .complaint_type_id
                .map_or(true, |id| definition.complaint_type_id == Some(id))
            && self
                .department_id
                .map_or(true, |id| definition.department_id == Some(id))
            && (!self.active_only || definition.is_active)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceFilter {
    pub organization_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub status: Option<InstanceStatus>,
    pub incomplete_only: bool,
}

impl InstanceFilter {
    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        self.organization_id.map_or(true, |id| instance.organization_id == id)
            && self.workflow_id.map_or(true, |id| instance.workflow_id == id)
            && self.status.map_or(true, |status| instance.status == status)
            && (!self.incomplete_only || !instance.is_completed)
    }
}

#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn insert_definition(&self, definition: &WorkflowDefinition) -> RedressResult<()>;

    async fn get_definition(&self, id: Uuid) -> RedressResult<Option<WorkflowDefinition>>;

    /// Matching definitions ordered by creation time.
    async fn find_definitions(&self, filter: &DefinitionFilter) -> RedressResult<Vec<WorkflowDefinition>>;

    /// Returns false when no definition with that id exists.
    async fn replace_definition(&self, definition: &WorkflowDefinition) -> RedressResult<bool>;

    async fn delete_definition(&self, id: Uuid) -> RedressResult<bool>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Fails with `Conflict` if the complaint already has an instance.
    async fn insert_instance(&self, instance: &WorkflowInstance) -> RedressResult<()>;

    async fn get_instance(&self, id: Uuid) -> RedressResult<Option<WorkflowInstance>>;

    async fn find_instance_by_complaint(&self, complaint_id: Uuid) -> RedressResult<Option<WorkflowInstance>>;

    async fn find_instances(&self, filter: &InstanceFilter) -> RedressResult<Vec<WorkflowInstance>>;

    /// Compare-and-swap on `instance.version`. On success the stored and the
    /// passed instance both carry the bumped version; a stale version fails
    /// with `ConcurrentModification`.
    async fn update_instance(&self, instance: &mut WorkflowInstance) -> RedressResult<()>;
}
