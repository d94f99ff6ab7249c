//! Workflow Definition Store
//!
//! Organization-scoped CRUD over workflow definitions. Every create and
//! update re-validates the stage graph and the directory references before
//! anything is written.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use redress_database::{DefinitionFilter, DefinitionStore, DirectoryStore, InstanceFilter, InstanceStore};
use redress_models::{Stage, WorkflowDefinition};
use redress_utils::{validate_model, RedressError, RedressResult};

use crate::engine::WorkflowEngine;
use crate::templates::TemplateLibrary;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDefinitionRequest {
    #[validate(length(min = 1, max = 200, message = "Workflow name must be between 1 and 200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub complaint_type_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub stages: Vec<Stage>,
}

fn default_active() -> bool {
    true
}

/// Partial update. `stages`, when present, replaces the whole array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDefinitionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub complaint_type_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub stages: Option<Vec<Stage>>,
}

/// Overrides applied when instantiating a catalog template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstantiateTemplateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub complaint_type_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

pub struct DefinitionService {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    directory: Arc<dyn DirectoryStore>,
    templates: Arc<TemplateLibrary>,
}

impl DefinitionService {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        directory: Arc<dyn DirectoryStore>,
        templates: Arc<TemplateLibrary>,
    ) -> Self {
        Self {
            definitions,
            instances,
            directory,
            templates,
        }
    }

    pub fn templates(&self) -> &TemplateLibrary {
        &self.templates
    }

    pub async fn create(
        &self,
        organization_id: Uuid,
        request: CreateDefinitionRequest,
        created_by: Option<Uuid>,
    ) -> RedressResult<WorkflowDefinition> {
        validate_model(&request)?;

        let mut definition = WorkflowDefinition::new(organization_id, request.name, request.stages);
        definition.description = request.description;
        definition.complaint_type_id = request.complaint_type_id;
        definition.department_id = request.department_id;
        definition.is_active = request.is_active;
        definition.created_by = created_by;

        self.check(&definition).await?;
        self.definitions.insert_definition(&definition).await?;

        tracing::info!(
            workflow_id = %definition.id,
            organization_id = %organization_id,
            stages = definition.stages.len(),
            "Workflow definition created"
        );
        Ok(definition)
    }

    pub async fn get(&self, organization_id: Uuid, id: Uuid) -> RedressResult<WorkflowDefinition> {
        self.definitions
            .get_definition(id)
            .await?
            .filter(|d| d.organization_id == organization_id)
            .ok_or_else(|| RedressError::not_found(format!("Workflow definition {}", id)))
    }

    /// Definitions of one organization; the filter's organization is forced.
    pub async fn list(&self, organization_id: Uuid, filter: DefinitionFilter) -> RedressResult<Vec<WorkflowDefinition>> {
        let filter = DefinitionFilter {
            organization_id: Some(organization_id),
            ..filter
        };
        self.definitions.find_definitions(&filter).await
    }

    pub async fn update(
        &self,
        organization_id: Uuid,
        id: Uuid,
        patch: UpdateDefinitionRequest,
    ) -> RedressResult<WorkflowDefinition> {
        let mut definition = self.get(organization_id, id).await?;

        if let Some(name) = patch.name {
            definition.name = name;
        }
        if let Some(description) = patch.description {
            definition.description = Some(description);
        }
        if let Some(complaint_type_id) = patch.complaint_type_id {
            definition.complaint_type_id = Some(complaint_type_id);
        }
        if let Some(department_id) = patch.department_id {
            definition.department_id = Some(department_id);
        }
        if let Some(is_active) = patch.is_active {
            definition.is_active = is_active;
        }
        let stages_replaced = patch.stages.is_some();
        if let Some(stages) = patch.stages {
            definition.stages = stages;
        }
        definition.updated_at = Utc::now();

        self.check(&definition).await?;
        if stages_replaced {
            self.check_running_stages(&definition).await?;
        }

        if !self.definitions.replace_definition(&definition).await? {
            return Err(RedressError::not_found(format!("Workflow definition {}", id)));
        }

        tracing::info!(workflow_id = %id, "Workflow definition updated");
        Ok(definition)
    }

    /// Refuses while any running instance still references the definition.
    pub async fn delete(&self, organization_id: Uuid, id: Uuid) -> RedressResult<()> {
        let definition = self.get(organization_id, id).await?;

        let filter = InstanceFilter {
            workflow_id: Some(definition.id),
            incomplete_only: true,
            ..InstanceFilter::default()
        };
        let running = self
            .instances
            .find_instances(&filter)
            .await?
            .into_iter()
            .filter(WorkflowEngine::blocks_deletion)
            .count();
        if running > 0 {
            return Err(RedressError::conflict(format!(
                "Workflow definition {} is used by {} running instance(s)",
                id, running
            )));
        }

        if !self.definitions.delete_definition(id).await? {
            return Err(RedressError::not_found(format!("Workflow definition {}", id)));
        }

        tracing::info!(workflow_id = %id, "Workflow definition deleted");
        Ok(())
    }

    /// Copies a catalog template's stages verbatim into a new definition.
    pub async fn create_from_template(
        &self,
        organization_id: Uuid,
        template_id: &str,
        request: InstantiateTemplateRequest,
        created_by: Option<Uuid>,
    ) -> RedressResult<WorkflowDefinition> {
        let template = self
            .templates
            .get_by_id(template_id)
            .ok_or_else(|| RedressError::not_found(format!("Workflow template {}", template_id)))?;

        let create = CreateDefinitionRequest {
            name: request.name.unwrap_or_else(|| template.name.clone()),
            description: request.description.or_else(|| Some(template.description.clone())),
            complaint_type_id: request.complaint_type_id,
            department_id: request.department_id,
            is_active: request.is_active.unwrap_or(true),
            stages: template.stages.clone(),
        };
        self.create(organization_id, create, created_by).await
    }

    async fn check(&self, definition: &WorkflowDefinition) -> RedressResult<()> {
        validate_model(definition)?;
        definition.validate_graph()?;
        self.check_references(definition).await?;
        self.check_single_active(definition).await
    }

    async fn check_references(&self, definition: &WorkflowDefinition) -> RedressResult<()> {
        if let Some(id) = definition.complaint_type_id {
            let owned = self
                .directory
                .get_complaint_type(id)
                .await?
                .is_some_and(|t| t.organization_id == definition.organization_id);
            if !owned {
                return Err(RedressError::invalid_reference(
                    "complaint_type_id",
                    format!("Complaint type {} does not belong to this organization", id),
                ));
            }
        }

        if let Some(id) = definition.department_id {
            let owned = self
                .directory
                .get_department(id)
                .await?
                .is_some_and(|d| d.organization_id == definition.organization_id);
            if !owned {
                return Err(RedressError::invalid_reference(
                    "department_id",
                    format!("Department {} does not belong to this organization", id),
                ));
            }
        }

        Ok(())
    }

    /// Only one active definition per (organization, complaint type).
    async fn check_single_active(&self, definition: &WorkflowDefinition) -> RedressResult<()> {
        let Some(complaint_type_id) = definition.complaint_type_id else {
            return Ok(());
        };
        if !definition.is_active {
            return Ok(());
        }

        let filter = DefinitionFilter {
            organization_id: Some(definition.organization_id),
            complaint_type_id: Some(complaint_type_id),
            active_only: true,
            ..DefinitionFilter::default()
        };
        let existing = self.definitions.find_definitions(&filter).await?;
        if let Some(other) = existing.iter().find(|d| d.id != definition.id) {
            return Err(RedressError::conflict(format!(
                "Workflow '{}' is already active for this complaint type",
                other.name
            )));
        }
        Ok(())
    }

    /// A stage array replacement must keep every running instance's current stage.
    async fn check_running_stages(&self, definition: &WorkflowDefinition) -> RedressResult<()> {
        let filter = InstanceFilter {
            workflow_id: Some(definition.id),
            incomplete_only: true,
            ..InstanceFilter::default()
        };
        for instance in self.instances.find_instances(&filter).await? {
            if instance.accepts_transitions() && definition.stage(&instance.current_stage_id).is_none() {
                return Err(RedressError::conflict(format!(
                    "Stage '{}' is the current stage of running instance {}",
                    instance.current_stage_id, instance.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use redress_database::MemoryStore;
    use redress_models::{ComplaintType, Department, Transition, WorkflowInstance};

    struct Fixture {
        store: Arc<MemoryStore>,
        service: DefinitionService,
        org: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let templates = Arc::new(TemplateLibrary::builtin().unwrap());
        let service = DefinitionService::new(store.clone(), store.clone(), store.clone(), templates);
        Fixture {
            store,
            service,
            org: Uuid::new_v4(),
        }
    }

    fn stages() -> Vec<Stage> {
        vec![
            Stage::new("open", "Open", 1).with_transition(Transition::always("closed")),
            Stage::new("closed", "Closed", 2),
        ]
    }

    fn request(stages: Vec<Stage>) -> CreateDefinitionRequest {
        CreateDefinitionRequest {
            name: "Default".to_string(),
            description: None,
            complaint_type_id: None,
            department_id: None,
            is_active: true,
            stages,
        }
    }

    impl Fixture {
        async fn complaint_type(&self, org: Uuid) -> Uuid {
            let t = ComplaintType {
                id: Uuid::new_v4(),
                organization_id: org,
                department_id: None,
                name: "Noise".to_string(),
                description: None,
                created_at: Utc::now(),
            };
            self.store.insert_complaint_type(&t).await.unwrap();
            t.id
        }
    }

    #[tokio::test]
    async fn test_duplicate_stage_id_rejected_and_nothing_persisted() {
        let fx = fixture();
        let mut bad = stages();
        bad[1].id = "open".to_string();

        let err = fx.service.create(fx.org, request(bad), None).await.unwrap_err();
        assert!(matches!(err, RedressError::Validation { .. }));
        assert!(fx.service.list(fx.org, DefinitionFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let fx = fixture();
        let mut req = request(stages());
        req.name = String::new();
        let err = fx.service.create(fx.org, req, None).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_foreign_references_rejected() {
        let fx = fixture();
        let foreign_type = fx.complaint_type(Uuid::new_v4()).await;
        let mut req = request(stages());
        req.complaint_type_id = Some(foreign_type);
        let err = fx.service.create(fx.org, req, None).await.unwrap_err();
        assert!(matches!(err, RedressError::InvalidReference { ref field, .. } if field == "complaint_type_id"));

        let department = Department {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "Elsewhere".to_string(),
            description: None,
            created_at: Utc::now(),
        };
        fx.store.insert_department(&department).await.unwrap();
        let mut req = request(stages());
        req.department_id = Some(department.id);
        let err = fx.service.create(fx.org, req, None).await.unwrap_err();
        assert!(matches!(err, RedressError::InvalidReference { ref field, .. } if field == "department_id"));
    }

    #[tokio::test]
    async fn test_second_active_definition_for_type_conflicts() {
        let fx = fixture();
        let complaint_type = fx.complaint_type(fx.org).await;
        let mut req = request(stages());
        req.complaint_type_id = Some(complaint_type);
        let first = fx.service.create(fx.org, req.clone(), None).await.unwrap();

        let err = fx.service.create(fx.org, req.clone(), None).await.unwrap_err();
        assert!(matches!(err, RedressError::Conflict { .. }));

        req.is_active = false;
        let second = fx.service.create(fx.org, req, None).await.unwrap();

        fx.service
            .update(fx.org, first.id, UpdateDefinitionRequest { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        let activated = fx
            .service
            .update(fx.org, second.id, UpdateDefinitionRequest { is_active: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert!(activated.is_active);
    }

    #[tokio::test]
    async fn test_update_revalidates_stages() {
        let fx = fixture();
        let def = fx.service.create(fx.org, request(stages()), None).await.unwrap();

        let mut broken = stages();
        broken[0].transitions = vec![Transition::always("archived")];
        let err = fx
            .service
            .update(fx.org, def.id, UpdateDefinitionRequest { stages: Some(broken), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, RedressError::Validation { .. }));

        let stored = fx.service.get(fx.org, def.id).await.unwrap();
        assert_eq!(stored.stages, stages());
    }

    #[tokio::test]
    async fn test_update_cannot_drop_current_stage_of_running_instance() {
        let fx = fixture();
        let def = fx.service.create(fx.org, request(stages()), None).await.unwrap();
        let now = Utc::now();
        let instance = WorkflowInstance::new(def.id, Uuid::new_v4(), fx.org, "open", now, now);
        fx.store.insert_instance(&instance).await.unwrap();

        let err = fx
            .service
            .update(
                fx.org,
                def.id,
                UpdateDefinitionRequest {
                    stages: Some(vec![Stage::new("closed", "Closed", 2)]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RedressError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_other_organization_cannot_see_definition() {
        let fx = fixture();
        let def = fx.service.create(fx.org, request(stages()), None).await.unwrap();
        let err = fx.service.get(Uuid::new_v4(), def.id).await.unwrap_err();
        assert!(matches!(err, RedressError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_from_unknown_template() {
        let fx = fixture();
        let err = fx
            .service
            .create_from_template(fx.org, "no-such-template", InstantiateTemplateRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RedressError::NotFound { .. }));
    }
}
