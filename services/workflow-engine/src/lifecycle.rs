//! Complaint Lifecycle Coordinator
//!
//! Ties complaints to workflows: creation starts the matching workflow, and
//! manual status edits drive the workflow to the stage that owns the status
//! so stage position and status never disagree.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use redress_database::{ComplaintStore, DirectoryStore};
use redress_models::{Complaint, ComplaintStatus, Priority};
use redress_utils::{validate_model, RedressError, RedressResult};

use crate::engine::WorkflowEngine;
use crate::state_machine::Trigger;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateComplaintRequest {
    pub complaint_type_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "Description must be between 1 and 5000 characters"))]
    pub description: String,
    pub department_id: Option<Uuid>,
    pub priority: Option<Priority>,
}

#[derive(Clone)]
pub struct ComplaintLifecycle {
    engine: WorkflowEngine,
    complaints: Arc<dyn ComplaintStore>,
    directory: Arc<dyn DirectoryStore>,
}

impl ComplaintLifecycle {
    pub fn new(engine: WorkflowEngine, complaints: Arc<dyn ComplaintStore>, directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            engine,
            complaints,
            directory,
        }
    }

    /// Persists a new complaint and starts its workflow. A workflow that
    /// fails to start is logged; the complaint still exists.
    pub async fn create_complaint(
        &self,
        organization_id: Uuid,
        complainant_id: Uuid,
        request: CreateComplaintRequest,
    ) -> RedressResult<Complaint> {
        validate_model(&request)?;

        let complaint_type = self
            .directory
            .get_complaint_type(request.complaint_type_id)
            .await?
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| {
                RedressError::invalid_reference(
                    "complaint_type_id",
                    format!("Complaint type {} does not belong to this organization", request.complaint_type_id),
                )
            })?;

        let mut complaint = Complaint::new(
            organization_id,
            complaint_type.id,
            complainant_id,
            request.title,
            request.description,
        );
        complaint.department_id = request.department_id.or(complaint_type.department_id);
        if let Some(priority) = request.priority {
            complaint.priority = priority;
        }

        if let Some(department_id) = complaint.department_id {
            let owned = self
                .directory
                .get_department(department_id)
                .await?
                .is_some_and(|d| d.organization_id == organization_id);
            if !owned {
                return Err(RedressError::invalid_reference(
                    "department_id",
                    format!("Department {} does not belong to this organization", department_id),
                ));
            }
        }

        self.complaints.insert_complaint(&complaint).await?;
        tracing::info!(complaint_id = %complaint.id, organization_id = %organization_id, "Complaint created");

        match self.engine.initialize(&mut complaint).await {
            Ok(Some(instance)) => {
                tracing::debug!(complaint_id = %complaint.id, instance_id = %instance.id, "Complaint entered workflow");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(complaint_id = %complaint.id, error = %e, "Failed to start workflow for complaint");
            }
        }

        Ok(complaint)
    }

    pub async fn get_complaint(&self, organization_id: Uuid, id: Uuid) -> RedressResult<Complaint> {
        self.complaints
            .get_complaint(id)
            .await?
            .filter(|c| c.organization_id == organization_id)
            .ok_or_else(|| RedressError::not_found(format!("Complaint {}", id)))
    }

    /// Manual status edit. When the complaint's workflow has a stage whose
    /// actions set `status`, the instance advances there and the stage's
    /// actions apply the status; otherwise the status is set directly.
    pub async fn update_status(
        &self,
        organization_id: Uuid,
        complaint_id: Uuid,
        status: ComplaintStatus,
        actor: Option<Uuid>,
    ) -> RedressResult<Complaint> {
        let mut complaint = self.get_complaint(organization_id, complaint_id).await?;

        if let Some(instance) = self.engine.get_for_complaint(complaint_id).await? {
            if instance.accepts_transitions() {
                let definition = self.engine.load_definition(instance.workflow_id).await?;
                let target = definition
                    .stage_for_status(status)
                    .filter(|stage| stage.id != instance.current_stage_id)
                    .map(|stage| stage.id.clone());

                if let Some(target) = target {
                    self.engine
                        .transition(&definition, instance, &target, actor, None, Trigger::Status, Utc::now())
                        .await?;

                    let mut complaint = self.get_complaint(organization_id, complaint_id).await?;
                    // A completing stage closes the complaint; otherwise the
                    // requested status stands.
                    if complaint.status != status && complaint.status != ComplaintStatus::Closed {
                        complaint.apply_status(status, Utc::now());
                        self.complaints.update_complaint(&mut complaint).await?;
                    }
                    return Ok(complaint);
                }
            }
        }

        let previous = complaint.apply_status(status, Utc::now());
        self.complaints.update_complaint(&mut complaint).await?;
        tracing::info!(
            complaint_id = %complaint_id,
            from = %previous,
            to = %status,
            "Complaint status set directly"
        );
        Ok(complaint)
    }

    /// Complaints visible to a principal: all of the organization's, or
    /// only their own for complainants.
    pub async fn list_complaints(&self, organization_id: Uuid, complainant_id: Option<Uuid>) -> RedressResult<Vec<Complaint>> {
        self.complaints.find_complaints(organization_id, complainant_id).await
    }
}
