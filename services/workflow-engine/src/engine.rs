//! Workflow Instance Engine
//!
//! Owns every mutation of a `WorkflowInstance`. Each operation plans the
//! next instance with the pure functions in `state_machine`, commits it with
//! a compare-and-swap on the instance version, and only then runs stage
//! actions. Action failures and dispatch failures never undo a committed
//! transition.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use redress_database::{ComplaintStore, DefinitionFilter, DefinitionStore, InstanceStore};
use redress_models::{
    ActionRecord, Complaint, ComplaintChanges, ComplaintStatus, InstanceStatus, Stage, WorkflowDefinition,
    WorkflowInstance,
};
use redress_utils::{RedressError, RedressResult};

use crate::executor::{escalate_for_sla, StageActionExecutor};
use crate::metrics::{ESCALATIONS, INSTANCE_COMPLETIONS, STAGE_TRANSITIONS};
use crate::state_machine::{self, Trigger};

#[derive(Clone)]
pub struct WorkflowEngine {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    complaints: Arc<dyn ComplaintStore>,
    executor: StageActionExecutor,
}

impl WorkflowEngine {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        complaints: Arc<dyn ComplaintStore>,
        executor: StageActionExecutor,
    ) -> Self {
        Self {
            definitions,
            instances,
            complaints,
            executor,
        }
    }

    pub async fn load_instance(&self, instance_id: Uuid) -> RedressResult<WorkflowInstance> {
        self.instances
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| RedressError::not_found(format!("Workflow instance {}", instance_id)))
    }

    pub async fn load_definition(&self, workflow_id: Uuid) -> RedressResult<WorkflowDefinition> {
        self.definitions
            .get_definition(workflow_id)
            .await?
            .ok_or_else(|| RedressError::not_found(format!("Workflow definition {}", workflow_id)))
    }

    pub async fn get_for_complaint(&self, complaint_id: Uuid) -> RedressResult<Option<WorkflowInstance>> {
        self.instances.find_instance_by_complaint(complaint_id).await
    }

    /// The active definition for the complaint's organization and type.
    async fn matching_definition(&self, complaint: &Complaint) -> RedressResult<Option<WorkflowDefinition>> {
        let filter = DefinitionFilter {
            organization_id: Some(complaint.organization_id),
            complaint_type_id: Some(complaint.complaint_type_id),
            active_only: true,
            ..DefinitionFilter::default()
        };
        let mut matches = self.definitions.find_definitions(&filter).await?;
        if matches.len() > 1 {
            tracing::warn!(
                complaint_id = %complaint.id,
                count = matches.len(),
                "Several active workflows match, using the oldest"
            );
        }
        Ok(if matches.is_empty() { None } else { Some(matches.remove(0)) })
    }

    /// Starts the complaint's workflow and runs the entry stage's actions.
    /// Returns `None` when no active definition matches. `complaint` receives
    /// the entry actions' changes, which are also persisted.
    pub async fn initialize(&self, complaint: &mut Complaint) -> RedressResult<Option<WorkflowInstance>> {
        let Some(definition) = self.matching_definition(complaint).await? else {
            tracing::debug!(complaint_id = %complaint.id, "No active workflow for complaint type");
            return Ok(None);
        };

        let now = Utc::now();
        let plan = state_machine::plan_start(&definition, complaint, now)?;
        self.instances.insert_instance(&plan.instance).await?;

        tracing::info!(
            instance_id = %plan.instance.id,
            complaint_id = %complaint.id,
            workflow_id = %definition.id,
            stage_id = %plan.entry_stage.id,
            "Workflow instance started"
        );

        let instance = self
            .enter_stage(plan.instance, &plan.entry_stage, complaint, None, plan.completes, now)
            .await;
        Ok(Some(instance))
    }

    /// Moves the instance to `target_stage_id` on behalf of `actor`.
    pub async fn advance(
        &self,
        instance_id: Uuid,
        target_stage_id: &str,
        actor: Option<Uuid>,
        comment: Option<&str>,
    ) -> RedressResult<WorkflowInstance> {
        let instance = self.load_instance(instance_id).await?;
        let definition = self.load_definition(instance.workflow_id).await?;
        self.transition(&definition, instance, target_stage_id, actor, comment, Trigger::Manual, Utc::now())
            .await
    }

    /// Shared advance mechanics: plan, commit, mirror onto the complaint, run
    /// the entered stage's actions.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn transition(
        &self,
        definition: &WorkflowDefinition,
        instance: WorkflowInstance,
        target_stage_id: &str,
        actor: Option<Uuid>,
        comment: Option<&str>,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> RedressResult<WorkflowInstance> {
        let plan = state_machine::plan_advance(definition, &instance, target_stage_id, actor, comment, now)?;
        let mut committed = plan.instance;
        self.instances.update_instance(&mut committed).await?;

        STAGE_TRANSITIONS.with_label_values(&[trigger.as_str()]).inc();
        tracing::info!(
            instance_id = %committed.id,
            complaint_id = %committed.complaint_id,
            from = %plan.from_stage_id,
            to = %plan.target.id,
            trigger = trigger.as_str(),
            "Stage transition committed"
        );

        let mut complaint = match self.complaints.get_complaint(committed.complaint_id).await {
            Ok(Some(complaint)) => complaint,
            Ok(None) => {
                tracing::warn!(complaint_id = %committed.complaint_id, "Complaint missing, stage actions skipped");
                return Ok(committed);
            }
            Err(e) => {
                tracing::error!(complaint_id = %committed.complaint_id, error = %e, "Could not load complaint, stage actions skipped");
                return Ok(committed);
            }
        };

        Ok(self
            .enter_stage(committed, &plan.target, &mut complaint, actor, plan.completes, now)
            .await)
    }

    /// Mirrors the stage onto the complaint, runs the stage's actions, mirrors
    /// completion and persists both the complaint and the action records.
    /// Never fails: the stage change is already committed.
    async fn enter_stage(
        &self,
        instance: WorkflowInstance,
        stage: &Stage,
        complaint: &mut Complaint,
        actor: Option<Uuid>,
        completes: bool,
        now: DateTime<Utc>,
    ) -> WorkflowInstance {
        let loaded = complaint.clone();
        complaint.current_stage = Some(stage.name.clone());
        complaint.updated_at = now;

        let outcome = self.executor.execute(stage, complaint, actor, now).await;

        if completes {
            complaint.apply_status(ComplaintStatus::Closed, now);
            INSTANCE_COMPLETIONS.inc();
            tracing::info!(instance_id = %instance.id, complaint_id = %complaint.id, "Workflow instance completed");
        }

        if let Err(e) = self.persist_complaint(&loaded, complaint).await {
            tracing::error!(complaint_id = %complaint.id, error = %e, "Failed to persist complaint after stage entry");
        }

        self.record_outcome(instance, &stage.id, outcome.records, outcome.escalated, now)
            .await
    }

    /// Writes the fields changed since `loaded`. Stage actions await I/O, so
    /// another writer may have bumped the version meanwhile; on that race the
    /// changes are replayed once onto a fresh read.
    async fn persist_complaint(&self, loaded: &Complaint, complaint: &mut Complaint) -> RedressResult<()> {
        let changes = ComplaintChanges::between(loaded, complaint);
        if changes.is_empty() {
            return Ok(());
        }

        match self.complaints.update_complaint(complaint).await {
            Err(RedressError::ConcurrentModification { .. }) => {
                let mut fresh = self
                    .complaints
                    .get_complaint(complaint.id)
                    .await?
                    .ok_or_else(|| RedressError::not_found(format!("Complaint {}", complaint.id)))?;
                changes.apply_to(&mut fresh);
                self.complaints.update_complaint(&mut fresh).await?;
                *complaint = fresh;
                Ok(())
            }
            other => other,
        }
    }

    /// Appends action records (and the escalated flag) to the instance,
    /// re-reading once if another writer got there first.
    async fn record_outcome(
        &self,
        instance: WorkflowInstance,
        stage_id: &str,
        records: Vec<ActionRecord>,
        escalate: bool,
        now: DateTime<Utc>,
    ) -> WorkflowInstance {
        let Some(mut next) = state_machine::apply_stage_outcome(&instance, stage_id, &records, escalate, now) else {
            return instance;
        };

        let result = match self.instances.update_instance(&mut next).await {
            Ok(()) => return next,
            Err(RedressError::ConcurrentModification { .. }) => self.retry_record(instance.id, stage_id, &records, escalate, now).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(updated)) => updated,
            Ok(None) => instance,
            Err(e) => {
                tracing::error!(instance_id = %instance.id, stage_id, error = %e, "Failed to record stage actions");
                instance
            }
        }
    }

    async fn retry_record(
        &self,
        instance_id: Uuid,
        stage_id: &str,
        records: &[ActionRecord],
        escalate: bool,
        now: DateTime<Utc>,
    ) -> RedressResult<Option<WorkflowInstance>> {
        let fresh = self.load_instance(instance_id).await?;
        match state_machine::apply_stage_outcome(&fresh, stage_id, records, escalate, now) {
            Some(mut next) => {
                self.instances.update_instance(&mut next).await?;
                Ok(Some(next))
            }
            None => Ok(Some(fresh)),
        }
    }

    /// Recomputes the expected completion date from the current stage on;
    /// writes only when it moved materially.
    pub async fn recompute_expected_completion(&self, instance_id: Uuid) -> RedressResult<WorkflowInstance> {
        let mut instance = self.load_instance(instance_id).await?;
        let definition = self.load_definition(instance.workflow_id).await?;
        let now = Utc::now();

        if let Some(expected) = state_machine::recompute_expected_completion(&definition, &instance, now)? {
            instance.expected_completion_date = expected;
            instance.updated_at = now;
            self.instances.update_instance(&mut instance).await?;
        }
        Ok(instance)
    }

    /// Explicit escalation: status only, stage and history untouched.
    pub async fn escalate(&self, instance_id: Uuid) -> RedressResult<WorkflowInstance> {
        let instance = self.load_instance(instance_id).await?;
        let Some(mut next) = state_machine::plan_escalation(&instance, Utc::now())? else {
            return Ok(instance);
        };
        self.instances.update_instance(&mut next).await?;

        ESCALATIONS.with_label_values(&["manual"]).inc();
        tracing::info!(instance_id = %next.id, complaint_id = %next.complaint_id, "Workflow instance escalated");
        Ok(next)
    }

    /// SLA-breach escalation driven by the scheduler: marks the instance,
    /// bumps the complaint and records the escalation on the open entry.
    pub(crate) async fn escalate_overdue(
        &self,
        instance: WorkflowInstance,
        stage: &Stage,
        complaint: &mut Complaint,
        now: DateTime<Utc>,
    ) -> RedressResult<WorkflowInstance> {
        let Some(mut committed) = state_machine::plan_escalation(&instance, now)? else {
            return Ok(instance);
        };
        self.instances.update_instance(&mut committed).await?;
        ESCALATIONS.with_label_values(&["sla"]).inc();

        let loaded = complaint.clone();
        let record = escalate_for_sla(&self.executor, stage, complaint, now).await;
        if let Err(e) = self.persist_complaint(&loaded, complaint).await {
            tracing::error!(complaint_id = %complaint.id, error = %e, "Failed to persist SLA escalation");
        }

        tracing::warn!(
            instance_id = %committed.id,
            complaint_id = %complaint.id,
            stage_id = %stage.id,
            "SLA breached, instance escalated"
        );
        Ok(self.record_outcome(committed, &stage.id, vec![record], false, now).await)
    }

    /// Cancels a live instance. Canceled instances accept no transitions.
    pub async fn cancel(&self, instance_id: Uuid, actor: Option<Uuid>, reason: Option<&str>) -> RedressResult<WorkflowInstance> {
        let instance = self.load_instance(instance_id).await?;
        let mut next = state_machine::plan_cancel(&instance, actor, reason, Utc::now())?;
        self.instances.update_instance(&mut next).await?;

        tracing::info!(instance_id = %next.id, complaint_id = %next.complaint_id, "Workflow instance canceled");
        Ok(next)
    }

    /// Stages the instance may legally move to next. Empty once finished.
    pub async fn available_transitions(&self, instance_id: Uuid) -> RedressResult<Vec<Stage>> {
        let instance = self.load_instance(instance_id).await?;
        if !instance.accepts_transitions() {
            return Ok(Vec::new());
        }
        let definition = self.load_definition(instance.workflow_id).await?;
        Ok(definition
            .reachable_from(&instance.current_stage_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Whether the instance still counts as running for deletion checks.
    pub fn blocks_deletion(instance: &WorkflowInstance) -> bool {
        !instance.is_completed && instance.status != InstanceStatus::Canceled
    }
}
