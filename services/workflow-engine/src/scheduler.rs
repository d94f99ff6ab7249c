//! Timed-Transition Scheduler
//!
//! Periodic sweep over running instances. An instance whose open stage has
//! outlived its `duration_in_hours` either follows the stage's first
//! TIME_BASED transition or, when there is none, is escalated for breaching
//! its SLA. Failures are isolated per instance.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use uuid::Uuid;

use redress_database::{ComplaintStore, InstanceFilter, InstanceStore};
use redress_models::{InstanceStatus, WorkflowDefinition, WorkflowInstance};
use redress_utils::{RedressError, RedressResult};

use crate::engine::WorkflowEngine;
use crate::metrics::{SWEEP_DURATION, SWEEP_FAILURES};
use crate::state_machine::{self, Trigger};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub advanced: usize,
    pub escalated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    NotDue,
    Advanced,
    Escalated,
    AlreadyEscalated,
}

#[derive(Clone)]
pub struct TimedTransitionScheduler {
    engine: WorkflowEngine,
    instances: Arc<dyn InstanceStore>,
    complaints: Arc<dyn ComplaintStore>,
}

impl TimedTransitionScheduler {
    pub fn new(engine: WorkflowEngine, instances: Arc<dyn InstanceStore>, complaints: Arc<dyn ComplaintStore>) -> Self {
        Self {
            engine,
            instances,
            complaints,
        }
    }

    /// One pass over every ACTIVE, incomplete instance as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> RedressResult<SweepReport> {
        let timer = SWEEP_DURATION.start_timer();

        let filter = InstanceFilter {
            status: Some(InstanceStatus::Active),
            incomplete_only: true,
            ..InstanceFilter::default()
        };
        let due = self.instances.find_instances(&filter).await?;

        let mut report = SweepReport::default();
        let mut definitions: HashMap<Uuid, WorkflowDefinition> = HashMap::new();

        for instance in due {
            report.examined += 1;
            let instance_id = instance.id;

            match self.process(instance, &mut definitions, now).await {
                Ok(SweepAction::Advanced) => report.advanced += 1,
                Ok(SweepAction::Escalated) => report.escalated += 1,
                Ok(SweepAction::NotDue | SweepAction::AlreadyEscalated) => {}
                Err(e) => {
                    report.failed += 1;
                    SWEEP_FAILURES.inc();
                    tracing::error!(instance_id = %instance_id, error = %e, "Scheduler failed to process instance");
                }
            }
        }

        timer.observe_duration();
        if report.advanced + report.escalated + report.failed > 0 {
            tracing::info!(
                examined = report.examined,
                advanced = report.advanced,
                escalated = report.escalated,
                failed = report.failed,
                "Scheduler sweep finished"
            );
        } else {
            tracing::debug!(examined = report.examined, "Scheduler sweep finished");
        }
        Ok(report)
    }

    async fn process(
        &self,
        instance: WorkflowInstance,
        definitions: &mut HashMap<Uuid, WorkflowDefinition>,
        now: DateTime<Utc>,
    ) -> RedressResult<SweepAction> {
        if !definitions.contains_key(&instance.workflow_id) {
            let definition = self.engine.load_definition(instance.workflow_id).await?;
            definitions.insert(definition.id, definition);
        }
        let definition = definitions
            .get(&instance.workflow_id)
            .ok_or_else(|| RedressError::internal("definition cache miss"))?;

        let stage = definition.stage(&instance.current_stage_id).cloned().ok_or_else(|| {
            RedressError::invalid_reference(
                "current_stage_id",
                format!("Stage '{}' is not part of workflow {}", instance.current_stage_id, definition.id),
            )
        })?;

        let Some(deadline) = state_machine::stage_deadline(&instance, &stage)? else {
            return Ok(SweepAction::NotDue);
        };
        if now <= deadline {
            return Ok(SweepAction::NotDue);
        }

        if let Some(timed) = stage.first_timed_transition() {
            let target = timed.target_stage_id.clone();
            self.engine
                .transition(definition, instance, &target, None, None, Trigger::Timed, now)
                .await?;
            return Ok(SweepAction::Advanced);
        }

        let mut complaint = self
            .complaints
            .get_complaint(instance.complaint_id)
            .await?
            .ok_or_else(|| RedressError::not_found(format!("Complaint {}", instance.complaint_id)))?;
        if complaint.is_escalated() {
            return Ok(SweepAction::AlreadyEscalated);
        }

        self.engine.escalate_overdue(instance, &stage, &mut complaint, now).await?;
        Ok(SweepAction::Escalated)
    }

    /// Sweeps every `period` until the task is dropped. A failed sweep is
    /// logged and retried on the next tick.
    pub async fn run(self, period: Duration) {
        let mut ticker = interval(period);
        tracing::info!(interval_seconds = period.as_secs(), "Timed-transition scheduler started");

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                SWEEP_FAILURES.inc();
                tracing::error!(error = %e, "Scheduler sweep failed");
            }
        }
    }

    pub fn spawn(self, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(period))
    }
}
