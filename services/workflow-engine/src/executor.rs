//! Stage Action Executor
//!
//! Runs a stage's declared actions, in order, against a complaint. Every
//! action is isolated: a failing action is recorded as `Failed` and the
//! next one still runs. Notification delivery is best-effort throughout.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use redress_database::{ComplaintStore, DirectoryStore, UserFilter};
use redress_messaging::{NotificationRequest, Notifier};
use redress_models::{
    ActionOutcome, ActionRecord, AssignmentConfig, Complaint, EscalationConfig, NotificationConfig,
    NotificationKind, Stage, StageAction, StatusUpdateConfig, User,
};
use redress_utils::RedressResult;

use crate::metrics::{ACTION_EXECUTIONS, ESCALATIONS};

/// Result of running one stage's actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    pub records: Vec<ActionRecord>,
    /// An ESCALATION action ran; the instance should be marked escalated.
    pub escalated: bool,
    /// Some action changed the complaint, which the caller must persist.
    pub complaint_changed: bool,
}

#[derive(Clone)]
pub struct StageActionExecutor {
    directory: Arc<dyn DirectoryStore>,
    complaints: Arc<dyn ComplaintStore>,
    notifier: Arc<dyn Notifier>,
}

impl StageActionExecutor {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        complaints: Arc<dyn ComplaintStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            directory,
            complaints,
            notifier,
        }
    }

    /// Runs `stage.actions` against `complaint`, mutating it in place. The
    /// caller persists the complaint.
    pub async fn execute(
        &self,
        stage: &Stage,
        complaint: &mut Complaint,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StageOutcome {
        let mut outcome = StageOutcome::default();

        for action in &stage.actions {
            let kind = action.kind();
            let result = match action {
                StageAction::Notification(config) => self.notify(config, stage, complaint).await,
                StageAction::StatusUpdate(config) => Ok(self.update_status(config, complaint, now)),
                StageAction::Assignment(config) => self.assign(config, complaint, now).await,
                StageAction::Escalation(config) => {
                    let result = self.escalate(config, stage, complaint, now).await;
                    if result.is_ok() {
                        outcome.escalated = true;
                    }
                    result
                }
            };

            let record = match result {
                Ok(action_outcome) => {
                    ACTION_EXECUTIONS.with_label_values(&[kind, "ok"]).inc();
                    if !matches!(action_outcome, ActionOutcome::Notification { .. }) {
                        outcome.complaint_changed = true;
                    }
                    action_outcome
                }
                Err(e) => {
                    ACTION_EXECUTIONS.with_label_values(&[kind, "failed"]).inc();
                    tracing::warn!(
                        complaint_id = %complaint.id,
                        stage_id = %stage.id,
                        action = kind,
                        error = %e,
                        "Stage action failed, continuing with next action"
                    );
                    ActionOutcome::Failed {
                        action: kind.to_string(),
                        error: e.to_string(),
                    }
                }
            };
            outcome.records.push(ActionRecord::new(record, actor, now));
        }

        outcome
    }

    /// Active staff of the complaint's department, in directory order.
    async fn department_staff(&self, complaint: &Complaint) -> RedressResult<Vec<User>> {
        let Some(department_id) = complaint.department_id else {
            return Ok(Vec::new());
        };
        let users = self
            .directory
            .find_users(&UserFilter::active_in_department(department_id))
            .await?;
        Ok(users.into_iter().filter(|u| u.role.is_staff()).collect())
    }

    /// Sends one notification per recipient; failures are logged and counted.
    async fn dispatch(&self, recipients: &[Uuid], kind: NotificationKind, message: &str, complaint: &Complaint, stage: &Stage) -> usize {
        let mut delivered = 0;
        for &user_id in recipients {
            let request = NotificationRequest::new(user_id, kind, message)
                .about_complaint(complaint.id)
                .with_detail("complaint_title", complaint.title.clone())
                .with_detail("stage_name", stage.name.clone())
                .with_detail("priority", complaint.priority.to_string());
            match self.notifier.notify(request).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    complaint_id = %complaint.id,
                    user_id = %user_id,
                    error = %e,
                    "Notification dispatch failed"
                ),
            }
        }
        delivered
    }

    async fn notify(&self, config: &NotificationConfig, stage: &Stage, complaint: &Complaint) -> RedressResult<ActionOutcome> {
        let mut recipients: Vec<Uuid> = Vec::new();
        let mut add = |id: Uuid| {
            if !recipients.contains(&id) {
                recipients.push(id);
            }
        };

        if config.notify_complainant {
            add(complaint.complainant_id);
        }
        if config.notify_department {
            for user in self.department_staff(complaint).await? {
                add(user.id);
            }
        }
        if config.notify_assignee {
            if let Some(assignee) = complaint.assigned_to {
                add(assignee);
            }
        }

        let message = config.message.clone().unwrap_or_else(|| {
            format!("Complaint '{}' has moved to stage '{}'", complaint.title, stage.name)
        });
        let delivered = self
            .dispatch(&recipients, NotificationKind::Workflow, &message, complaint, stage)
            .await;

        Ok(ActionOutcome::Notification { recipients, delivered })
    }

    fn update_status(&self, config: &StatusUpdateConfig, complaint: &mut Complaint, now: DateTime<Utc>) -> ActionOutcome {
        let previous_status = complaint.apply_status(config.status, now);
        ActionOutcome::StatusUpdate {
            previous_status,
            new_status: config.status,
        }
    }

    async fn assign(&self, config: &AssignmentConfig, complaint: &mut Complaint, now: DateTime<Utc>) -> RedressResult<ActionOutcome> {
        let chosen = match config {
            AssignmentConfig::Specific { user_id } => self.specific_assignee(*user_id, complaint).await?,
            AssignmentConfig::Auto => self.least_loaded(complaint).await?,
        };

        let Some(user_id) = chosen else {
            tracing::info!(complaint_id = %complaint.id, "No eligible assignee, skipping assignment");
            return Ok(ActionOutcome::Assignment { assigned_to: None });
        };

        complaint.assigned_to = Some(user_id);
        complaint.updated_at = now;

        let message = format!("Complaint '{}' has been assigned to you", complaint.title);
        let request = NotificationRequest::new(user_id, NotificationKind::Assignment, message)
            .about_complaint(complaint.id)
            .with_detail("complaint_title", complaint.title.clone());
        if let Err(e) = self.notifier.notify(request).await {
            tracing::warn!(complaint_id = %complaint.id, user_id = %user_id, error = %e, "Assignment notification failed");
        }

        Ok(ActionOutcome::Assignment {
            assigned_to: Some(user_id),
        })
    }

    async fn specific_assignee(&self, user_id: Uuid, complaint: &Complaint) -> RedressResult<Option<Uuid>> {
        let Some(department_id) = complaint.department_id else {
            return Ok(None);
        };
        Ok(self
            .directory
            .get_user(user_id)
            .await?
            .filter(|u| u.is_active && u.belongs_to_department(department_id))
            .map(|u| u.id))
    }

    /// Fewest open complaints wins; ties go to the first user encountered.
    async fn least_loaded(&self, complaint: &Complaint) -> RedressResult<Option<Uuid>> {
        let mut best: Option<(Uuid, u64)> = None;
        for user in self.department_staff(complaint).await? {
            let load = self.complaints.count_open_assigned(user.id).await?;
            if best.map_or(true, |(_, lowest)| load < lowest) {
                best = Some((user.id, load));
            }
        }
        Ok(best.map(|(id, _)| id))
    }

    async fn escalate(
        &self,
        config: &EscalationConfig,
        stage: &Stage,
        complaint: &mut Complaint,
        now: DateTime<Utc>,
    ) -> RedressResult<ActionOutcome> {
        let reason = config
            .reason
            .clone()
            .unwrap_or_else(|| format!("Escalated on entering stage '{}'", stage.name));
        let (previous_priority, new_priority) = complaint.escalate(reason.clone(), config.increase_priority, now);
        ESCALATIONS.with_label_values(&["action"]).inc();

        if config.notify_department {
            match self.department_staff(complaint).await {
                Ok(staff) => {
                    let ids: Vec<Uuid> = staff.iter().map(|u| u.id).collect();
                    self.dispatch(&ids, NotificationKind::Escalation, &reason, complaint, stage)
                        .await;
                }
                Err(e) => tracing::warn!(complaint_id = %complaint.id, error = %e, "Could not resolve department for escalation notice"),
            }
        }

        Ok(ActionOutcome::Escalation {
            previous_priority,
            new_priority,
        })
    }
}

/// Raises priority one step, stamps an SLA-breach reason and notifies the
/// department. Used by the scheduler when a stage has no timed transition.
pub async fn escalate_for_sla(
    executor: &StageActionExecutor,
    stage: &Stage,
    complaint: &mut Complaint,
    now: DateTime<Utc>,
) -> ActionRecord {
    let config = EscalationConfig {
        increase_priority: true,
        reason: Some(format!(
            "SLA breached: stage '{}' exceeded its {} hour budget",
            stage.name, stage.duration_in_hours
        )),
        notify_department: true,
    };
    let outcome = match executor.escalate(&config, stage, complaint, now).await {
        Ok(outcome) => outcome,
        Err(e) => ActionOutcome::Failed {
            action: "escalation".to_string(),
            error: e.to_string(),
        },
    };
    ActionRecord::new(outcome, None, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use redress_database::MemoryStore;
    use redress_models::{ComplaintStatus, Priority, UserRole};
    use redress_utils::RedressError;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<NotificationRequest>>,
        fail_for: Option<Uuid>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, request: NotificationRequest) -> RedressResult<()> {
            if Some(request.user_id) == self.fail_for {
                return Err(RedressError::external_dispatch("email", "mailbox unavailable"));
            }
            self.sent.lock().await.push(request);
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        executor: StageActionExecutor,
        department_id: Uuid,
        organization_id: Uuid,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let executor = StageActionExecutor::new(store.clone(), store.clone(), notifier.clone());
        Fixture {
            store,
            notifier,
            executor,
            department_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    impl Fixture {
        async fn staff(&self, name: &str) -> User {
            let user = User::new(self.organization_id, name.to_string(), format!("{}@example.com", name), UserRole::Department)
                .with_department(self.department_id);
            self.store.insert_user(&user).await.unwrap();
            user
        }

        fn complaint(&self) -> Complaint {
            let mut c = Complaint::new(self.organization_id, Uuid::new_v4(), Uuid::new_v4(), "Leak".to_string(), "Pipe".to_string());
            c.department_id = Some(self.department_id);
            c
        }

        async fn give_open_complaints(&self, user: &User, count: usize) {
            for _ in 0..count {
                let mut c = self.complaint();
                c.assigned_to = Some(user.id);
                self.store.insert_complaint(&c).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_auto_assignment_picks_least_loaded() {
        let fx = fixture();
        let busy = fx.staff("busy").await;
        let light = fx.staff("light").await;
        fx.give_open_complaints(&busy, 3).await;
        fx.give_open_complaints(&light, 1).await;

        let stage = Stage::new("triage", "Triage", 1).with_action(StageAction::Assignment(AssignmentConfig::Auto));
        let mut complaint = fx.complaint();
        let outcome = fx.executor.execute(&stage, &mut complaint, None, Utc::now()).await;

        assert_eq!(complaint.assigned_to, Some(light.id));
        assert_eq!(
            outcome.records[0].outcome,
            ActionOutcome::Assignment { assigned_to: Some(light.id) }
        );
        assert!(outcome.complaint_changed);
    }

    #[tokio::test]
    async fn test_auto_assignment_tie_goes_to_first_user() {
        let fx = fixture();
        let first = fx.staff("first").await;
        fx.staff("second").await;

        let stage = Stage::new("triage", "Triage", 1).with_action(StageAction::Assignment(AssignmentConfig::Auto));
        let mut complaint = fx.complaint();
        fx.executor.execute(&stage, &mut complaint, None, Utc::now()).await;

        assert_eq!(complaint.assigned_to, Some(first.id));
    }

    #[tokio::test]
    async fn test_assignment_without_eligible_user_is_noop() {
        let fx = fixture();
        let mut outsider = User::new(fx.organization_id, "out".to_string(), "out@example.com".to_string(), UserRole::Department);
        outsider.department_id = Some(Uuid::new_v4());
        fx.store.insert_user(&outsider).await.unwrap();

        let stage = Stage::new("triage", "Triage", 1)
            .with_action(StageAction::Assignment(AssignmentConfig::Specific { user_id: outsider.id }))
            .with_action(StageAction::Assignment(AssignmentConfig::Auto));
        let mut complaint = fx.complaint();
        let outcome = fx.executor.execute(&stage, &mut complaint, None, Utc::now()).await;

        assert_eq!(complaint.assigned_to, None);
        assert!(outcome
            .records
            .iter()
            .all(|r| r.outcome == ActionOutcome::Assignment { assigned_to: None }));
    }

    #[tokio::test]
    async fn test_escalation_ladder() {
        let fx = fixture();
        let stage = Stage::new("late", "Late", 1).with_action(StageAction::Escalation(EscalationConfig::default()));

        let mut high = fx.complaint();
        high.priority = Priority::High;
        let outcome = fx.executor.execute(&stage, &mut high, None, Utc::now()).await;
        assert_eq!(high.priority, Priority::Urgent);
        assert!(high.is_escalated());
        assert!(outcome.escalated);

        let mut urgent = fx.complaint();
        urgent.priority = Priority::Urgent;
        fx.executor.execute(&stage, &mut urgent, None, Utc::now()).await;
        assert_eq!(urgent.priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn test_notification_recipients_and_partial_failure() {
        let fx = fixture();
        let staff = fx.staff("staff").await;
        let flaky = fx.staff("flaky").await;
        let fx = Fixture {
            executor: StageActionExecutor::new(
                fx.store.clone(),
                fx.store.clone(),
                Arc::new(RecordingNotifier {
                    fail_for: Some(flaky.id),
                    ..RecordingNotifier::default()
                }),
            ),
            ..fx
        };

        let stage = Stage::new("review", "Review", 2)
            .with_action(StageAction::Notification(NotificationConfig {
                notify_complainant: true,
                notify_department: true,
                notify_assignee: true,
                message: None,
            }))
            .with_action(StageAction::StatusUpdate(StatusUpdateConfig {
                status: ComplaintStatus::UnderReview,
            }));
        let mut complaint = fx.complaint();
        complaint.assigned_to = Some(staff.id);

        let outcome = fx.executor.execute(&stage, &mut complaint, None, Utc::now()).await;

        match &outcome.records[0].outcome {
            ActionOutcome::Notification { recipients, delivered } => {
                assert_eq!(recipients, &vec![complaint.complainant_id, staff.id, flaky.id]);
                assert_eq!(*delivered, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // The failed delivery did not stop the status update.
        assert_eq!(complaint.status, ComplaintStatus::UnderReview);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn test_status_update_stamps_terminal_timestamps() {
        let fx = fixture();
        let stage = Stage::new("resolved", "Resolved", 3).with_action(StageAction::StatusUpdate(StatusUpdateConfig {
            status: ComplaintStatus::Resolved,
        }));
        let mut complaint = fx.complaint();
        let outcome = fx.executor.execute(&stage, &mut complaint, None, Utc::now()).await;

        assert!(complaint.resolved_at.is_some());
        assert_eq!(
            outcome.records[0].outcome,
            ActionOutcome::StatusUpdate {
                previous_status: ComplaintStatus::Pending,
                new_status: ComplaintStatus::Resolved,
            }
        );
        assert!(fx.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sla_escalation_record() {
        let fx = fixture();
        fx.staff("staff").await;
        let stage = Stage::new("review", "Review", 2).with_duration(4);
        let mut complaint = fx.complaint();

        let record = escalate_for_sla(&fx.executor, &stage, &mut complaint, Utc::now()).await;
        assert!(matches!(record.outcome, ActionOutcome::Escalation { .. }));
        assert_eq!(complaint.priority, Priority::High);
        assert!(complaint.escalation_reason.unwrap().contains("SLA breached"));
        assert_eq!(fx.notifier.sent.lock().await.len(), 1);
    }
}
