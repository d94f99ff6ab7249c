//! Workflow State Machine
//!
//! Pure planning functions for instance transitions. Each planner takes the
//! current instance and returns the next one; nothing here touches a store
//! or dispatches anything. The engine commits the plan and then runs the
//! entered stage's actions.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use redress_models::{
    ActionOutcome, ActionRecord, Complaint, InstanceStatus, Stage, WorkflowDefinition, WorkflowInstance,
};
use redress_utils::{RedressError, RedressResult};

/// What caused a stage transition. Used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Explicit `advance` by a user.
    Manual,
    /// Scheduler following a TIME_BASED transition.
    Timed,
    /// Manual complaint status update mapped onto a stage.
    Status,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Timed => "timed",
            Self::Status => "status",
        }
    }
}

/// Expected-completion recomputations smaller than this are not written.
const MATERIAL_CHANGE_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct PlannedStart {
    pub instance: WorkflowInstance,
    pub entry_stage: Stage,
    /// Single-stage definitions finish on entry.
    pub completes: bool,
}

#[derive(Debug, Clone)]
pub struct PlannedAdvance {
    pub instance: WorkflowInstance,
    pub from_stage_id: String,
    pub target: Stage,
    pub completes: bool,
}

/// `at` plus `h` hours, or a validation error when the date leaves chrono's range.
fn after_hours(at: DateTime<Utc>, h: i64) -> RedressResult<DateTime<Utc>> {
    Duration::try_hours(h)
        .and_then(|d| at.checked_add_signed(d))
        .ok_or_else(|| RedressError::validation("duration_in_hours", format!("{}h from {} is out of range", h, at)))
}

/// Entry stage is the minimum-order stage; the expected completion date
/// budgets every stage's duration.
pub fn plan_start(definition: &WorkflowDefinition, complaint: &Complaint, now: DateTime<Utc>) -> RedressResult<PlannedStart> {
    let entry = definition
        .entry_stage()
        .ok_or_else(|| RedressError::validation("stages", format!("Workflow {} has no stages", definition.id)))?;

    let expected = after_hours(now, definition.total_duration_hours())?;
    let mut instance = WorkflowInstance::new(definition.id, complaint.id, complaint.organization_id, &entry.id, expected, now);

    let completes = definition.is_final_stage(entry);
    if completes {
        instance.is_completed = true;
        instance.completed_at = Some(now);
        instance.status = InstanceStatus::Completed;
    }

    Ok(PlannedStart {
        instance,
        entry_stage: entry.clone(),
        completes,
    })
}

/// Resolves both stages and checks the move is legal.
pub fn check_transition<'a>(
    definition: &'a WorkflowDefinition,
    instance: &WorkflowInstance,
    target_stage_id: &str,
) -> RedressResult<(&'a Stage, &'a Stage)> {
    if !instance.accepts_transitions() {
        return Err(RedressError::instance_finished(instance.id));
    }

    let current = definition.stage(&instance.current_stage_id).ok_or_else(|| {
        RedressError::invalid_reference(
            "current_stage_id",
            format!("Stage '{}' is not part of workflow {}", instance.current_stage_id, definition.id),
        )
    })?;

    let target = definition.stage(target_stage_id).ok_or_else(|| {
        RedressError::invalid_reference(
            "target_stage_id",
            format!("Stage '{}' is not part of workflow {}", target_stage_id, definition.id),
        )
    })?;

    if !current.allows_transition_to(&target.id) {
        return Err(RedressError::invalid_transition(
            &current.id,
            &target.id,
            format!("Stage '{}' has no transition to '{}'", current.name, target.name),
        ));
    }

    Ok((current, target))
}

/// New expected completion date when it differs materially from the stored one.
pub fn recompute_expected_completion(
    definition: &WorkflowDefinition,
    instance: &WorkflowInstance,
    now: DateTime<Utc>,
) -> RedressResult<Option<DateTime<Utc>>> {
    let Some(current) = definition.stage(&instance.current_stage_id) else {
        return Ok(None);
    };
    let expected = after_hours(now, definition.remaining_duration_hours(current.order))?;
    let drift = (expected - instance.expected_completion_date).num_seconds().abs();
    Ok((drift >= MATERIAL_CHANGE_SECONDS).then_some(expected))
}

/// Closes the open history entry (recording `comment` on it), opens one at
/// the target and applies the completion predicate.
pub fn plan_advance(
    definition: &WorkflowDefinition,
    instance: &WorkflowInstance,
    target_stage_id: &str,
    actor: Option<Uuid>,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> RedressResult<PlannedAdvance> {
    let (current, target) = check_transition(definition, instance, target_stage_id)?;

    let mut next = instance.clone();
    if let Some(text) = comment.map(str::trim).filter(|t| !t.is_empty()) {
        let record = ActionRecord::new(ActionOutcome::Comment { text: text.to_string() }, actor, now);
        next.record_actions(vec![record]);
    }
    next.move_to(&target.id, now);

    let completes = definition.is_final_stage(target);
    if completes {
        next.is_completed = true;
        next.completed_at = Some(now);
        next.status = InstanceStatus::Completed;
    }

    if let Some(expected) = recompute_expected_completion(definition, &next, now)? {
        next.expected_completion_date = expected;
    }

    Ok(PlannedAdvance {
        instance: next,
        from_stage_id: current.id.clone(),
        target: target.clone(),
        completes,
    })
}

/// `None` when the instance is already escalated.
pub fn plan_escalation(instance: &WorkflowInstance, now: DateTime<Utc>) -> RedressResult<Option<WorkflowInstance>> {
    if instance.status.is_terminal() || instance.is_completed {
        return Err(RedressError::instance_finished(instance.id));
    }
    if instance.status == InstanceStatus::Escalated {
        return Ok(None);
    }

    let mut next = instance.clone();
    next.status = InstanceStatus::Escalated;
    next.updated_at = now;
    Ok(Some(next))
}

/// Cancels the instance and closes its open history entry.
pub fn plan_cancel(
    instance: &WorkflowInstance,
    actor: Option<Uuid>,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> RedressResult<WorkflowInstance> {
    if !instance.status.can_transition_to(InstanceStatus::Canceled) || instance.is_completed {
        return Err(RedressError::instance_finished(instance.id));
    }

    let mut next = instance.clone();
    if let Some(text) = reason.map(str::trim).filter(|t| !t.is_empty()) {
        let record = ActionRecord::new(ActionOutcome::Comment { text: text.to_string() }, actor, now);
        next.record_actions(vec![record]);
    }
    if let Some(entry) = next.open_entry_mut() {
        entry.exited_at = Some(now);
    }
    next.status = InstanceStatus::Canceled;
    next.updated_at = now;
    Ok(next)
}

/// Applies the executor's results to a freshly read instance. Escalation
/// never overrides a terminal status.
pub fn apply_stage_outcome(
    instance: &WorkflowInstance,
    stage_id: &str,
    records: &[ActionRecord],
    escalate: bool,
    now: DateTime<Utc>,
) -> Option<WorkflowInstance> {
    let mut next = instance.clone();
    let mut changed = false;

    if !records.is_empty() {
        match next.open_entry_mut() {
            Some(entry) if entry.stage_id == stage_id => {
                entry.actions.extend(records.iter().cloned());
                changed = true;
            }
            // The instance moved on; attach to the most recent visit of the stage.
            _ => {
                if let Some(entry) = next.history.iter_mut().rev().find(|e| e.stage_id == stage_id) {
                    entry.actions.extend(records.iter().cloned());
                    changed = true;
                }
            }
        }
    }

    if escalate && next.status == InstanceStatus::Active {
        next.status = InstanceStatus::Escalated;
        changed = true;
    }

    if changed {
        next.updated_at = now;
        Some(next)
    } else {
        None
    }
}

/// Deadline for the open history entry at `stage`.
pub fn stage_deadline(instance: &WorkflowInstance, stage: &Stage) -> RedressResult<Option<DateTime<Utc>>> {
    instance
        .open_entry()
        .map(|entry| after_hours(entry.entered_at, i64::from(stage.duration_in_hours)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redress_models::{Priority, Transition};

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            Uuid::new_v4(),
            "Support".to_string(),
            vec![
                Stage::new("intake", "Intake", 1)
                    .with_duration(2)
                    .with_transition(Transition::always("review")),
                Stage::new("review", "Review", 2)
                    .with_duration(4)
                    .with_transition(Transition::always("done")),
                Stage::new("done", "Done", 3).with_duration(1),
            ],
        )
    }

    fn complaint(org: Uuid) -> Complaint {
        Complaint::new(org, Uuid::new_v4(), Uuid::new_v4(), "Broken heater".to_string(), "Room 4".to_string())
    }

    fn started(def: &WorkflowDefinition, now: DateTime<Utc>) -> WorkflowInstance {
        plan_start(def, &complaint(def.organization_id), now).unwrap().instance
    }

    #[test]
    fn test_start_uses_min_order_and_total_duration() {
        let def = definition();
        let now = Utc::now();
        let plan = plan_start(&def, &complaint(def.organization_id), now).unwrap();

        assert_eq!(plan.entry_stage.id, "intake");
        assert_eq!(plan.instance.current_stage_id, "intake");
        assert_eq!(plan.instance.expected_completion_date, now + Duration::hours(7));
        assert_eq!(plan.instance.open_entry_count(), 1);
        assert_eq!(plan.instance.status, InstanceStatus::Active);
    }

    #[test]
    fn test_advance_moves_history_and_records_comment() {
        let def = definition();
        let t0 = Utc::now();
        let instance = started(&def, t0);
        let actor = Uuid::new_v4();
        let t1 = t0 + Duration::hours(1);

        let plan = plan_advance(&def, &instance, "review", Some(actor), Some("looks valid"), t1).unwrap();
        let next = plan.instance;

        assert_eq!(plan.from_stage_id, "intake");
        assert!(!plan.completes);
        assert_eq!(next.current_stage_id, "review");
        assert_eq!(next.history.len(), 2);
        assert_eq!(next.history[0].exited_at, Some(t1));
        assert_eq!(
            next.history[0].actions[0].outcome,
            ActionOutcome::Comment { text: "looks valid".to_string() }
        );
        assert_eq!(next.open_entry().map(|e| e.stage_id.as_str()), Some("review"));
        assert_eq!(next.open_entry_count(), 1);
        // review (4h) + done (1h) from t1
        assert_eq!(next.expected_completion_date, t1 + Duration::hours(5));
    }

    #[test]
    fn test_illegal_advance_is_rejected() {
        let def = definition();
        let instance = started(&def, Utc::now());

        let err = plan_advance(&def, &instance, "done", None, None, Utc::now()).unwrap_err();
        assert!(matches!(err, RedressError::InvalidTransition { .. }));
        assert!(err.is_state_machine_error());
    }

    #[test]
    fn test_unknown_target_is_invalid_reference() {
        let def = definition();
        let instance = started(&def, Utc::now());

        let err = plan_advance(&def, &instance, "nowhere", None, None, Utc::now()).unwrap_err();
        assert!(matches!(err, RedressError::InvalidReference { .. }));
    }

    #[test]
    fn test_open_ended_stage_allows_any_target() {
        let mut def = definition();
        def.stages[0].transitions.clear();
        let instance = started(&def, Utc::now());

        let plan = plan_advance(&def, &instance, "done", None, None, Utc::now()).unwrap();
        assert!(plan.completes);
    }

    #[test]
    fn test_completion_and_finished_instance() {
        let def = definition();
        let now = Utc::now();
        let instance = started(&def, now);
        let review = plan_advance(&def, &instance, "review", None, None, now).unwrap().instance;
        let done = plan_advance(&def, &review, "done", None, None, now).unwrap();

        assert!(done.completes);
        assert!(done.instance.is_completed);
        assert_eq!(done.instance.status, InstanceStatus::Completed);
        assert_eq!(done.instance.completed_at, Some(now));

        let err = plan_advance(&def, &done.instance, "review", None, None, now).unwrap_err();
        assert!(matches!(err, RedressError::InstanceFinished { .. }));
    }

    #[test]
    fn test_max_order_stage_with_transitions_does_not_complete() {
        let mut def = definition();
        def.stages[2].transitions.push(Transition::always("review"));
        let now = Utc::now();
        let review = plan_advance(&def, &started(&def, now), "review", None, None, now).unwrap().instance;

        let plan = plan_advance(&def, &review, "done", None, None, now).unwrap();
        assert!(!plan.completes);
        assert!(!plan.instance.is_completed);
    }

    #[test]
    fn test_escalated_instance_keeps_status_until_completion() {
        let def = definition();
        let now = Utc::now();
        let escalated = plan_escalation(&started(&def, now), now).unwrap().unwrap();
        assert!(plan_escalation(&escalated, now).unwrap().is_none());

        let review = plan_advance(&def, &escalated, "review", None, None, now).unwrap().instance;
        assert_eq!(review.status, InstanceStatus::Escalated);

        let done = plan_advance(&def, &review, "done", None, None, now).unwrap().instance;
        assert_eq!(done.status, InstanceStatus::Completed);
    }

    #[test]
    fn test_cancel_closes_open_entry() {
        let def = definition();
        let now = Utc::now();
        let canceled = plan_cancel(&started(&def, now), None, Some("duplicate"), now).unwrap();

        assert_eq!(canceled.status, InstanceStatus::Canceled);
        assert_eq!(canceled.open_entry_count(), 0);
        assert!(!canceled.accepts_transitions());
        assert!(plan_cancel(&canceled, None, None, now).is_err());
        assert!(plan_escalation(&canceled, now).is_err());
    }

    #[test]
    fn test_recompute_skips_small_drift() {
        let def = definition();
        let now = Utc::now();
        let instance = started(&def, now);

        assert!(recompute_expected_completion(&def, &instance, now + Duration::seconds(30)).unwrap().is_none());
        assert_eq!(
            recompute_expected_completion(&def, &instance, now + Duration::hours(2)).unwrap(),
            Some(now + Duration::hours(9))
        );
    }

    #[test]
    fn test_apply_outcome_respects_terminal_status() {
        let def = definition();
        let now = Utc::now();
        let mut instance = started(&def, now);
        instance.status = InstanceStatus::Completed;
        instance.is_completed = true;

        let record = ActionRecord::new(
            ActionOutcome::Escalation {
                previous_priority: Priority::High,
                new_priority: Priority::Urgent,
            },
            None,
            now,
        );
        let next = apply_stage_outcome(&instance, "intake", &[record], true, now).unwrap();
        assert_eq!(next.status, InstanceStatus::Completed);
        assert_eq!(next.history[0].actions.len(), 1);

        assert!(apply_stage_outcome(&instance, "intake", &[], false, now).is_none());
    }

    #[test]
    fn test_stage_deadline() {
        let def = definition();
        let t0 = Utc::now();
        let instance = started(&def, t0);
        assert_eq!(stage_deadline(&instance, &def.stages[0]).unwrap(), Some(t0 + Duration::hours(2)));
    }

    #[test]
    fn test_out_of_range_durations_are_errors() {
        let mut def = definition();
        let t0 = Utc::now();
        let instance = started(&def, t0);

        def.stages[0].duration_in_hours = u32::MAX;
        let err = plan_start(&def, &complaint(def.organization_id), DateTime::<Utc>::MAX_UTC - Duration::hours(1)).unwrap_err();
        assert!(matches!(err, RedressError::Validation { .. }));

        let mut old = instance.clone();
        old.history[0].entered_at = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        assert!(stage_deadline(&old, &def.stages[0]).is_err());
        assert!(recompute_expected_completion(&def, &instance, DateTime::<Utc>::MAX_UTC - Duration::hours(1)).is_err());
    }
}
