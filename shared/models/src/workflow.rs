//! Workflow definition models.
//!
//! A workflow definition is an ordered graph of stages. Each stage declares
//! the actions that fire when a complaint enters it and the transitions that
//! may leave it. Stage ids are caller-assigned strings that stay stable for
//! the definition's lifetime; stage orders drive default sequencing and the
//! completion predicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::{ComplaintStatus, UserRole};

pub const DEFAULT_STAGE_DURATION_HOURS: u32 = 24;

/// Ten years. Longer budgets would push deadlines past the representable date range.
pub const MAX_STAGE_DURATION_HOURS: u32 = 87_600;

fn default_stage_duration() -> u32 {
    DEFAULT_STAGE_DURATION_HOURS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Workflow name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub complaint_type_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
    pub stages: Vec<Stage>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub order: i32,
    #[serde(default = "default_stage_duration")]
    pub duration_in_hours: u32,
    #[serde(default)]
    pub actions: Vec<StageAction>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// Side effect performed when a complaint enters a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "config", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageAction {
    Notification(NotificationConfig),
    StatusUpdate(StatusUpdateConfig),
    Assignment(AssignmentConfig),
    Escalation(EscalationConfig),
}

impl StageAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notification(_) => "notification",
            Self::StatusUpdate(_) => "status_update",
            Self::Assignment(_) => "assignment",
            Self::Escalation(_) => "escalation",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub notify_complainant: bool,
    pub notify_department: bool,
    pub notify_assignee: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdateConfig {
    pub status: ComplaintStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentConfig {
    /// Assign a named user, provided they are active and in the complaint's department.
    Specific { user_id: Uuid },
    /// Assign the active department user with the fewest open complaints.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationConfig {
    #[serde(default = "default_true")]
    pub increase_priority: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_true")]
    pub notify_department: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            increase_priority: true,
            reason: None,
            notify_department: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub target_stage_id: String,
    #[serde(default)]
    pub condition: TransitionCondition,
}

impl Transition {
    pub fn always(target: impl Into<String>) -> Self {
        Self {
            target_stage_id: target.into(),
            condition: TransitionCondition::Always,
        }
    }

    pub fn timed(target: impl Into<String>) -> Self {
        Self {
            target_stage_id: target.into(),
            condition: TransitionCondition::TimeBased,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionCondition {
    #[default]
    Always,
    /// Taken by the scheduler once the stage's duration has elapsed.
    TimeBased,
    UserRole(UserRole),
    Custom(serde_json::Value),
}

/// Structural defects in a stage graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageGraphError {
    #[error("workflow must declare at least one stage")]
    NoStages,

    #[error("stage id must not be blank")]
    BlankStageId,

    #[error("duplicate stage id '{0}'")]
    DuplicateStageId(String),

    #[error("duplicate stage order {0}")]
    DuplicateStageOrder(i32),

    #[error("stage '{stage_id}' transitions to unknown stage '{target}'")]
    UnknownTransitionTarget { stage_id: String, target: String },

    #[error("stage '{stage_id}' duration of {hours}h exceeds the {max}h limit", max = MAX_STAGE_DURATION_HOURS)]
    DurationOutOfRange { stage_id: String, hours: u32 },
}

/// Checks id uniqueness, order uniqueness, duration bounds and that every
/// transition targets a stage of the same array.
pub fn validate_stages(stages: &[Stage]) -> Result<(), StageGraphError> {
    if stages.is_empty() {
        return Err(StageGraphError::NoStages);
    }

    let mut ids = HashSet::new();
    let mut orders = HashSet::new();
    for stage in stages {
        if stage.id.trim().is_empty() {
            return Err(StageGraphError::BlankStageId);
        }
        if !ids.insert(stage.id.as_str()) {
            return Err(StageGraphError::DuplicateStageId(stage.id.clone()));
        }
        if !orders.insert(stage.order) {
            return Err(StageGraphError::DuplicateStageOrder(stage.order));
        }
        if stage.duration_in_hours > MAX_STAGE_DURATION_HOURS {
            return Err(StageGraphError::DurationOutOfRange {
                stage_id: stage.id.clone(),
                hours: stage.duration_in_hours,
            });
        }
    }

    for stage in stages {
        if let Some(t) = stage
            .transitions
            .iter()
            .find(|t| !ids.contains(t.target_stage_id.as_str()))
        {
            return Err(StageGraphError::UnknownTransitionTarget {
                stage_id: stage.id.clone(),
                target: t.target_stage_id.clone(),
            });
        }
    }

    Ok(())
}

impl Stage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, order: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order,
            duration_in_hours: DEFAULT_STAGE_DURATION_HOURS,
            actions: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_duration(mut self, hours: u32) -> Self {
        self.duration_in_hours = hours;
        self
    }

    pub fn with_action(mut self, action: StageAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// A stage without transitions is open-ended: any target is legal.
    pub fn allows_transition_to(&self, target_stage_id: &str) -> bool {
        self.transitions.is_empty()
            || self
                .transitions
                .iter()
                .any(|t| t.target_stage_id == target_stage_id)
    }

    /// First time-based transition in declaration order.
    pub fn first_timed_transition(&self) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.condition == TransitionCondition::TimeBased)
    }

    pub fn sets_status(&self, status: ComplaintStatus) -> bool {
        self.actions.iter().any(|a| {
            matches!(a, StageAction::StatusUpdate(cfg) if cfg.status == status)
        })
    }
}

impl WorkflowDefinition {
    pub fn new(organization_id: Uuid, name: String, stages: Vec<Stage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name,
            description: None,
            complaint_type_id: None,
            department_id: None,
            is_active: true,
            stages,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate_graph(&self) -> Result<(), StageGraphError> {
        validate_stages(&self.stages)
    }

    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// The stage with the minimum order.
    pub fn entry_stage(&self) -> Option<&Stage> {
        self.stages.iter().min_by_key(|s| s.order)
    }

    pub fn max_order(&self) -> Option<i32> {
        self.stages.iter().map(|s| s.order).max()
    }

    /// Canonical completion predicate: the stage holds the maximum order and
    /// has no outgoing transitions.
    pub fn is_final_stage(&self, stage: &Stage) -> bool {
        stage.transitions.is_empty() && self.max_order() == Some(stage.order)
    }

    pub fn total_duration_hours(&self) -> i64 {
        self.stages.iter().map(|s| i64::from(s.duration_in_hours)).sum()
    }

    /// Sum of durations of every stage at or after `from_order`.
    pub fn remaining_duration_hours(&self, from_order: i32) -> i64 {
        self.stages
            .iter()
            .filter(|s| s.order >= from_order)
            .map(|s| i64::from(s.duration_in_hours))
            .sum()
    }

    /// Lowest-order stage whose actions set the complaint to `status`.
    pub fn stage_for_status(&self, status: ComplaintStatus) -> Option<&Stage> {
        self.stages
            .iter()
            .filter(|s| s.sets_status(status))
            .min_by_key(|s| s.order)
    }

    /// Stages reachable from `stage_id`; every other stage for open-ended stages.
    pub fn reachable_from(&self, stage_id: &str) -> Vec<&Stage> {
        let Some(current) = self.stage(stage_id) else {
            return Vec::new();
        };
        let mut reachable: Vec<&Stage> = self
            .stages
            .iter()
            .filter(|s| s.id != current.id && current.allows_transition_to(&s.id))
            .collect();
        reachable.sort_by_key(|s| s.order);
        reachable
    }
}
