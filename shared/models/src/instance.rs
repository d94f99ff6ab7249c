//! Workflow instance models.
//!
//! One instance tracks one complaint's run through a workflow definition.
//! History is append-only; at most one entry is open (`exited_at == None`)
//! and that entry always matches `current_stage_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ComplaintStatus, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Active,
    Escalated,
    Completed,
    Canceled,
}

impl InstanceStatus {
    pub fn can_transition_to(&self, target: InstanceStatus) -> bool {
        use InstanceStatus::*;

        match (self, target) {
            (Active, Escalated) => true,
            (Active, Completed) => true,
            (Active, Canceled) => true,

            (Escalated, Escalated) => true,
            (Escalated, Completed) => true,
            (Escalated, Canceled) => true,

            (Completed, _) => false,
            (Canceled, _) => false,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Canceled)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Escalated => write!(f, "ESCALATED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub complaint_id: Uuid,
    pub organization_id: Uuid,
    pub current_stage_id: String,
    pub history: Vec<HistoryEntry>,
    pub status: InstanceStatus,
    pub is_completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expected_completion_date: DateTime<Utc>,
    /// Bumped on every persisted mutation; stores compare-and-swap on it.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub stage_id: String,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
    pub actions: Vec<ActionRecord>,
}

impl HistoryEntry {
    pub fn open(stage_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            stage_id: stage_id.into(),
            entered_at: at,
            exited_at: None,
            actions: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.exited_at.is_none()
    }
}

/// Audit record of one executed stage action (or a comment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub performed_at: DateTime<Utc>,
    pub performed_by: Option<Uuid>,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

impl ActionRecord {
    pub fn new(outcome: ActionOutcome, performed_by: Option<Uuid>, at: DateTime<Utc>) -> Self {
        Self {
            performed_at: at,
            performed_by,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    Notification {
        recipients: Vec<Uuid>,
        delivered: usize,
    },
    StatusUpdate {
        previous_status: ComplaintStatus,
        new_status: ComplaintStatus,
    },
    Assignment {
        assigned_to: Option<Uuid>,
    },
    Escalation {
        previous_priority: Priority,
        new_priority: Priority,
    },
    Comment {
        text: String,
    },
    Failed {
        action: String,
        error: String,
    },
}

impl WorkflowInstance {
    pub fn new(
        workflow_id: Uuid,
        complaint_id: Uuid,
        organization_id: Uuid,
        entry_stage_id: &str,
        expected_completion_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            complaint_id,
            organization_id,
            current_stage_id: entry_stage_id.to_string(),
            history: vec![HistoryEntry::open(entry_stage_id, now)],
            status: InstanceStatus::Active,
            is_completed: false,
            started_at: now,
            completed_at: None,
            expected_completion_date,
            version: 0,
            updated_at: now,
        }
    }

    pub fn open_entry(&self) -> Option<&HistoryEntry> {
        self.history.iter().rev().find(|e| e.is_open())
    }

    pub fn open_entry_mut(&mut self) -> Option<&mut HistoryEntry> {
        self.history.iter_mut().rev().find(|e| e.is_open())
    }

    /// Closes the open entry and opens a new one at `stage_id`.
    pub fn move_to(&mut self, stage_id: &str, at: DateTime<Utc>) {
        for entry in self.history.iter_mut().filter(|e| e.is_open()) {
            entry.exited_at = Some(at);
        }
        self.history.push(HistoryEntry::open(stage_id, at));
        self.current_stage_id = stage_id.to_string();
        self.updated_at = at;
    }

    /// Appends records to the open entry. Returns false when no entry is open.
    pub fn record_actions(&mut self, records: Vec<ActionRecord>) -> bool {
        match self.open_entry_mut() {
            Some(entry) => {
                entry.actions.extend(records);
                true
            }
            None => false,
        }
    }

    pub fn accepts_transitions(&self) -> bool {
        !self.is_completed && !self.status.is_terminal()
    }

    pub fn open_entry_count(&self) -> usize {
        self.history.iter().filter(|e| e.is_open()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> WorkflowInstance {
        let now = Utc::now();
        WorkflowInstance::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "a", now, now)
    }

    #[test]
    fn test_status_transitions() {
        assert!(InstanceStatus::Active.can_transition_to(InstanceStatus::Escalated));
        assert!(InstanceStatus::Escalated.can_transition_to(InstanceStatus::Completed));
        assert!(!InstanceStatus::Completed.can_transition_to(InstanceStatus::Active));
        assert!(!InstanceStatus::Canceled.can_transition_to(InstanceStatus::Escalated));
    }

    #[test]
    fn test_move_to_keeps_single_open_entry() {
        let mut inst = instance();
        inst.move_to("b", Utc::now());
        inst.move_to("c", Utc::now());

        assert_eq!(inst.history.len(), 3);
        assert_eq!(inst.open_entry_count(), 1);
        assert_eq!(inst.open_entry().unwrap().stage_id, "c");
        assert_eq!(inst.current_stage_id, "c");
    }

    #[test]
    fn test_action_record_wire_format() {
        let record = ActionRecord::new(
            ActionOutcome::Comment { text: "looks fine".to_string() },
            None,
            Utc::now(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "COMMENT");
        assert_eq!(value["text"], "looks fine");

        let back: ActionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
