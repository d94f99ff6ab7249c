//! Complaint domain models.
//!
//! The complaint is owned by the lifecycle coordinator, but its `status`,
//! `priority`, `current_stage`, assignment and escalation fields are written
//! by workflow stage actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplaintStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Under Review")]
    UnderReview,
    Resolved,
    Closed,
    Rejected,
}

impl ComplaintStatus {
    /// Statuses that count toward a handler's open workload.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::UnderReview)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-'], " ").as_str() {
            "pending" => Some(Self::Pending),
            "in progress" => Some(Self::InProgress),
            "under review" => Some(Self::UnderReview),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "In Progress"),
            Self::UnderReview => write!(f, "Under Review"),
            Self::Resolved => write!(f, "Resolved"),
            Self::Closed => write!(f, "Closed"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Complaint priority. Declaration order is the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// One step up the ladder; `Urgent` stays `Urgent`.
    pub fn escalated(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Urgent => Self::Urgent,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Urgent => write!(f, "Urgent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Complaint {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub complaint_type_id: Uuid,
    pub department_id: Option<Uuid>,
    pub complainant_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "Description must be between 1 and 5000 characters"))]
    pub description: String,
    pub status: ComplaintStatus,
    pub priority: Priority,
    /// Display name of the workflow stage the complaint sits in.
    pub current_stage: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalation_reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every successful store update.
    #[serde(default)]
    pub version: u64,
}

impl Complaint {
    pub fn new(
        organization_id: Uuid,
        complaint_type_id: Uuid,
        complainant_id: Uuid,
        title: String,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            complaint_type_id,
            department_id: None,
            complainant_id,
            title,
            description,
            status: ComplaintStatus::Pending,
            priority: Priority::default(),
            current_stage: None,
            assigned_to: None,
            escalated_at: None,
            escalation_reason: None,
            resolved_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Sets the status, stamping `resolved_at`/`closed_at` for terminal
    /// statuses. Returns the previous status.
    pub fn apply_status(&mut self, status: ComplaintStatus, at: DateTime<Utc>) -> ComplaintStatus {
        let previous = self.status;
        self.status = status;
        match status {
            ComplaintStatus::Resolved => self.resolved_at = Some(at),
            ComplaintStatus::Closed | ComplaintStatus::Rejected => self.closed_at = Some(at),
            _ => {}
        }
        self.updated_at = at;
        previous
    }

    /// Bumps priority and stamps escalation metadata. Returns `(previous, current)` priority.
    pub fn escalate(&mut self, reason: String, raise_priority: bool, at: DateTime<Utc>) -> (Priority, Priority) {
        let previous = self.priority;
        if raise_priority {
            self.priority = previous.escalated();
        }
        self.escalated_at = Some(at);
        self.escalation_reason = Some(reason);
        self.updated_at = at;
        (previous, self.priority)
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated_at.is_some()
    }
}

/// Workflow-written fields that differ between two copies of a complaint.
/// Replayed onto a fresh read when a write loses a version race.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintChanges {
    pub status: Option<ComplaintStatus>,
    pub priority: Option<Priority>,
    pub current_stage: Option<Option<String>>,
    pub assigned_to: Option<Option<Uuid>>,
    pub escalated_at: Option<Option<DateTime<Utc>>>,
    pub escalation_reason: Option<Option<String>>,
    pub resolved_at: Option<Option<DateTime<Utc>>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: DateTime<Utc>,
}

fn changed<T: Clone + PartialEq>(before: &T, after: &T) -> Option<T> {
    (before != after).then(|| after.clone())
}

impl ComplaintChanges {
    pub fn between(before: &Complaint, after: &Complaint) -> Self {
        Self {
            status: changed(&before.status, &after.status),
            priority: changed(&before.priority, &after.priority),
            current_stage: changed(&before.current_stage, &after.current_stage),
            assigned_to: changed(&before.assigned_to, &after.assigned_to),
            escalated_at: changed(&before.escalated_at, &after.escalated_at),
            escalation_reason: changed(&before.escalation_reason, &after.escalation_reason),
            resolved_at: changed(&before.resolved_at, &after.resolved_at),
            closed_at: changed(&before.closed_at, &after.closed_at),
            updated_at: after.updated_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.current_stage.is_none()
            && self.assigned_to.is_none()
            && self.escalated_at.is_none()
            && self.escalation_reason.is_none()
            && self.resolved_at.is_none()
            && self.closed_at.is_none()
    }

    /// Overwrites only the changed fields; everything else keeps `complaint`'s values.
    pub fn apply_to(&self, complaint: &mut Complaint) {
        if let Some(status) = self.status {
            complaint.status = status;
        }
        if let Some(priority) = self.priority {
            complaint.priority = priority;
        }
        if let Some(stage) = &self.current_stage {
            complaint.current_stage = stage.clone();
        }
        if let Some(assignee) = self.assigned_to {
            complaint.assigned_to = assignee;
        }
        if let Some(at) = self.escalated_at {
            complaint.escalated_at = at;
        }
        if let Some(reason) = &self.escalation_reason {
            complaint.escalation_reason = reason.clone();
        }
        if let Some(at) = self.resolved_at {
            complaint.resolved_at = at;
        }
        if let Some(at) = self.closed_at {
            complaint.closed_at = at;
        }
        complaint.updated_at = self.updated_at;
    }
}
