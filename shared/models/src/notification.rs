use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub related_entity: Option<RelatedEntity>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    ComplaintUpdate,
    Assignment,
    Escalation,
    Workflow,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComplaintUpdate => write!(f, "complaint_update"),
            Self::Assignment => write!(f, "assignment"),
            Self::Escalation => write!(f, "escalation"),
            Self::Workflow => write!(f, "workflow"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedEntity {
    pub entity_type: String,
    pub entity_id: Uuid,
}

impl RelatedEntity {
    pub fn complaint(id: Uuid) -> Self {
        Self {
            entity_type: "complaint".to_string(),
            entity_id: id,
        }
    }
}

impl Notification {
    pub fn new(user_id: Uuid, kind: NotificationKind, message: String, related_entity: Option<RelatedEntity>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            message,
            related_entity,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}
