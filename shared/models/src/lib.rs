//! # Redress Core Domain Models
//!
//! This module contains the core domain models for the Redress complaint
//! management platform. All models implement serialization with serde and,
//! where they accept user input, validation with the validator crate.
//!
//! ## Key Models
//!
//! - **Organization / Department / ComplaintType / User**: the tenant directory
//! - **Complaint**: a submitted complaint with status, priority and escalation metadata
//! - **WorkflowDefinition**: an ordered graph of stages with actions and transitions
//! - **WorkflowInstance**: one complaint's run through a definition, with append-only history
//! - **Notification**: an in-app inbox entry
//!
//! ## Invariants
//!
//! - Stage ids and stage orders are unique within a definition, and every
//!   transition targets a stage of the same definition (`validate_stages`)
//! - An instance has at most one open history entry, matching its current stage

pub mod organization;
pub mod complaint;
pub mod notification;
pub mod workflow;
pub mod instance;


pub use organization::*;
pub use complaint::*;
pub use notification::*;
pub use workflow::*;
pub use instance::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use validator::Validate;

    #[test]
    fn test_complaint_creation() {
        let complaint = Complaint::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Broken projector".to_string(),
            "Room 204 projector does not turn on".to_string(),
        );

        assert_eq!(complaint.status, ComplaintStatus::Pending);
        assert_eq!(complaint.priority, Priority::Medium);
        assert!(complaint.current_stage.is_none());
        assert!(complaint.validate().is_ok());
    }

    #[test]
    fn test_complaint_title_validation() {
        let complaint = Complaint::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            String::new(),
            "No title".to_string(),
        );
        assert!(complaint.validate().is_err());
    }

    #[test]
    fn test_terminal_status_stamps_timestamps() {
        let mut complaint = Complaint::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Noise".to_string(),
            "Construction at night".to_string(),
        );
        let now = Utc::now();

        let previous = complaint.apply_status(ComplaintStatus::Resolved, now);
        assert_eq!(previous, ComplaintStatus::Pending);
        assert_eq!(complaint.resolved_at, Some(now));
        assert!(complaint.closed_at.is_none());

        complaint.apply_status(ComplaintStatus::Closed, now);
        assert_eq!(complaint.closed_at, Some(now));
    }

    #[test]
    fn test_priority_ladder() {
        assert_eq!(Priority::Low.escalated(), Priority::Medium);
        assert_eq!(Priority::High.escalated(), Priority::Urgent);
        assert_eq!(Priority::Urgent.escalated(), Priority::Urgent);
    }

    #[test]
    fn test_escalate_without_priority_bump() {
        let mut complaint = Complaint::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Late refund".to_string(),
            "Still waiting".to_string(),
        );
        let (before, after) = complaint.escalate("manual".to_string(), false, Utc::now());
        assert_eq!(before, after);
        assert!(complaint.is_escalated());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(ComplaintStatus::from_str("in_progress"), Some(ComplaintStatus::InProgress));
        assert_eq!(ComplaintStatus::from_str("Under Review"), Some(ComplaintStatus::UnderReview));
        assert_eq!(ComplaintStatus::from_str("archived"), None);
        assert_eq!(
            serde_json::to_value(ComplaintStatus::InProgress).unwrap(),
            serde_json::json!("In Progress")
        );
    }

    #[test]
    fn test_user_department_membership() {
        let dept = Uuid::new_v4();
        let user = User::new(Uuid::new_v4(), "Ana".to_string(), "ana@example.com".to_string(), UserRole::Department)
            .with_department(dept);
        assert!(user.belongs_to_department(dept));
        assert!(!user.belongs_to_department(Uuid::new_v4()));
        assert!(user.role.is_staff());
    }
}
