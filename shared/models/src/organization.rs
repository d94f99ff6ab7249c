//! Tenant directory models for the Redress complaint platform.
//!
//! Organizations own departments, complaint types and users. The workflow
//! engine only reads these records, it never writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Organization name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Department {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ComplaintType {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Department that handles complaints of this type by default.
    pub department_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Department,
    Complainant,
}

impl UserRole {
    pub fn is_staff(&self) -> bool {
        !matches!(self, UserRole::Complainant)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperAdmin => write!(f, "SuperAdmin"),
            Self::Admin => write!(f, "Admin"),
            Self::Department => write!(f, "Department"),
            Self::Complainant => write!(f, "Complainant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub department_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    /// SHA-256 hex digest of the user's API bearer token.
    pub api_token_digest: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(organization_id: Uuid, name: String, email: String, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            department_id: None,
            name,
            email,
            role,
            is_active: true,
            api_token_digest: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_department(mut self, department_id: Uuid) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn belongs_to_department(&self, department_id: Uuid) -> bool {
        self.department_id == Some(department_id)
    }
}
