//! Directory Repository
//!
//! Read access to the tenant directory. The insert methods exist for
//! provisioning and tests; the engine only reads.

use async_trait::async_trait;
use redress_models::{ComplaintType, Department, Organization, User, UserRole};
use redress_utils::RedressResult;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub organization_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub role: Option<UserRole>,
    pub active_only: bool,
}

impl UserFilter {
    /// Active users of a department, any role.
    pub fn active_in_department(department_id: Uuid) -> Self {
        Self {
            department_id: Some(department_id),
            active_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.organization_id.map_or(true, |id| user.organization_id == id)
            && self.department_id.map_or(true, |id| user.department_id == Some(id))
            && self.role.map_or(true, |role| user.role == role)
            && (!self.active_only || user.is_active)
    }
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn insert_organization(&self, organization: &Organization) -> RedressResult<()>;
    async fn get_organization(&self, id: Uuid) -> RedressResult<Option<Organization>>;

    async fn insert_department(&self, department: &Department) -> RedressResult<()>;
    async fn get_department(&self, id: Uuid) -> RedressResult<Option<Department>>;

    async fn insert_complaint_type(&self, complaint_type: &ComplaintType) -> RedressResult<()>;
    async fn get_complaint_type(&self, id: Uuid) -> RedressResult<Option<ComplaintType>>;

    async fn insert_user(&self, user: &User) -> RedressResult<()>;
    async fn get_user(&self, id: Uuid) -> RedressResult<Option<User>>;

    /// Matching users in creation order.
    async fn find_users(&self, filter: &UserFilter) -> RedressResult<Vec<User>>;

    async fn find_user_by_token_digest(&self, digest: &str) -> RedressResult<Option<User>>;
}
