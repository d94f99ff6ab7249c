use async_trait::async_trait;
use redress_models::Complaint;
use redress_utils::RedressResult;
use uuid::Uuid;

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn insert_complaint(&self, complaint: &Complaint) -> RedressResult<()>;

    async fn get_complaint(&self, id: Uuid) -> RedressResult<Option<Complaint>>;

    /// Compare-and-swap on `complaint.version`; bumps the version on success.
    /// A stale copy fails with `ConcurrentModification`, an unknown id with `NotFound`.
    async fn update_complaint(&self, complaint: &mut Complaint) -> RedressResult<()>;

    /// Complaints in an open status currently assigned to `user_id`.
    async fn count_open_assigned(&self, user_id: Uuid) -> RedressResult<u64>;

    async fn find_complaints(
        &self,
        organization_id: Uuid,
        complainant_id: Option<Uuid>,
    ) -> RedressResult<Vec<Complaint>>;
}
