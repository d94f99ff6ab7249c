use async_trait::async_trait;
use redress_models::Notification;
use redress_utils::RedressResult;
use uuid::Uuid;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> RedressResult<()>;

    /// Newest first.
    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> RedressResult<Vec<Notification>>;

    /// Returns false when the notification does not exist or belongs to another user.
    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> RedressResult<bool>;
}
