//! Notification dispatch
//!
//! `DispatchNotifier` writes the in-app inbox entry first, then mails the
//! recipient when an email dispatcher is configured.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use redress_database::{DirectoryStore, NotificationStore};
use redress_models::{Notification, NotificationKind, RelatedEntity};
use redress_utils::{RedressError, RedressResult};

use crate::dispatcher::{EmailDispatcher, Recipient};
use crate::template_engine::{
    COMPLAINT_ASSIGNED, COMPLAINT_ESCALATED, COMPLAINT_STATUS_CHANGED, WORKFLOW_NOTIFICATION,
};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub related_entity: Option<RelatedEntity>,
    /// Extra template variables for the email copy.
    pub details: HashMap<String, Value>,
}

impl NotificationRequest {
    pub fn new(user_id: Uuid, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
            related_entity: None,
            details: HashMap::new(),
        }
    }

    pub fn about_complaint(mut self, complaint_id: Uuid) -> Self {
        self.related_entity = Some(RelatedEntity::complaint(complaint_id));
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: NotificationRequest) -> RedressResult<()>;
}

fn template_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Workflow => WORKFLOW_NOTIFICATION,
        NotificationKind::Assignment => COMPLAINT_ASSIGNED,
        NotificationKind::Escalation => COMPLAINT_ESCALATED,
        NotificationKind::ComplaintUpdate => COMPLAINT_STATUS_CHANGED,
    }
}

pub struct DispatchNotifier {
    inbox: Arc<dyn NotificationStore>,
    directory: Arc<dyn DirectoryStore>,
    email: Option<EmailDispatcher>,
}

impl DispatchNotifier {
    pub fn new(
        inbox: Arc<dyn NotificationStore>,
        directory: Arc<dyn DirectoryStore>,
        email: Option<EmailDispatcher>,
    ) -> Self {
        Self { inbox, directory, email }
    }

    async fn send_email(&self, dispatcher: &EmailDispatcher, request: &NotificationRequest) -> RedressResult<()> {
        let user = match self.directory.get_user(request.user_id).await? {
            Some(user) if user.is_active && !user.email.is_empty() => user,
            _ => return Ok(()),
        };

        let mut payload = request.details.clone();
        payload.insert("recipient_name".to_string(), json!(user.name));
        payload.insert("message".to_string(), json!(request.message));
        let reference = request
            .related_entity
            .as_ref()
            .map(|e| e.entity_id.to_string())
            .unwrap_or_else(|| request.user_id.to_string());
        payload.entry("complaint_id".to_string()).or_insert(json!(reference));

        let recipient = Recipient {
            email: user.email.clone(),
            name: user.name.clone(),
        };
        let report = dispatcher.send(template_for(request.kind), &recipient, &payload).await;
        if report.delivered {
            Ok(())
        } else {
            Err(RedressError::external_dispatch("email", report.detail))
        }
    }
}

#[async_trait]
impl Notifier for DispatchNotifier {
    async fn notify(&self, request: NotificationRequest) -> RedressResult<()> {
        let notification = Notification::new(
            request.user_id,
            request.kind,
            request.message.clone(),
            request.related_entity.clone(),
        );
        self.inbox
            .insert_notification(&notification)
            .await
            .map_err(|e| RedressError::external_dispatch("inbox", e.to_string()))?;

        if let Some(dispatcher) = &self.email {
            self.send_email(dispatcher, &request).await?;
        }

        tracing::debug!(user_id = %request.user_id, kind = %request.kind, "Notification dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp_client::{MailTransport, OutgoingEmail};
    use crate::template_engine::TemplateEngine;
    use redress_database::MemoryStore;
    use redress_models::{User, UserRole};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl MailTransport for Recording {
        async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<String> {
            self.sent.lock().await.push(email.clone());
            Ok("queued".to_string())
        }
    }

    async fn user(store: &MemoryStore) -> User {
        let user = User::new(Uuid::new_v4(), "Kim".to_string(), "kim@example.com".to_string(), UserRole::Complainant);
        store.insert_user(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_notify_writes_inbox_and_sends_email() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(Recording::default());
        let dispatcher = EmailDispatcher::new(Arc::new(TemplateEngine::new()), transport.clone());
        let notifier = DispatchNotifier::new(store.clone(), store.clone(), Some(dispatcher));
        let kim = user(&store).await;
        let complaint_id = Uuid::new_v4();

        notifier
            .notify(
                NotificationRequest::new(kim.id, NotificationKind::Workflow, "Your complaint moved to Review")
                    .about_complaint(complaint_id)
                    .with_detail("stage_name", "Review"),
            )
            .await
            .unwrap();

        let inbox = store.list_notifications(kim.id, true).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].related_entity, Some(RelatedEntity::complaint(complaint_id)));

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_email, "kim@example.com");
        assert!(sent[0].body_text.contains("Current stage: Review"));
        assert!(sent[0].body_text.contains(&complaint_id.to_string()));
    }

    #[tokio::test]
    async fn test_notify_without_email_only_writes_inbox() {
        let store = Arc::new(MemoryStore::new());
        let notifier = DispatchNotifier::new(store.clone(), store.clone(), None);
        let kim = user(&store).await;

        notifier
            .notify(NotificationRequest::new(kim.id, NotificationKind::Escalation, "Escalated"))
            .await
            .unwrap();

        assert_eq!(store.list_notifications(kim.id, false).await.unwrap().len(), 1);
    }
}
