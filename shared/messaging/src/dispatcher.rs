use std::collections::HashMap;
use std::sync::Arc;

use crate::smtp_client::{MailTransport, OutgoingEmail};
use crate::template_engine::TemplateEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub template_id: String,
    pub recipient: String,
    pub delivered: bool,
    pub detail: String,
}

/// Template-keyed email sending. `send` reports failures instead of
/// returning them.
#[derive(Clone)]
pub struct EmailDispatcher {
    templates: Arc<TemplateEngine>,
    transport: Arc<dyn MailTransport>,
}

impl EmailDispatcher {
    pub fn new(templates: Arc<TemplateEngine>, transport: Arc<dyn MailTransport>) -> Self {
        Self { templates, transport }
    }

    pub async fn send(
        &self,
        template_id: &str,
        recipient: &Recipient,
        payload: &HashMap<String, serde_json::Value>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport {
            template_id: template_id.to_string(),
            recipient: recipient.email.clone(),
            delivered: false,
            detail: String::new(),
        };

        let rendered = match self.templates.render(template_id, payload) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(template_id, recipient = %recipient.email, error = %e, "Email rendering failed");
                report.detail = format!("{:#}", e);
                return report;
            }
        };

        let email = OutgoingEmail {
            to_email: recipient.email.clone(),
            to_name: recipient.name.clone(),
            subject: rendered.subject,
            body_html: rendered.body_html,
            body_text: rendered.body_text,
        };

        match self.transport.deliver(&email).await {
            Ok(response) => {
                tracing::debug!(template_id, recipient = %recipient.email, "Email delivered");
                report.delivered = true;
                report.detail = response;
            }
            Err(e) => {
                tracing::warn!(template_id, recipient = %recipient.email, error = %e, "Email delivery failed");
                report.detail = format!("{:#}", e);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template_engine::COMPLAINT_ASSIGNED;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for Recording {
        async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.sent.lock().await.push(email.clone());
            Ok("250 OK".to_string())
        }
    }

    fn recipient() -> Recipient {
        Recipient {
            email: "sam@example.com".to_string(),
            name: "Sam".to_string(),
        }
    }

    fn payload() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("recipient_name".to_string(), json!("Sam")),
            ("complaint_id".to_string(), json!("c-1")),
        ])
    }

    #[tokio::test]
    async fn test_send_delivers_rendered_email() {
        let transport = Arc::new(Recording::default());
        let dispatcher = EmailDispatcher::new(Arc::new(TemplateEngine::new()), transport.clone());

        let report = dispatcher.send(COMPLAINT_ASSIGNED, &recipient(), &payload()).await;
        assert!(report.delivered);
        assert_eq!(report.detail, "250 OK");

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Assigned to you: your complaint");
    }

    #[tokio::test]
    async fn test_send_reports_transport_failure() {
        let transport = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let dispatcher = EmailDispatcher::new(Arc::new(TemplateEngine::new()), transport);

        let report = dispatcher.send(COMPLAINT_ASSIGNED, &recipient(), &payload()).await;
        assert!(!report.delivered);
        assert!(report.detail.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_send_reports_render_failure() {
        let dispatcher = EmailDispatcher::new(Arc::new(TemplateEngine::new()), Arc::new(Recording::default()));
        let report = dispatcher.send("missing", &recipient(), &payload()).await;
        assert!(!report.delivered);
    }
}
