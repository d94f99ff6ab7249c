//! Outbound messaging for Redress: the in-app inbox, Handlebars email
//! templates and SMTP delivery.
//!
//! Everything here is best-effort. Callers get a report or a
//! `RedressError::ExternalDispatch` to log, never a reason to roll back.

pub mod dispatcher;
pub mod notifier;
pub mod smtp_client;
pub mod template_engine;

pub use dispatcher::{DeliveryReport, EmailDispatcher, Recipient};
pub use notifier::{DispatchNotifier, NotificationRequest, Notifier};
pub use smtp_client::{MailTransport, NoopTransport, OutgoingEmail, SmtpClient, SmtpConfig};
pub use template_engine::{EmailTemplate, RenderedEmail, TemplateEngine, TemplateVariable};
