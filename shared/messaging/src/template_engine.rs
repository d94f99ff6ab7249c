//! Email Template Engine
//!
//! Handlebars-based rendering for complaint and workflow emails.

use anyhow::{bail, Context, Result};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const WORKFLOW_NOTIFICATION: &str = "workflow_notification";
pub const COMPLAINT_ASSIGNED: &str = "complaint_assigned";
pub const COMPLAINT_ESCALATED: &str = "complaint_escalated";
pub const COMPLAINT_STATUS_CHANGED: &str = "complaint_status_changed";

/// Email template definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub subject_template: String,
    pub body_html_template: String,
    pub body_text_template: String,
    pub variables: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub default_value: Option<String>,
}

impl TemplateVariable {
    fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
            default_value: None,
        }
    }

    fn optional(name: &str, description: &str, default_value: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
            default_value: Some(default_value.to_string()),
        }
    }
}

/// Template rendering result
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

const LAYOUT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head><style>body{font-family:Arial,sans-serif;line-height:1.6;color:#333;}.header{background:#0f766e;color:white;padding:16px;}.content{padding:16px;}.footer{background:#f3f4f6;padding:12px;font-size:12px;}</style></head>
<body>"#;

const LAYOUT_FOOT: &str = r#"<div class="footer">This is an automated message from {{organization_name}}. Complaint reference: {{complaint_id}}</div>
</body>
</html>"#;

fn html(header: &str, content: &str) -> String {
    format!(
        "{}\n<div class=\"header\"><h2>{}</h2></div>\n<div class=\"content\">\n{}\n</div>\n{}",
        LAYOUT_HEAD, header, content, LAYOUT_FOOT
    )
}

fn common_variables() -> Vec<TemplateVariable> {
    vec![
        TemplateVariable::required("recipient_name", "Name of the person receiving the email"),
        TemplateVariable::required("complaint_id", "Complaint reference"),
        TemplateVariable::optional("complaint_title", "Complaint title", "your complaint"),
        TemplateVariable::optional("organization_name", "Sending organization", "Redress"),
    ]
}

/// Template engine
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            handlebars: Handlebars::new(),
            templates: HashMap::new(),
        };

        engine.register_builtin_templates();

        engine
    }

    fn register(&mut self, template: EmailTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    fn register_builtin_templates(&mut self) {
        let mut variables = common_variables();
        variables.push(TemplateVariable::required("message", "Workflow message"));
        variables.push(TemplateVariable::optional("stage_name", "Current workflow stage", "the next stage"));
        self.register(EmailTemplate {
            id: WORKFLOW_NOTIFICATION.to_string(),
            name: "Workflow Update".to_string(),
            description: "Sent by NOTIFICATION stage actions".to_string(),
            subject_template: "Update on {{complaint_title}}".to_string(),
            body_html_template: html(
                "Complaint Update",
                "<p>Dear {{recipient_name}},</p>\n<p>{{message}}</p>\n<p>Current stage: <strong>{{stage_name}}</strong></p>",
            ),
            body_text_template: "Dear {{recipient_name}},\n\n{{message}}\n\nCurrent stage: {{stage_name}}\n\nReference: {{complaint_id}}".to_string(),
            variables,
        });

        let mut variables = common_variables();
        variables.push(TemplateVariable::optional("message", "Assignment note", "A complaint has been assigned to you."));
        self.register(EmailTemplate {
            id: COMPLAINT_ASSIGNED.to_string(),
            name: "Complaint Assigned".to_string(),
            description: "Sent to the handler picked by an ASSIGNMENT action".to_string(),
            subject_template: "Assigned to you: {{complaint_title}}".to_string(),
            body_html_template: html(
                "New Assignment",
                "<p>Dear {{recipient_name}},</p>\n<p>{{message}}</p>\n<p>Please review it at your earliest convenience.</p>",
            ),
            body_text_template: "Dear {{recipient_name}},\n\n{{message}}\n\nPlease review it at your earliest convenience.\n\nReference: {{complaint_id}}".to_string(),
            variables,
        });

        let mut variables = common_variables();
        variables.push(TemplateVariable::required("message", "Escalation reason"));
        variables.push(TemplateVariable::optional("priority", "Priority after escalation", "unchanged"));
        self.register(EmailTemplate {
            id: COMPLAINT_ESCALATED.to_string(),
            name: "Complaint Escalated".to_string(),
            description: "Sent to department staff when a complaint is escalated".to_string(),
            subject_template: "Escalated: {{complaint_title}}".to_string(),
            body_html_template: html(
                "Complaint Escalated",
                "<p>Dear {{recipient_name}},</p>\n<p>{{message}}</p>\n<p>Priority is now <strong>{{priority}}</strong>.</p>",
            ),
            body_text_template: "Dear {{recipient_name}},\n\n{{message}}\n\nPriority is now {{priority}}.\n\nReference: {{complaint_id}}".to_string(),
            variables,
        });

        let mut variables = common_variables();
        variables.push(TemplateVariable::required("message", "Status change summary"));
        self.register(EmailTemplate {
            id: COMPLAINT_STATUS_CHANGED.to_string(),
            name: "Complaint Status Changed".to_string(),
            description: "Sent to the complainant when the complaint status moves".to_string(),
            subject_template: "Status update: {{complaint_title}}".to_string(),
            body_html_template: html(
                "Status Update",
                "<p>Dear {{recipient_name}},</p>\n<p>{{message}}</p>",
            ),
            body_text_template: "Dear {{recipient_name}},\n\n{{message}}\n\nReference: {{complaint_id}}".to_string(),
            variables,
        });
    }

    pub fn get_template(&self, template_id: &str) -> Option<&EmailTemplate> {
        self.templates.get(template_id)
    }

    pub fn list_templates(&self) -> Vec<&EmailTemplate> {
        let mut templates: Vec<&EmailTemplate> = self.templates.values().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    /// Renders a template. Missing optional variables take their default;
    /// a missing required variable is an error.
    pub fn render(&self, template_id: &str, variables: &HashMap<String, serde_json::Value>) -> Result<RenderedEmail> {
        let template = self
            .templates
            .get(template_id)
            .with_context(|| format!("Template not found: {}", template_id))?;

        let mut data = variables.clone();
        for variable in &template.variables {
            if data.contains_key(&variable.name) {
                continue;
            }
            match (&variable.default_value, variable.required) {
                (Some(default), _) => {
                    data.insert(variable.name.clone(), serde_json::Value::String(default.clone()));
                }
                (None, true) => bail!("Missing required variable '{}' for template {}", variable.name, template_id),
                (None, false) => {}
            }
        }

        let subject = self
            .handlebars
            .render_template(&template.subject_template, &data)
            .context("Failed to render subject")?;

        let body_html = self
            .handlebars
            .render_template(&template.body_html_template, &data)
            .context("Failed to render HTML body")?;

        let body_text = self
            .handlebars
            .render_template(&template.body_text_template, &data)
            .context("Failed to render text body")?;

        Ok(RenderedEmail {
            subject,
            body_html,
            body_text,
        })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
