//! Message templates for outbound channels.
//!
//! Dispatchers pick uniformly at random among the active templates for their
//! channel; a missing template is never an error, the channel default body is
//! used instead.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel a template is written for
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateChannel {
    Whatsapp,
    Rcs,
    Sms,
    Email,
    Voice,
}

impl TemplateChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateChannel::Whatsapp => "whatsapp",
            TemplateChannel::Rcs => "rcs",
            TemplateChannel::Sms => "sms",
            TemplateChannel::Email => "email",
            TemplateChannel::Voice => "voice",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub channel: TemplateChannel,
    pub name: String,
    pub content: String,
    /// Subject line, e-mail templates only
    pub subject: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageTemplate {
    pub fn new(
        channel: TemplateChannel,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            name: name.into(),
            content: content.into(),
            subject: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Fill the `{{name}}` placeholder with the lead's name
    pub fn render(&self, lead_name: &str) -> String {
        self.content.replace("{{name}}", lead_name)
    }
}

/// Uniform random pick among the given templates
pub fn pick_random(templates: &[MessageTemplate]) -> Option<&MessageTemplate> {
    if templates.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..templates.len());
    templates.get(idx)
}

/// Default templates seeded when the store has none
pub fn starter_set() -> Vec<MessageTemplate> {
    vec![
        MessageTemplate::new(
            TemplateChannel::Whatsapp,
            "whatsapp-intro",
            "Oi {{name}}, tudo bem? Temos uma proposta para voce.",
        ),
        MessageTemplate::new(
            TemplateChannel::Whatsapp,
            "whatsapp-followup",
            "{{name}}, ainda da tempo de aproveitar sua proposta.",
        ),
        MessageTemplate::new(
            TemplateChannel::Rcs,
            "rcs-offer",
            "{{name}}, sua proposta esta pronta. Toque para ver.",
        ),
        MessageTemplate::new(
            TemplateChannel::Sms,
            "sms-short",
            "{{name}}, sua proposta expira em breve. Responda SIM para saber mais.",
        ),
        MessageTemplate::new(
            TemplateChannel::Email,
            "email-proposal",
            "Ola {{name}}, segue sua proposta personalizada.",
        )
        .with_subject("Sua proposta chegou"),
        MessageTemplate::new(
            TemplateChannel::Voice,
            "voice-script-default",
            "Roteiro padrao de apresentacao da proposta.",
        ),
    ]
}
