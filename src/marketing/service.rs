//! Marketing service layer - RCS/SMS/e-mail dispatch and webhook reactions

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::costs::Channel;
use crate::lead::{apply_transition, Interaction, InteractionKind, Lead, LeadColor};
use crate::marketing::model::{SendFailure, SendReport, WebhookKind};
use crate::store::{LeadStore, TemplateStore};
use crate::templates::{pick_random, TemplateChannel};

/// Service for the one-shot outreach channels and the engagement webhooks
#[derive(Clone)]
pub struct MarketingService {
    leads: Arc<dyn LeadStore>,
    templates: Arc<dyn TemplateStore>,
}

impl MarketingService {
    pub fn new(leads: Arc<dyn LeadStore>, templates: Arc<dyn TemplateStore>) -> Self {
        Self { leads, templates }
    }

    /// Send one RCS message; charges and logs exactly once
    pub async fn send_rcs(&self, lead_id: Uuid) -> Result<SendReport> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(SendReport::refused(SendFailure::LeadNotFound));
        };
        if lead.blocked {
            return Ok(SendReport::refused(SendFailure::LeadBlocked));
        }
        let Some(phone) = lead.first_valid_phone().map(str::to_string) else {
            return Ok(SendReport::refused(SendFailure::NoPhone));
        };

        let tracking_id = Uuid::new_v4();
        let body = self.pick_body(TemplateChannel::Rcs, &lead).await?;
        lead.rcs_sent = true;
        lead.charge(
            Interaction::now(
                InteractionKind::Rcs,
                format!("rcs sent (tracking {})", tracking_id),
                Channel::Rcs.unit_cost(),
            )
            .with_details(serde_json::json!({
                "tracking_id": tracking_id,
                "phone": phone,
                "body": body,
            })),
        );

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist rcs send")?;
        tracing::info!(lead_id = %lead_id, tracking_id = %tracking_id, "rcs sent");
        Ok(SendReport::sent(stored))
    }

    /// Send one SMS; requires a dialable phone
    pub async fn send_sms(&self, lead_id: Uuid) -> Result<SendReport> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(SendReport::refused(SendFailure::LeadNotFound));
        };
        if lead.blocked {
            return Ok(SendReport::refused(SendFailure::LeadBlocked));
        }
        let Some(phone) = lead.first_valid_phone().map(str::to_string) else {
            return Ok(SendReport::refused(SendFailure::NoPhone));
        };

        let body = self.pick_body(TemplateChannel::Sms, &lead).await?;
        lead.sms_sent = true;
        lead.charge(
            Interaction::now(
                InteractionKind::Sms,
                format!("sms sent to {}", phone),
                Channel::Sms.unit_cost(),
            )
            .with_details(serde_json::json!({ "body": body })),
        );

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist sms send")?;
        tracing::info!(lead_id = %lead_id, phone = %phone, "sms sent");
        Ok(SendReport::sent(stored))
    }

    /// Send one e-mail; requires an address on file
    pub async fn send_email(&self, lead_id: Uuid) -> Result<SendReport> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(SendReport::refused(SendFailure::LeadNotFound));
        };
        if lead.blocked {
            return Ok(SendReport::refused(SendFailure::LeadBlocked));
        }
        if lead.email.trim().is_empty() {
            return Ok(SendReport::refused(SendFailure::NoEmail));
        }

        let tracking_id = Uuid::new_v4();
        let templates = self
            .templates
            .active_for_channel(TemplateChannel::Email)
            .await?;
        let (subject, body) = match pick_random(&templates) {
            Some(t) => (
                t.subject.clone().unwrap_or_else(|| t.name.clone()),
                t.render(&lead.name),
            ),
            None => ("Sua proposta".to_string(), format!("Ola {}", lead.name)),
        };

        lead.email_sent = true;
        lead.charge(
            Interaction::now(
                InteractionKind::Email,
                format!("email sent: {} (tracking {})", subject, tracking_id),
                Channel::Email.unit_cost(),
            )
            .with_details(serde_json::json!({
                "tracking_id": tracking_id,
                "body": body,
            })),
        );

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist email send")?;
        tracing::info!(lead_id = %lead_id, tracking_id = %tracking_id, "email sent");
        Ok(SendReport::sent(stored))
    }

    /// React to an engagement webhook: stamp the event and, on the first sign
    /// of life, pull the lead out of NoContact.
    ///
    /// `None` when the lead does not exist; unknown leads are the caller's
    /// problem, not an error.
    pub async fn handle_webhook(
        &self,
        kind: WebhookKind,
        lead_id: Uuid,
    ) -> Result<Option<Lead>> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            tracing::warn!(kind = kind.as_str(), lead_id = %lead_id, "webhook for unknown lead");
            return Ok(None);
        };

        let now = Utc::now();
        match kind {
            WebhookKind::LinkClick => {
                lead.link_clicked = true;
                lead.link_clicked_at = Some(now);
            }
            WebhookKind::EmailOpen => {
                lead.email_opened_at = Some(now);
            }
            WebhookKind::RcsClick => {
                lead.rcs_clicked_at = Some(now);
            }
        }

        lead.interactions.push(
            Interaction::now(
                InteractionKind::Note,
                format!("webhook received: {}", kind.as_str()),
                0.0,
            )
            .with_details(serde_json::json!({ "webhook": kind.as_str() })),
        );

        // First engagement promotes NoContact exactly once; later webhooks
        // only stamp their timestamps.
        if lead.color == LeadColor::NoContact {
            apply_transition(
                lead.color,
                LeadColor::Engaged,
                Some(&format!("{} webhook", kind.as_str())),
            )
            .apply_to(&mut lead);
            lead.interacted = true;
            lead.interacted_at = Some(now);
        }

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist webhook reaction")?;
        tracing::info!(lead_id = %lead_id, kind = kind.as_str(), "webhook handled");
        Ok(Some(stored))
    }

    /// Random active template body for a channel, or a plain default
    async fn pick_body(&self, channel: TemplateChannel, lead: &Lead) -> Result<String> {
        let templates = self.templates.active_for_channel(channel).await?;
        Ok(match pick_random(&templates) {
            Some(t) => t.render(&lead.name),
            None => format!("Ola {}, temos uma proposta para voce.", lead.name),
        })
    }
}
