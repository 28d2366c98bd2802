//! WhatsApp service layer - connection pool management and pool-aware sending

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::costs::Channel;
use crate::lead::{Interaction, InteractionKind, Lead, LeadColor};
use crate::marketing::{SendFailure, SendReport};
use crate::store::{ConnectionStore, LeadStore, TemplateStore};
use crate::templates::{pick_random, TemplateChannel};
use crate::whatsapp::model::Connection;

/// Pool size the engine keeps provisioned
pub const DEFAULT_POOL_SIZE: u32 = 20;

/// Messages one number may send per day
pub const DEFAULT_DAILY_LIMIT: u32 = 25;

/// Tracking links older than this are minted fresh on the next send
pub const LINK_MAX_AGE_DAYS: i64 = 3;

/// Service owning the WhatsApp number pool and the WhatsApp channel
#[derive(Clone)]
pub struct WhatsAppService {
    leads: Arc<dyn LeadStore>,
    connections: Arc<dyn ConnectionStore>,
    templates: Arc<dyn TemplateStore>,
    pool_size: u32,
    daily_limit: u32,
}

impl WhatsAppService {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        connections: Arc<dyn ConnectionStore>,
        templates: Arc<dyn TemplateStore>,
        pool_size: u32,
        daily_limit: u32,
    ) -> Self {
        Self {
            leads,
            connections,
            templates,
            pool_size,
            daily_limit,
        }
    }

    /// Top the pool up to its configured size; the pool never shrinks.
    ///
    /// Numbering continues from the current count so re-running after a
    /// partial provision is safe.
    pub async fn initialize_pool(&self) -> Result<u32> {
        let existing = self.connections.count().await? as u32;
        let mut provisioned = 0;

        for number in (existing + 1)..=self.pool_size {
            let connection = Connection::new(number, self.daily_limit);
            self.connections
                .insert(&connection)
                .await
                .context("failed to provision whatsapp connection")?;
            provisioned += 1;
        }

        if provisioned > 0 {
            tracing::info!(provisioned, pool_size = self.pool_size, "whatsapp pool provisioned");
        }
        Ok(provisioned)
    }

    /// Acquire a sending slot for a lead: retention first, then failover.
    ///
    /// The returned connection already has this send booked against its
    /// daily quota; there is no separate reserve step to race against.
    /// `None` means every number is saturated right now.
    pub async fn acquire_connection(&self, lead: &Lead) -> Result<Option<Connection>> {
        let now = Utc::now();

        // Retention: keep the lead on its bound number while it can send
        if let Some(bound) = lead.whatsapp_connection_id {
            if let Some(conn) = self.connections.record_send(bound, now).await? {
                return Ok(Some(conn));
            }
        }

        // Failover to the least-loaded number; a second pass covers losing
        // the quota race to a concurrent sender
        for _ in 0..2 {
            let Some(candidate) = self.connections.pick_least_loaded().await? else {
                return Ok(None);
            };
            if let Some(conn) = self.connections.record_send(candidate.id, now).await? {
                return Ok(Some(conn));
            }
        }
        Ok(None)
    }

    /// Send one WhatsApp message through the pool.
    ///
    /// Leads on the complaint color never receive WhatsApp. A saturated pool
    /// is a retryable refusal, not an error.
    pub async fn send_message(&self, lead_id: Uuid) -> Result<SendReport> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(SendReport::refused(SendFailure::LeadNotFound));
        };
        if lead.color == LeadColor::Complaint {
            return Ok(SendReport::refused(SendFailure::LeadBlockedComplaint));
        }
        let Some(phone) = lead.first_valid_phone().map(str::to_string) else {
            return Ok(SendReport::refused(SendFailure::NoPhone));
        };

        let Some(connection) = self.acquire_connection(&lead).await? else {
            tracing::warn!(lead_id = %lead_id, "whatsapp pool exhausted");
            return Ok(SendReport::refused(SendFailure::NoAvailableConnection));
        };

        if lead.whatsapp_connection_id != Some(connection.id) {
            self.connections
                .assign_lead(connection.id, lead.id)
                .await
                .context("failed to bind lead to connection")?;
            lead.whatsapp_connection_id = Some(connection.id);
        }

        let now = Utc::now();
        let mut cost = Channel::Whatsapp.unit_cost();
        let link_rotated = self.rotate_link_if_stale(&mut lead, now);
        if link_rotated {
            cost += Channel::LinkGeneration.unit_cost();
        }

        let templates = self
            .templates
            .active_for_channel(TemplateChannel::Whatsapp)
            .await?;
        let body = match pick_random(&templates) {
            Some(t) => t.render(&lead.name),
            None => format!("Oi {}, tudo bem?", lead.name),
        };

        // TODO: hand the rendered message to the WhatsApp gateway
        lead.whatsapp_last_sent_at = Some(now);
        lead.charge(
            Interaction::now(
                InteractionKind::Whatsapp,
                format!("whatsapp sent via connection-{}", connection.connection_number),
                cost,
            )
            .with_details(serde_json::json!({
                "connection_number": connection.connection_number,
                "phone": phone,
                "link_id": lead.whatsapp_link_id,
                "link_rotated": link_rotated,
                "body": body,
            })),
        );

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist whatsapp send")?;

        tracing::info!(
            lead_id = %lead_id,
            connection = connection.connection_number,
            daily_sent = connection.daily_messages_sent,
            link_rotated,
            "whatsapp sent"
        );
        Ok(SendReport::sent(stored))
    }

    /// Midnight reset of every daily counter; idempotent within the day
    pub async fn reset_daily_counters(&self) -> Result<u64> {
        let touched = self.connections.reset_daily_counters(Utc::now()).await?;
        tracing::info!(touched, "daily whatsapp counters reset");
        Ok(touched)
    }

    /// Mint a fresh tracking link when none exists or the current one aged out
    fn rotate_link_if_stale(&self, lead: &mut Lead, now: chrono::DateTime<Utc>) -> bool {
        let stale = match (&lead.whatsapp_link_id, lead.whatsapp_link_generated_at) {
            (None, _) | (Some(_), None) => true,
            (Some(_), Some(generated)) => now - generated > Duration::days(LINK_MAX_AGE_DAYS),
        };
        if stale {
            lead.whatsapp_link_id = Some(Uuid::new_v4().simple().to_string());
            lead.whatsapp_link_generated_at = Some(now);
        }
        stale
    }
}
