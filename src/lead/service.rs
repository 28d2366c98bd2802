//! Lead service layer - import, color changes, proposal sweep and stats

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::StoreError;
use crate::lead::model::{
    ImportRow, Interaction, InteractionKind, Lead, LeadColor, ProposalStatus,
};
use crate::lead::transitions::apply_transition;
use crate::store::LeadStore;

/// Outcome of an import batch
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub lead_ids: Vec<Uuid>,
}

/// Charged cost broken down by interaction kind
#[derive(Debug, Clone)]
pub struct CostSummary {
    pub by_kind: HashMap<InteractionKind, f64>,
    pub total: f64,
}

/// Service for the lead lifecycle outside of dialing and dispatching
#[derive(Clone)]
pub struct LeadService {
    leads: Arc<dyn LeadStore>,
}

impl LeadService {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }

    /// Import a batch of rows, skipping invalid rows and known cpfs.
    ///
    /// A bad row never aborts the batch; it is logged and counted as skipped.
    pub async fn import_leads(
        &self,
        rows: Vec<ImportRow>,
        batch_id: Option<String>,
    ) -> Result<ImportSummary> {
        let batch = batch_id.as_deref();
        let mut summary = ImportSummary {
            imported: 0,
            skipped: 0,
            lead_ids: Vec::new(),
        };

        for row in &rows {
            if let Err(e) = row.validate() {
                tracing::warn!(cpf = %row.cpf, error = %e, "skipping invalid import row");
                summary.skipped += 1;
                continue;
            }

            if self.leads.find_by_cpf(row.cpf.trim()).await?.is_some() {
                tracing::debug!(cpf = %row.cpf, "cpf already known, skipping");
                summary.skipped += 1;
                continue;
            }

            let lead = Lead::from_import(row, batch);
            match self.leads.insert(&lead).await {
                Ok(()) => {
                    summary.imported += 1;
                    summary.lead_ids.push(lead.id);
                }
                // Two import jobs racing on the same cpf; first writer wins
                Err(StoreError::Duplicate(_)) => summary.skipped += 1,
                Err(e) => return Err(e).context("failed to insert imported lead"),
            }
        }

        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            batch = batch.unwrap_or("manual"),
            "lead import finished"
        );
        Ok(summary)
    }

    pub async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let lead = self.leads.get(id).await?;
        Ok(lead)
    }

    /// Move a lead to a new color through the state machine.
    ///
    /// `None` when the lead does not exist.
    pub async fn set_color(
        &self,
        lead_id: Uuid,
        target: LeadColor,
        reason: Option<&str>,
    ) -> Result<Option<Lead>> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(None);
        };

        apply_transition(lead.color, target, reason).apply_to(&mut lead);
        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist color change")?;

        tracing::info!(
            lead_id = %lead_id,
            color = %stored.color,
            blocked = stored.blocked,
            "lead color changed"
        );
        Ok(Some(stored))
    }

    /// Append a free-form note to the lead
    pub async fn add_observation(&self, lead_id: Uuid, text: &str) -> Result<Option<Lead>> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(None);
        };

        lead.observations.push(text.to_string());
        lead.interactions
            .push(Interaction::now(InteractionKind::Note, text, 0.0));
        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist observation")?;
        Ok(Some(stored))
    }

    /// Payment webhook landed: approve the proposal and settle the lead
    pub async fn record_payment(
        &self,
        lead_id: Uuid,
        amount: Option<f64>,
    ) -> Result<Option<Lead>> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(None);
        };

        lead.proposal_status = Some(ProposalStatus::Approved);
        if let Some(value) = amount {
            lead.proposal_value = Some(value);
        }
        apply_transition(lead.color, LeadColor::Paid, Some("payment confirmed"))
            .apply_to(&mut lead);

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist payment")?;
        tracing::info!(lead_id = %lead_id, value = ?stored.proposal_value, "payment recorded");
        Ok(Some(stored))
    }

    /// Complaint webhook landed: block the lead through the state machine
    pub async fn record_complaint(
        &self,
        lead_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Option<Lead>> {
        let Some(lead) = self.set_color(lead_id, LeadColor::Complaint, reason).await? else {
            return Ok(None);
        };
        tracing::warn!(lead_id = %lead_id, reason = ?lead.block_reason, "complaint recorded");
        Ok(Some(lead))
    }

    /// Expire every lapsed pending proposal; returns how many leads turned.
    ///
    /// Running the sweep twice in a row is a no-op the second time.
    pub async fn expire_proposals(&self) -> Result<u64> {
        let now = Utc::now();
        let lapsed = self.leads.find_expired_proposals(now).await?;
        let mut expired = 0u64;

        for mut lead in lapsed {
            lead.proposal_status = Some(ProposalStatus::Expired);
            apply_transition(lead.color, LeadColor::Expired, Some("proposal expired"))
                .apply_to(&mut lead);

            match self.leads.update(&lead).await {
                Ok(_) => expired += 1,
                // Another job touched the lead mid-sweep; the next run sees it
                Err(StoreError::VersionConflict { id, .. }) => {
                    tracing::warn!(lead_id = %id, "lead changed during sweep, skipping");
                }
                Err(e) => return Err(e).context("failed to expire proposal"),
            }
        }

        if expired > 0 {
            tracing::info!(expired, "proposal sweep expired leads");
        }
        Ok(expired)
    }

    pub async fn color_stats(&self) -> Result<HashMap<LeadColor, i64>> {
        let counts = self.leads.count_by_color().await?;
        Ok(counts)
    }

    pub async fn cost_summary(&self) -> Result<CostSummary> {
        let by_kind = self.leads.cost_by_kind().await?;
        let total = by_kind.values().sum();
        Ok(CostSummary { by_kind, total })
    }
}
