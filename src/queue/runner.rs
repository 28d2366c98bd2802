//! Routes dequeued jobs to the service that owns the work

use anyhow::Result;

use crate::calls::CallService;
use crate::lead::LeadService;
use crate::marketing::MarketingService;
use crate::queue::{Job, JobKind, JobPayload};
use crate::whatsapp::WhatsAppService;

/// One runner instance is shared by every consumer loop.
pub struct JobRunner {
    calls: CallService,
    whatsapp: WhatsAppService,
    marketing: MarketingService,
    leads: LeadService,
}

impl JobRunner {
    pub fn new(
        calls: CallService,
        whatsapp: WhatsAppService,
        marketing: MarketingService,
        leads: LeadService,
    ) -> Self {
        Self {
            calls,
            whatsapp,
            marketing,
            leads,
        }
    }

    /// Execute one job. Refused sends and refused calls are normal results,
    /// not errors; only infrastructure failures bubble up for redelivery.
    pub async fn run(&self, job: &Job) -> Result<()> {
        match (job.kind, &job.payload) {
            (JobKind::IaCall, JobPayload::Lead { lead_id }) => {
                self.calls.process_call(*lead_id).await?;
                Ok(())
            }
            (JobKind::Whatsapp, JobPayload::Lead { lead_id }) => {
                self.whatsapp.send_message(*lead_id).await?;
                Ok(())
            }
            (JobKind::Rcs, JobPayload::Lead { lead_id }) => {
                self.marketing.send_rcs(*lead_id).await?;
                Ok(())
            }
            (JobKind::Sms, JobPayload::Lead { lead_id }) => {
                self.marketing.send_sms(*lead_id).await?;
                Ok(())
            }
            (JobKind::Email, JobPayload::Lead { lead_id }) => {
                self.marketing.send_email(*lead_id).await?;
                Ok(())
            }
            (JobKind::LeadImport, JobPayload::Import { rows, batch_id }) => {
                self.leads
                    .import_leads(rows.clone(), batch_id.clone())
                    .await?;
                Ok(())
            }
            (JobKind::ProposalCheck, JobPayload::Sweep) => {
                self.leads.expire_proposals().await?;
                Ok(())
            }
            (kind, payload) => anyhow::bail!(
                "payload {:?} does not belong on queue {}",
                payload,
                kind.queue_name()
            ),
        }
    }
}
