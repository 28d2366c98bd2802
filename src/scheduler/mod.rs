//! Recurring engine ticks driven by cron schedules
//!
//! Three jobs keep the engine autonomous: the call dispatch tick feeds due
//! leads to the ia-call queue, the proposal sweep enqueues an expiry pass,
//! and the daily reset reopens the WhatsApp quotas. Schedules are evaluated
//! in UTC.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::calls::CallService;
use crate::queue::{JobKind, JobPayload, JobQueue};
use crate::whatsapp::WhatsAppService;

/// Cron expressions and batch sizing for the recurring jobs
#[derive(Debug, Clone)]
pub struct RecurringConfig {
    /// How often due leads are pushed onto the ia-call queue
    pub call_dispatch_cron: String,
    /// How many due leads one dispatch tick may enqueue
    pub call_dispatch_batch: usize,
    /// How often a proposal expiry sweep is enqueued
    pub proposal_sweep_cron: String,
    /// When the WhatsApp daily counters reset; 03:00 UTC is midnight
    /// in Sao Paulo
    pub daily_reset_cron: String,
}

impl Default for RecurringConfig {
    fn default() -> Self {
        Self {
            call_dispatch_cron: "0 * * * * *".to_string(),
            call_dispatch_batch: 50,
            proposal_sweep_cron: "0 0,30 * * * *".to_string(),
            daily_reset_cron: "0 0 3 * * *".to_string(),
        }
    }
}

/// Handle on the running cron scheduler
pub struct RecurringTasks {
    scheduler: JobScheduler,
}

impl RecurringTasks {
    /// Register the three recurring jobs and start the scheduler.
    pub async fn start(
        config: RecurringConfig,
        queue: JobQueue,
        calls: CallService,
        whatsapp: Arc<WhatsAppService>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .context("failed to create cron scheduler")?;

        let dispatch_queue = queue.clone();
        let batch = config.call_dispatch_batch;
        let dispatch = Job::new_async(config.call_dispatch_cron.as_str(), move |_id, _lock| {
            let calls = calls.clone();
            let queue = dispatch_queue.clone();
            Box::pin(async move {
                match calls.get_next_leads_to_call(batch).await {
                    Ok(leads) => {
                        let mut enqueued = 0;
                        for lead in &leads {
                            match queue.enqueue(
                                JobKind::IaCall,
                                JobPayload::Lead { lead_id: lead.id },
                            ) {
                                Ok(_) => enqueued += 1,
                                Err(e) => {
                                    tracing::warn!(error = %e, "call dispatch enqueue failed");
                                    break;
                                }
                            }
                        }
                        if enqueued > 0 {
                            tracing::info!(enqueued, "call dispatch tick");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "call dispatch query failed");
                    }
                }
            })
        })
        .context("failed to build call dispatch job")?;
        scheduler.add(dispatch).await.context("failed to register call dispatch job")?;

        let sweep_queue = queue.clone();
        let sweep = Job::new_async(config.proposal_sweep_cron.as_str(), move |_id, _lock| {
            let queue = sweep_queue.clone();
            Box::pin(async move {
                if let Err(e) = queue.enqueue(JobKind::ProposalCheck, JobPayload::Sweep) {
                    tracing::warn!(error = %e, "proposal sweep enqueue failed");
                }
            })
        })
        .context("failed to build proposal sweep job")?;
        scheduler.add(sweep).await.context("failed to register proposal sweep job")?;

        let reset = Job::new_async(config.daily_reset_cron.as_str(), move |_id, _lock| {
            let whatsapp = whatsapp.clone();
            Box::pin(async move {
                if let Err(e) = whatsapp.reset_daily_counters().await {
                    tracing::error!(error = %e, "daily counter reset failed");
                }
            })
        })
        .context("failed to build daily reset job")?;
        scheduler.add(reset).await.context("failed to register daily reset job")?;

        scheduler.start().await.context("failed to start cron scheduler")?;
        tracing::info!("recurring tasks started");
        Ok(Self { scheduler })
    }

    /// Stop firing new ticks; jobs already running are unaffected.
    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .context("failed to stop cron scheduler")?;
        tracing::info!("recurring tasks stopped");
        Ok(())
    }
}
