//! In-process job queue with per-queue concurrency bulkheads
//!
//! Each queue kind gets its own channel and its own semaphore, so a burst of
//! slow call jobs cannot starve the import or sweep queues. Failed jobs are
//! redelivered in place when the error is transient.

mod runner;

pub use runner::JobRunner;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error;
use crate::lead::ImportRow;

/// The queues the engine runs, one consumer loop each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    IaCall,
    Whatsapp,
    Rcs,
    Sms,
    Email,
    LeadImport,
    ProposalCheck,
}

impl JobKind {
    pub const ALL: [JobKind; 7] = [
        JobKind::IaCall,
        JobKind::Whatsapp,
        JobKind::Rcs,
        JobKind::Sms,
        JobKind::Email,
        JobKind::LeadImport,
        JobKind::ProposalCheck,
    ];

    /// Wire name of the queue
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::IaCall => "ia-call",
            JobKind::Whatsapp => "whatsapp",
            JobKind::Rcs => "rcs",
            JobKind::Sms => "sms",
            JobKind::Email => "email",
            JobKind::LeadImport => "lead-import",
            JobKind::ProposalCheck => "proposal-check",
        }
    }

    /// How many jobs of this kind may run at once
    pub fn default_concurrency(&self) -> usize {
        match self {
            JobKind::IaCall => 5,
            JobKind::Whatsapp => 3,
            JobKind::Rcs => 5,
            JobKind::Sms => 5,
            JobKind::Email => 5,
            JobKind::LeadImport => 2,
            JobKind::ProposalCheck => 1,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// What a job carries; each queue accepts one shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Channel and call queues address a single lead
    Lead { lead_id: Uuid },
    /// Import queue carries the parsed rows
    Import {
        rows: Vec<ImportRow>,
        batch_id: Option<String>,
    },
    /// Sweep queues carry no arguments
    Sweep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
}

/// Redelivery policy for transient failures
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Total deliveries per job, first attempt included
    pub max_deliveries: u32,
    pub redelivery_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_deliveries: 3,
            redelivery_delay: Duration::from_secs(5),
        }
    }
}

/// Producer handle; clone freely. Dropping every clone closes the queues
/// and lets the consumer loops drain and exit.
#[derive(Clone)]
pub struct JobQueue {
    senders: HashMap<JobKind, UnboundedSender<Job>>,
}

impl JobQueue {
    pub fn enqueue(&self, kind: JobKind, payload: JobPayload) -> anyhow::Result<Uuid> {
        let job = Job {
            id: Uuid::new_v4(),
            kind,
            payload,
            enqueued_at: Utc::now(),
        };
        let id = job.id;
        let sender = self
            .senders
            .get(&kind)
            .ok_or_else(|| anyhow::anyhow!("no queue registered for {}", kind.queue_name()))?;
        sender
            .send(job)
            .map_err(|_| anyhow::anyhow!("queue {} is closed", kind.queue_name()))?;
        tracing::debug!(job_id = %id, queue = kind.queue_name(), "job enqueued");
        Ok(id)
    }
}

/// Join handles for the consumer loops
pub struct QueueWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl QueueWorkers {
    /// Wait for every consumer loop to drain and finish.
    ///
    /// Returns once all `JobQueue` clones are dropped and in-flight jobs
    /// have completed.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "queue worker panicked");
            }
        }
    }
}

/// Wire up one channel and one consumer loop per queue kind.
pub fn start(runner: Arc<JobRunner>, config: QueueConfig) -> (JobQueue, QueueWorkers) {
    let mut senders = HashMap::new();
    let mut handles = Vec::new();

    for kind in JobKind::ALL {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(kind, tx);
        handles.push(tokio::spawn(consume(kind, rx, runner.clone(), config.clone())));
    }

    tracing::info!(queues = JobKind::ALL.len(), "job queues started");
    (JobQueue { senders }, QueueWorkers { handles })
}

/// Consumer loop for one queue: pull jobs, run each under the bulkhead.
async fn consume(
    kind: JobKind,
    mut rx: UnboundedReceiver<Job>,
    runner: Arc<JobRunner>,
    config: QueueConfig,
) {
    let limit = kind.default_concurrency();
    let bulkhead = Arc::new(Semaphore::new(limit));

    while let Some(job) = rx.recv().await {
        let permit = match bulkhead.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let runner = runner.clone();
        let config = config.clone();
        tokio::spawn(async move {
            deliver(runner, job, config).await;
            drop(permit);
        });
    }

    // Channel closed; wait for in-flight jobs before reporting the queue done
    let _ = bulkhead.acquire_many(limit as u32).await;
    tracing::debug!(queue = kind.queue_name(), "queue drained");
}

/// Run one job, redelivering in place while the failure looks transient.
async fn deliver(runner: Arc<JobRunner>, job: Job, config: QueueConfig) {
    let mut delivery = 1;
    loop {
        match runner.run(&job).await {
            Ok(()) => return,
            Err(err) if delivery < config.max_deliveries && error::is_retryable(&err) => {
                tracing::warn!(
                    job_id = %job.id,
                    queue = job.kind.queue_name(),
                    delivery,
                    error = %err,
                    "job failed, redelivering"
                );
                tokio::time::sleep(config.redelivery_delay).await;
                delivery += 1;
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.id,
                    queue = job.kind.queue_name(),
                    delivery,
                    error = %err,
                    "job failed for good"
                );
                return;
            }
        }
    }
}

// ===== Tests =====
