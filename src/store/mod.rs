//! Record store ports and adapters.
//!
//! The engine never talks to a database directly; services hold `Arc<dyn ...>`
//! handles to these traits. Two adapters ship with the crate: an in-memory
//! store used by tests and the standalone host, and a PostgreSQL store for
//! deployments.
//!
//! Updates are optimistic: every document carries a version token and
//! [`LeadStore::update`] / connection updates only apply when the caller read
//! the latest version. A lost race surfaces as
//! [`StoreError::VersionConflict`](crate::error::StoreError) and is retried at
//! the job level, never inside a service.

mod memory;
mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::lead::{InteractionKind, Lead, LeadColor};
use crate::templates::{MessageTemplate, TemplateChannel};
use crate::whatsapp::Connection;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence port for lead documents
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a new lead; fails with `Duplicate` when the cpf already exists
    async fn insert(&self, lead: &Lead) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Lead>>;

    async fn find_by_cpf(&self, cpf: &str) -> StoreResult<Option<Lead>>;

    /// Version-checked write of the whole document.
    ///
    /// Returns the stored copy with its bumped version; the caller's copy is
    /// stale afterwards.
    async fn update(&self, lead: &Lead) -> StoreResult<Lead>;

    /// Leads eligible for a call right now, in dialing order.
    ///
    /// Filter: not blocked, color outside {paid, complaint, expired}, fewer
    /// than the maximum attempts, and either due (`next_call_at <= now`) or
    /// never scheduled with zero attempts. Order: list A before B, earliest
    /// `next_call_at` first with unscheduled leads ahead of everything, then
    /// oldest `created_at`.
    async fn find_due_for_call(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Lead>>;

    /// Leads whose pending proposal has lapsed and that are not yet expired
    async fn find_expired_proposals(&self, now: DateTime<Utc>) -> StoreResult<Vec<Lead>>;

    async fn count_by_color(&self) -> StoreResult<HashMap<LeadColor, i64>>;

    /// Total charged cost grouped by interaction kind, free entries excluded
    async fn cost_by_kind(&self) -> StoreResult<HashMap<InteractionKind, f64>>;

    async fn count(&self) -> StoreResult<i64>;
}

/// Persistence port for the WhatsApp connection pool
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn insert(&self, connection: &Connection) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Connection>>;

    async fn count(&self) -> StoreResult<i64>;

    /// Active connection with remaining quota carrying the fewest sends today;
    /// ties broken by the lower pool number. `None` when the pool is drained.
    async fn pick_least_loaded(&self) -> StoreResult<Option<Connection>>;

    /// Atomically reserve one send: increment the daily counter only while the
    /// connection is active and below its limit. `None` means the quota race
    /// was lost and the caller should fail over.
    async fn record_send(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Connection>>;

    /// Add a lead to the connection's assignment set; idempotent
    async fn assign_lead(&self, id: Uuid, lead_id: Uuid) -> StoreResult<()>;

    /// Zero every daily counter and stamp the reset time; returns how many
    /// connections were touched
    async fn reset_daily_counters(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Persistence port for message templates
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert(&self, template: &MessageTemplate) -> StoreResult<()>;

    async fn active_for_channel(
        &self,
        channel: TemplateChannel,
    ) -> StoreResult<Vec<MessageTemplate>>;

    async fn count(&self) -> StoreResult<i64>;
}

/// The three store handles the services are wired with
#[derive(Clone)]
pub struct Stores {
    pub leads: Arc<dyn LeadStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub templates: Arc<dyn TemplateStore>,
}

impl Stores {
    /// In-memory stores; state lives for the lifetime of the process
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            leads: store.clone(),
            connections: store.clone(),
            templates: store,
        }
    }

    /// PostgreSQL-backed stores; creates the schema when missing
    pub async fn postgres(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let store = Arc::new(PgStore::connect(database_url, max_connections).await?);
        store.ensure_schema().await?;
        Ok(Self {
            leads: store.clone(),
            connections: store.clone(),
            templates: store,
        })
    }
}
