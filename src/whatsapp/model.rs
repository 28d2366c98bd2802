//! WhatsApp connection pool models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health of a pooled WhatsApp number
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Inactive,
    Banned,
    Cooldown,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Inactive => "inactive",
            ConnectionStatus::Banned => "banned",
            ConnectionStatus::Cooldown => "cooldown",
        }
    }
}

/// One sending number in the WhatsApp pool.
///
/// Daily quota accounting lives on the document; the store enforces the
/// increment-if-below-limit rule so two workers can never oversubscribe a
/// number.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Connection {
    pub id: Uuid,
    /// Stable 1-based index of this number in the pool
    pub connection_number: u32,
    pub phone: String,
    pub status: ConnectionStatus,
    pub daily_messages_sent: u32,
    pub daily_limit: u32,
    /// Lifetime counter, survives daily resets
    pub total_messages_sent: u64,
    /// Leads currently routed through this number (set semantics)
    pub assigned_leads: Vec<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_reset_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every update
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Provision connection number `number` with a deterministic pool phone
    pub fn new(number: u32, daily_limit: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connection_number: number,
            phone: format!("+5511900000{:03}", number),
            status: ConnectionStatus::Active,
            daily_messages_sent: 0,
            daily_limit,
            total_messages_sent: 0,
            assigned_leads: Vec::new(),
            last_message_at: None,
            last_reset_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this number may take one more message today
    pub fn can_send(&self) -> bool {
        self.status == ConnectionStatus::Active && self.daily_messages_sent < self.daily_limit
    }
}
