//! Outbound dispatch outcome types and webhook payload kinds

use serde::{Deserialize, Serialize};

use crate::lead::Lead;

/// Why a dispatch was refused before anything was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    LeadNotFound,
    LeadBlocked,
    /// WhatsApp-only refusal: the lead sits on the complaint color
    LeadBlockedComplaint,
    NoPhone,
    NoEmail,
    /// Every pooled number is saturated; retry after failover or reset
    NoAvailableConnection,
}

impl SendFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendFailure::LeadNotFound => "lead_not_found",
            SendFailure::LeadBlocked => "lead_blocked",
            SendFailure::LeadBlockedComplaint => "lead_blocked_complaint",
            SendFailure::NoPhone => "no_phone",
            SendFailure::NoEmail => "no_email",
            SendFailure::NoAvailableConnection => "no_available_connection",
        }
    }
}

/// Result of one dispatch attempt; `lead` is present exactly when something
/// went out (refusals mutate nothing)
#[derive(Debug, Clone)]
pub struct SendReport {
    pub success: bool,
    pub failure: Option<SendFailure>,
    pub lead: Option<Lead>,
}

impl SendReport {
    pub fn sent(lead: Lead) -> Self {
        Self {
            success: true,
            failure: None,
            lead: Some(lead),
        }
    }

    pub fn refused(failure: SendFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            lead: None,
        }
    }

    /// Wire name of the refusal, if any
    pub fn reason(&self) -> Option<&'static str> {
        self.failure.map(|f| f.as_str())
    }
}

/// Engagement webhooks the engine reacts to
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    LinkClick,
    EmailOpen,
    RcsClick,
}

impl WebhookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookKind::LinkClick => "link_click",
            WebhookKind::EmailOpen => "email_open",
            WebhookKind::RcsClick => "rcs_click",
        }
    }
}
