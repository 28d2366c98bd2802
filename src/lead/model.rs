//! Lead document model and embedded record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Hard ceiling on call attempts per lead, never raised
pub const MAX_CALL_ATTEMPTS: u32 = 6;

/// Funnel color of a lead
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeadColor {
    /// Deal settled, lead leaves the funnel
    Paid,
    /// Proposal sent, awaiting payment
    Pending,
    /// Lead reacted to at least one touch
    Engaged,
    /// Lead complained, all outreach stops
    Complaint,
    /// Imported but never reached
    NoContact,
    /// Proposal lapsed without payment
    Expired,
}

impl LeadColor {
    /// Wire name used in documents and queries
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadColor::Paid => "paid",
            LeadColor::Pending => "pending",
            LeadColor::Engaged => "engaged",
            LeadColor::Complaint => "complaint",
            LeadColor::NoContact => "no_contact",
            LeadColor::Expired => "expired",
        }
    }

    /// Parse a wire name back into a color
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(LeadColor::Paid),
            "pending" => Some(LeadColor::Pending),
            "engaged" => Some(LeadColor::Engaged),
            "complaint" => Some(LeadColor::Complaint),
            "no_contact" => Some(LeadColor::NoContact),
            "expired" => Some(LeadColor::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeadColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calling list a lead belongs to; A is worked before B
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LeadList {
    A,
    B,
}

impl std::fmt::Display for LeadList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadList::A => f.write_str("A"),
            LeadList::B => f.write_str("B"),
        }
    }
}

/// Lifecycle of a payment proposal attached to a lead
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Expired,
}

/// Result of a single dial
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Answered,
    NoAnswer,
    Busy,
    Voicemail,
    Invalid,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Answered => "answered",
            CallOutcome::NoAnswer => "no_answer",
            CallOutcome::Busy => "busy",
            CallOutcome::Voicemail => "voicemail",
            CallOutcome::Invalid => "invalid",
        }
    }
}

/// Time-of-day label recorded with each call attempt.
///
/// The label is descriptive only; it never gates whether a call is placed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallWindow {
    Morning,
    Afternoon,
    Evening,
}

impl CallWindow {
    /// Window for a local hour: 8-11 morning, 12-18 afternoon, else evening
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            8..=11 => CallWindow::Morning,
            12..=18 => CallWindow::Afternoon,
            _ => CallWindow::Evening,
        }
    }
}

/// Kind of an audit-log entry
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Call,
    Whatsapp,
    Rcs,
    Sms,
    Email,
    StatusChange,
    Note,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Call => "call",
            InteractionKind::Whatsapp => "whatsapp",
            InteractionKind::Rcs => "rcs",
            InteractionKind::Sms => "sms",
            InteractionKind::Email => "email",
            InteractionKind::StatusChange => "status_change",
            InteractionKind::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "call" => Some(InteractionKind::Call),
            "whatsapp" => Some(InteractionKind::Whatsapp),
            "rcs" => Some(InteractionKind::Rcs),
            "sms" => Some(InteractionKind::Sms),
            "email" => Some(InteractionKind::Email),
            "status_change" => Some(InteractionKind::StatusChange),
            "note" => Some(InteractionKind::Note),
            _ => None,
        }
    }
}

/// One entry in the append-only audit log of a lead
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub message: String,
    /// Amount charged for this action; 0.0 for free events
    #[serde(default)]
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<serde_json::Value>,
}

impl Interaction {
    /// Build an entry stamped with the current time
    pub fn now(kind: InteractionKind, message: impl Into<String>, cost: f64) -> Self {
        Self {
            kind,
            message: message.into(),
            cost,
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One dial recorded against a lead
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CallAttempt {
    /// 1-based position in the lead's attempt history
    pub attempt_number: u32,
    pub phone: String,
    pub timestamp: DateTime<Utc>,
    /// Simulated talk time; 0 unless the call was answered
    pub duration_secs: u32,
    pub outcome: CallOutcome,
    pub window: CallWindow,
    /// When the next dial was scheduled, if one was
    pub scheduled_recall: Option<DateTime<Utc>>,
}

/// A lead document, the aggregate everything in the engine revolves around
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    /// Brazilian tax id, unique across the store
    pub cpf: String,
    pub phones: Vec<String>,
    /// Phones that came back invalid from the dialer; never dialed again
    pub invalid_phones: Vec<String>,
    pub email: String,

    pub color: LeadColor,
    pub previous_color: Option<LeadColor>,
    pub list: LeadList,
    pub blocked: bool,
    pub block_reason: Option<String>,

    pub proposal_value: Option<f64>,
    pub proposal_status: Option<ProposalStatus>,
    pub proposal_expires_at: Option<DateTime<Utc>>,

    pub whatsapp_connection_id: Option<Uuid>,
    pub whatsapp_last_sent_at: Option<DateTime<Utc>>,
    pub whatsapp_link_id: Option<String>,
    pub whatsapp_link_generated_at: Option<DateTime<Utc>>,

    pub call_attempts: Vec<CallAttempt>,
    pub total_call_attempts: u32,
    pub last_call_at: Option<DateTime<Utc>>,
    pub next_call_at: Option<DateTime<Utc>>,

    pub rcs_sent: bool,
    pub rcs_clicked_at: Option<DateTime<Utc>>,
    pub sms_sent: bool,
    pub email_sent: bool,
    pub email_opened_at: Option<DateTime<Utc>>,
    pub link_clicked: bool,
    pub link_clicked_at: Option<DateTime<Utc>>,
    pub interacted: bool,
    pub interacted_at: Option<DateTime<Utc>>,

    /// Running total of every charge against this lead, only ever grows
    pub total_cost: f64,
    pub observations: Vec<String>,
    pub interactions: Vec<Interaction>,
    pub import_batch_id: Option<String>,

    /// Optimistic concurrency token, bumped by the store on every update
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Build a fresh lead from an import row; new leads always start NoContact
    pub fn from_import(row: &ImportRow, batch_id: Option<&str>) -> Self {
        let now = Utc::now();
        let batch_label = batch_id.unwrap_or("manual");
        Self {
            id: Uuid::new_v4(),
            name: row.name.trim().to_string(),
            cpf: row.cpf.trim().to_string(),
            phones: row.phones.clone(),
            invalid_phones: Vec::new(),
            email: row.email.trim().to_string(),
            color: LeadColor::NoContact,
            previous_color: None,
            list: row.list.unwrap_or(LeadList::B),
            blocked: false,
            block_reason: None,
            proposal_value: None,
            proposal_status: None,
            proposal_expires_at: None,
            whatsapp_connection_id: None,
            whatsapp_last_sent_at: None,
            whatsapp_link_id: None,
            whatsapp_link_generated_at: None,
            call_attempts: Vec::new(),
            total_call_attempts: 0,
            last_call_at: None,
            next_call_at: None,
            rcs_sent: false,
            rcs_clicked_at: None,
            sms_sent: false,
            email_sent: false,
            email_opened_at: None,
            link_clicked: false,
            link_clicked_at: None,
            interacted: false,
            interacted_at: None,
            total_cost: 0.0,
            observations: Vec::new(),
            interactions: vec![Interaction::now(
                InteractionKind::Note,
                format!("lead imported (batch {})", batch_label),
                0.0,
            )],
            import_batch_id: batch_id.map(|b| b.to_string()),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// First phone that has not been flagged invalid
    pub fn first_valid_phone(&self) -> Option<&str> {
        self.phones
            .iter()
            .find(|p| !self.invalid_phones.contains(p))
            .map(|p| p.as_str())
    }

    /// Charge a channel cost and append the matching audit entry
    pub fn charge(&mut self, interaction: Interaction) {
        self.total_cost += interaction.cost;
        self.interactions.push(interaction);
    }
}

/// One row of a lead import batch, already parsed out of the upload
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct ImportRow {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 11, max = 14, message = "cpf must have 11 to 14 characters"))]
    pub cpf: String,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub list: Option<LeadList>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> ImportRow {
        ImportRow {
            name: "Maria Souza".to_string(),
            cpf: "12345678901".to_string(),
            phones: vec!["+5511987654321".to_string()],
            email: "maria@example.com".to_string(),
            list: None,
        }
    }

    #[test]
    fn test_call_window_from_hour() {
        assert_eq!(CallWindow::from_hour(8), CallWindow::Morning);
        assert_eq!(CallWindow::from_hour(11), CallWindow::Morning);
        assert_eq!(CallWindow::from_hour(12), CallWindow::Afternoon);
        assert_eq!(CallWindow::from_hour(18), CallWindow::Afternoon);
        assert_eq!(CallWindow::from_hour(19), CallWindow::Evening);
        assert_eq!(CallWindow::from_hour(7), CallWindow::Evening);
        assert_eq!(CallWindow::from_hour(0), CallWindow::Evening);
    }

    #[test]
    fn test_import_defaults() {
        let lead = Lead::from_import(&sample_row(), Some("batch-7"));
        assert_eq!(lead.color, LeadColor::NoContact);
        assert_eq!(lead.list, LeadList::B);
        assert!(!lead.blocked);
        assert_eq!(lead.total_call_attempts, 0);
        assert_eq!(lead.version, 0);
        assert_eq!(lead.import_batch_id.as_deref(), Some("batch-7"));
        assert_eq!(lead.interactions.len(), 1);
        assert!(lead.interactions[0].message.contains("batch-7"));
    }

    #[test]
    fn test_import_row_validation() {
        let mut row = sample_row();
        assert!(row.validate().is_ok());

        row.cpf = "123".to_string();
        assert!(row.validate().is_err(), "short cpf must be rejected");

        row.cpf = "12345678901".to_string();
        row.name = String::new();
        assert!(row.validate().is_err(), "empty name must be rejected");
    }

    #[test]
    fn test_first_valid_phone_skips_invalid() {
        let mut lead = Lead::from_import(&sample_row(), None);
        lead.phones = vec!["+551100000001".to_string(), "+551100000002".to_string()];
        assert_eq!(lead.first_valid_phone(), Some("+551100000001"));

        lead.invalid_phones.push("+551100000001".to_string());
        assert_eq!(lead.first_valid_phone(), Some("+551100000002"));

        lead.invalid_phones.push("+551100000002".to_string());
        assert_eq!(lead.first_valid_phone(), None);
    }

    #[test]
    fn test_charge_accumulates_cost_and_log() {
        let mut lead = Lead::from_import(&sample_row(), None);
        lead.charge(Interaction::now(InteractionKind::Sms, "sms sent", 0.06));
        lead.charge(Interaction::now(InteractionKind::Email, "email sent", 0.02));
        assert!((lead.total_cost - 0.08).abs() < 1e-9);
        assert_eq!(lead.interactions.len(), 3); // import entry + two sends
    }

    #[test]
    fn test_color_wire_names_round_trip() {
        let colors = [
            LeadColor::Paid,
            LeadColor::Pending,
            LeadColor::Engaged,
            LeadColor::Complaint,
            LeadColor::NoContact,
            LeadColor::Expired,
        ];
        for color in colors {
            assert_eq!(LeadColor::parse(color.as_str()), Some(color));
        }
        assert_eq!(LeadColor::parse("magenta"), None);
    }
}
