//! Color state machine for leads.
//!
//! Every color change in the engine funnels through [`apply_transition`] so
//! the blocking rules and the audit trail stay in one place. Transitions are
//! deliberately permissive: any color may move to any other, including back
//! to itself.

use chrono::Utc;

use crate::lead::model::{Interaction, InteractionKind, Lead, LeadColor};

/// Reason recorded when a complaint arrives without one
pub const DEFAULT_COMPLAINT_REASON: &str = "complaint registered";

/// Effect a transition has on the blocked flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEffect {
    /// Entering Complaint blocks the lead with the given reason
    Block(String),
    /// Entering Paid lifts any block
    Unblock,
    /// Every other target leaves the flag alone
    Keep,
}

/// A computed color change, ready to be applied to a lead
#[derive(Debug, Clone)]
pub struct ColorChange {
    pub from: LeadColor,
    pub to: LeadColor,
    pub block: BlockEffect,
    /// Audit message in the form "old -> new" or "old -> new (reason)"
    pub message: String,
}

/// Compute the full effect of moving a lead from `current` to `target`
pub fn apply_transition(
    current: LeadColor,
    target: LeadColor,
    reason: Option<&str>,
) -> ColorChange {
    let block = match target {
        LeadColor::Complaint => {
            BlockEffect::Block(reason.unwrap_or(DEFAULT_COMPLAINT_REASON).to_string())
        }
        LeadColor::Paid => BlockEffect::Unblock,
        _ => BlockEffect::Keep,
    };

    let message = match reason {
        Some(r) => format!("{} -> {} ({})", current, target, r),
        None => format!("{} -> {}", current, target),
    };

    ColorChange {
        from: current,
        to: target,
        block,
        message,
    }
}

impl ColorChange {
    /// Write the change into a lead: color, block flags and the audit entry
    pub fn apply_to(self, lead: &mut Lead) {
        lead.previous_color = Some(self.from);
        lead.color = self.to;

        match self.block {
            BlockEffect::Block(reason) => {
                lead.blocked = true;
                lead.block_reason = Some(reason);
            }
            BlockEffect::Unblock => {
                lead.blocked = false;
                lead.block_reason = None;
            }
            BlockEffect::Keep => {}
        }

        lead.interactions
            .push(Interaction::now(InteractionKind::StatusChange, self.message, 0.0));
        lead.updated_at = Utc::now();
    }
}
