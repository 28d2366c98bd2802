//! Call scheduling service - eligibility, dialing and recall back-off

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, Timelike, Utc};
use uuid::Uuid;

use crate::calls::dialer::Dialer;
use crate::costs::Channel;
use crate::lead::{
    apply_transition, CallAttempt, CallOutcome, CallWindow, Interaction, InteractionKind, Lead,
    LeadColor, MAX_CALL_ATTEMPTS,
};
use crate::store::{LeadStore, TemplateStore};
use crate::templates::{pick_random, TemplateChannel};

/// Terminal status of one `process_call` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Answered,
    NoAnswer,
    Busy,
    Voicemail,
    Invalid,
    /// No lead under that id; nothing was dialed
    NotFound,
    /// Lead is blocked; nothing was dialed
    Blocked,
    /// Attempt ceiling reached; nothing was dialed
    MaxAttemptsReached,
    /// Every phone on file is flagged invalid; nothing was dialed
    NoValidPhones,
}

impl CallStatus {
    fn from_outcome(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Answered => CallStatus::Answered,
            CallOutcome::NoAnswer => CallStatus::NoAnswer,
            CallOutcome::Busy => CallStatus::Busy,
            CallOutcome::Voicemail => CallStatus::Voicemail,
            CallOutcome::Invalid => CallStatus::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Answered => "answered",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Busy => "busy",
            CallStatus::Voicemail => "voicemail",
            CallStatus::Invalid => "invalid",
            CallStatus::NotFound => "not_found",
            CallStatus::Blocked => "blocked",
            CallStatus::MaxAttemptsReached => "max_attempts_reached",
            CallStatus::NoValidPhones => "no_valid_phones",
        }
    }
}

/// Result of `process_call`; `lead` is present exactly when a dial happened
#[derive(Debug, Clone)]
pub struct CallReport {
    pub success: bool,
    pub status: CallStatus,
    pub lead: Option<Lead>,
}

impl CallReport {
    fn refused(status: CallStatus) -> Self {
        Self {
            success: false,
            status,
            lead: None,
        }
    }
}

/// Service that works the calling lists
#[derive(Clone)]
pub struct CallService {
    leads: Arc<dyn LeadStore>,
    templates: Arc<dyn TemplateStore>,
    dialer: Arc<dyn Dialer>,
}

impl CallService {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        templates: Arc<dyn TemplateStore>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            leads,
            templates,
            dialer,
        }
    }

    /// Next leads to dial, in order; feeds the ia-call queue
    pub async fn get_next_leads_to_call(&self, limit: usize) -> Result<Vec<Lead>> {
        let due = self.leads.find_due_for_call(Utc::now(), limit).await?;
        Ok(due)
    }

    /// Place one call against a lead and record everything that follows.
    ///
    /// Precondition refusals (`NotFound`, `Blocked`, `MaxAttemptsReached`,
    /// `NoValidPhones`) mutate nothing. A placed call always appends one
    /// attempt, charges one call cost and reschedules or clears the recall.
    pub async fn process_call(&self, lead_id: Uuid) -> Result<CallReport> {
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(CallReport::refused(CallStatus::NotFound));
        };
        if lead.blocked {
            return Ok(CallReport::refused(CallStatus::Blocked));
        }
        if lead.total_call_attempts >= MAX_CALL_ATTEMPTS {
            return Ok(CallReport::refused(CallStatus::MaxAttemptsReached));
        }
        let Some(phone) = lead.first_valid_phone().map(str::to_string) else {
            return Ok(CallReport::refused(CallStatus::NoValidPhones));
        };

        let dial = self.dialer.attempt_call(&phone).await;
        let now = Utc::now();
        let window = CallWindow::from_hour(Local::now().hour());
        let attempt_number = lead.total_call_attempts + 1;

        let mut scheduled_recall = None;
        if dial.outcome == CallOutcome::Answered {
            lead.next_call_at = None;
        } else {
            if dial.outcome == CallOutcome::Invalid && !lead.invalid_phones.contains(&phone) {
                lead.invalid_phones.push(phone.clone());
            }
            if attempt_number < MAX_CALL_ATTEMPTS {
                let recall_at = now + Self::recall_delay(attempt_number);
                lead.next_call_at = Some(recall_at);
                scheduled_recall = Some(recall_at);
            }
        }

        lead.call_attempts.push(CallAttempt {
            attempt_number,
            phone: phone.clone(),
            timestamp: now,
            duration_secs: dial.duration_secs,
            outcome: dial.outcome,
            window,
            scheduled_recall,
        });
        lead.total_call_attempts = attempt_number;
        lead.last_call_at = Some(now);

        let scripts = self.templates.active_for_channel(TemplateChannel::Voice).await?;
        let message = match pick_random(&scripts) {
            Some(script) => format!(
                "call attempt {} on {}: {} (script {})",
                attempt_number,
                phone,
                dial.outcome.as_str(),
                script.name
            ),
            None => format!(
                "call attempt {} on {}: {}",
                attempt_number,
                phone,
                dial.outcome.as_str()
            ),
        };
        lead.charge(Interaction::now(
            InteractionKind::Call,
            message,
            Channel::IaCall.unit_cost(),
        ));

        // Answered first contact pulls the lead out of NoContact
        if dial.outcome == CallOutcome::Answered && lead.color == LeadColor::NoContact {
            apply_transition(lead.color, LeadColor::Engaged, Some("answered call"))
                .apply_to(&mut lead);
            lead.interacted = true;
            lead.interacted_at = Some(now);
        }

        let stored = self
            .leads
            .update(&lead)
            .await
            .context("failed to persist call attempt")?;

        tracing::info!(
            lead_id = %lead_id,
            attempt = attempt_number,
            outcome = dial.outcome.as_str(),
            duration_secs = dial.duration_secs,
            "call processed"
        );

        Ok(CallReport {
            success: dial.outcome == CallOutcome::Answered,
            status: CallStatus::from_outcome(dial.outcome),
            lead: Some(stored),
        })
    }

    /// Back-off before the next dial: 5 minutes after the first attempt,
    /// 10 after the second, 20 from the third on
    fn recall_delay(attempt_number: u32) -> Duration {
        match attempt_number {
            1 => Duration::minutes(5),
            2 => Duration::minutes(10),
            _ => Duration::minutes(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_delay_ladder() {
        assert_eq!(CallService::recall_delay(1), Duration::minutes(5));
        assert_eq!(CallService::recall_delay(2), Duration::minutes(10));
        assert_eq!(CallService::recall_delay(3), Duration::minutes(20));
        assert_eq!(CallService::recall_delay(5), Duration::minutes(20));
    }

    #[test]
    fn test_status_from_outcome_wire_names() {
        assert_eq!(CallStatus::from_outcome(CallOutcome::Answered).as_str(), "answered");
        assert_eq!(CallStatus::from_outcome(CallOutcome::Busy).as_str(), "busy");
        assert_eq!(CallStatus::MaxAttemptsReached.as_str(), "max_attempts_reached");
    }
}
