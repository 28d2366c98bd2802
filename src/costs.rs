//! Fixed unit costs for outreach channels.
//!
//! Every outbound action charges the owning lead a flat per-use amount in
//! BRL. The values are business constants, not tunables.

use serde::{Deserialize, Serialize};

/// Cost of a single AI voice call attempt, answered or not
pub const IA_CALL_COST: f64 = 0.35;

/// Cost of one WhatsApp message
pub const WHATSAPP_COST: f64 = 0.08;

/// Cost of one RCS message
pub const RCS_COST: f64 = 0.12;

/// Cost of one SMS message
pub const SMS_COST: f64 = 0.06;

/// Cost of one e-mail
pub const EMAIL_COST: f64 = 0.02;

/// Cost of minting a fresh tracking link
pub const LINK_GENERATION_COST: f64 = 0.01;

/// Billable outreach channels
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    IaCall,
    Whatsapp,
    Rcs,
    Sms,
    Email,
    LinkGeneration,
}

impl Channel {
    /// Flat cost charged per use of this channel
    pub fn unit_cost(&self) -> f64 {
        match self {
            Channel::IaCall => IA_CALL_COST,
            Channel::Whatsapp => WHATSAPP_COST,
            Channel::Rcs => RCS_COST,
            Channel::Sms => SMS_COST,
            Channel::Email => EMAIL_COST,
            Channel::LinkGeneration => LINK_GENERATION_COST,
        }
    }

    /// Wire name used in interaction logs and summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::IaCall => "ia_call",
            Channel::Whatsapp => "whatsapp",
            Channel::Rcs => "rcs",
            Channel::Sms => "sms",
            Channel::Email => "email",
            Channel::LinkGeneration => "link_generation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_costs() {
        assert_eq!(Channel::IaCall.unit_cost(), 0.35);
        assert_eq!(Channel::Whatsapp.unit_cost(), 0.08);
        assert_eq!(Channel::Rcs.unit_cost(), 0.12);
        assert_eq!(Channel::Sms.unit_cost(), 0.06);
        assert_eq!(Channel::Email.unit_cost(), 0.02);
        assert_eq!(Channel::LinkGeneration.unit_cost(), 0.01);
    }

    #[test]
    fn test_call_is_most_expensive_channel() {
        let channels = [
            Channel::Whatsapp,
            Channel::Rcs,
            Channel::Sms,
            Channel::Email,
            Channel::LinkGeneration,
        ];
        for channel in channels {
            assert!(
                channel.unit_cost() < Channel::IaCall.unit_cost(),
                "{} should cost less than a call",
                channel.as_str()
            );
        }
    }
}
