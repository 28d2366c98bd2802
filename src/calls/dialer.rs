//! Dialing capability port.
//!
//! The engine only ever sees a [`DialResult`]; what actually places the call
//! sits behind the [`Dialer`] trait so tests can inject fixed outcomes.

use async_trait::async_trait;
use rand::Rng;

use crate::lead::CallOutcome;

/// What came back from one dial
#[derive(Debug, Clone, Copy)]
pub struct DialResult {
    pub outcome: CallOutcome,
    /// Talk time in seconds; 0 unless answered
    pub duration_secs: u32,
}

/// Port for placing a single call
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn attempt_call(&self, phone: &str) -> DialResult;
}

/// Random-outcome dialer used until a telephony provider is wired in.
///
/// Outcomes skew toward no-answer, which is what production dialing looks
/// like; answered calls draw a talk time between 30 and 330 seconds.
pub struct SimulatedDialer;

#[async_trait]
impl Dialer for SimulatedDialer {
    async fn attempt_call(&self, phone: &str) -> DialResult {
        // TODO: integrate the real telephony provider
        const OUTCOMES: [CallOutcome; 6] = [
            CallOutcome::Answered,
            CallOutcome::NoAnswer,
            CallOutcome::NoAnswer,
            CallOutcome::Busy,
            CallOutcome::Voicemail,
            CallOutcome::Invalid,
        ];

        let outcome = OUTCOMES[rand::thread_rng().gen_range(0..OUTCOMES.len())];
        let duration_secs = if outcome == CallOutcome::Answered {
            rand::thread_rng().gen_range(30..=330)
        } else {
            0
        };

        tracing::debug!(phone = %phone, outcome = outcome.as_str(), "simulated dial");
        DialResult {
            outcome,
            duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_durations_stay_in_range() {
        let dialer = SimulatedDialer;
        for _ in 0..100 {
            let result = dialer.attempt_call("+5511999990000").await;
            match result.outcome {
                CallOutcome::Answered => {
                    assert!((30..=330).contains(&result.duration_secs));
                }
                _ => assert_eq!(result.duration_secs, 0),
            }
        }
    }
}
