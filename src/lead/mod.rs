//! Lead domain module
//!
//! Contains the lead document model, the color state machine and the lead
//! lifecycle service.

mod model;
mod service;
mod transitions;

pub use model::*;
pub use service::{CostSummary, ImportSummary, LeadService};
pub use transitions::{apply_transition, BlockEffect, ColorChange, DEFAULT_COMPLAINT_REASON};
