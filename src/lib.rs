//! Lead engine library
//!
//! This library exports the core modules of the multi-channel lead engine:
//! the lead lifecycle and its color state machine, the AI call scheduler,
//! the WhatsApp connection pool, the one-shot outreach channels, and the
//! job queue and cron plumbing that keep the engine running on its own.

pub mod calls;
pub mod config;
pub mod costs;
pub mod error;
pub mod lead;
pub mod marketing;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod templates;
pub mod whatsapp;
