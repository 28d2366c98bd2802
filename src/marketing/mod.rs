//! Marketing domain module
//!
//! Contains the RCS/SMS/e-mail dispatchers, webhook reactions and the shared
//! dispatch outcome types.

mod model;
mod service;

pub use model::{SendFailure, SendReport, WebhookKind};
pub use service::MarketingService;
