//! WhatsApp connection pool and channel dispatch

mod model;
mod service;

pub use model::{Connection, ConnectionStatus};
pub use service::{
    WhatsAppService, DEFAULT_DAILY_LIMIT, DEFAULT_POOL_SIZE, LINK_MAX_AGE_DAYS,
};
