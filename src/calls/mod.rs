//! Call scheduling domain module
//!
//! Contains the dialing port, the simulated dialer and the call service.

mod dialer;
mod service;

pub use dialer::{DialResult, Dialer, SimulatedDialer};
pub use service::{CallReport, CallService, CallStatus};
