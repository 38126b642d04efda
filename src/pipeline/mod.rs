//! Scan pipeline control layer
//!
//! Separates the session lifecycle from the capture and redemption stages:
//! - `state`: the session state machine and its valid transitions
//! - `health`: counters shared by the capture loop and the session
//! - `session`: the [`ScanSession`] coordinating capture and redemption

pub mod health;
pub mod session;
pub mod state;

pub use health::{HealthSummary, ScanHealth};
pub use session::ScanSession;
pub use state::SessionState;
