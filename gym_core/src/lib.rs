#![forbid(unsafe_code)]

//! Core domain model and business logic for gymtrack.
//!
//! This crate provides:
//! - Domain types (workouts, exercises, sessions, sets)
//! - The ledger record set and its persistence
//! - Open-session tracking with incremental volume
//! - The rest countdown and its side channels
//! - CSV transfer and session history

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod ledger;
pub mod store;
pub mod session;
pub mod channel;
pub mod cooldown;
pub mod transfer;
pub mod history;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use ledger::Ledger;
pub use store::{JsonStore, MemoryStore, Store};
pub use session::{RecoveryPolicy, SessionManager};
pub use channel::{DisplayHandle, LogDisplay, LogNotifier, Notifier, RestDisplay};
pub use cooldown::{CooldownSettings, CooldownTimer};
pub use transfer::{export_csv, import_csv, ImportSummary};
pub use history::{session_history, SessionStatus, SessionSummary};
