//! Core types, configuration and errors shared by the tactical layer

pub mod config;
pub mod error;
pub mod types;

pub use config::TacticalConfig;
pub use error::{Result, TacticalError};
pub use types::{MatchId, OrderId, Side, SubmissionId, Tick, UnitId};
