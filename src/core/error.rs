use thiserror::Error;

use crate::core::types::Tick;

/// Fatal and API-level failures.
///
/// Gameplay anomalies (bad orders, blocked paths) never surface here; they
/// travel through dispatch outcomes and radio events instead.
#[derive(Error, Debug)]
pub enum TacticalError {
    #[error("Corrupted terrain reference: {0}")]
    CorruptTerrain(String),

    #[error("Tick counter regressed from {previous} to {current}")]
    TickRegression { previous: Tick, current: Tick },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid match setup: {0}")]
    InvalidSetup(String),

    #[error("Match is over")]
    MatchOver,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TacticalError>;
