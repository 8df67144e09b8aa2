#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("assignment '{0}' not found")]
    AssignmentNotFound(String),

    #[error("driver '{0}' not found")]
    DriverNotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transition not applicable: {0}")]
    TransitionNotApplicable(String),

    #[error("address enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },
}
