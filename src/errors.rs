use std::fmt;
use thiserror::Error;

/// A card record that failed a storage constraint. Carries the identifying
/// fields of the offending record so an import loop can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub reason: String,
    pub owner: String,
    pub title: String,
    pub uuid: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (owner={:?}, title={:?}, uuid={:?})",
            self.reason, self.owner, self.title, self.uuid
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION_FAILED: {0}")]
    Validation(ValidationError),
    #[error("INSUFFICIENT_DATA: no completed velocity samples for owner '{owner}'")]
    InsufficientData { owner: String },
    #[error("UNBOUNDED_FORECAST: owner '{owner}' produced a completion date outside the calendar")]
    UnboundedForecast { owner: String },
    #[error("UNKNOWN_ACTION: {0}")]
    UnknownAction(String),
    #[error("MALFORMED_INPUT: {0}")]
    Malformed(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
