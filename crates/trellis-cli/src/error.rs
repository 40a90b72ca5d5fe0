//! Error types for the CLI

use trellis_common::telemetry::TelemetryError;
use trellis_infra::apply::ApplyFailure;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Trellis(#[from] trellis_common::Error),

    #[error(transparent)]
    Apply(#[from] Box<ApplyFailure>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }
}

impl From<ApplyFailure> for Error {
    fn from(failure: ApplyFailure) -> Self {
        Error::Apply(Box::new(failure))
    }
}
