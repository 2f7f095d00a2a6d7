use thiserror::Error;

/// Speedometer core error types
#[derive(Error, Debug)]
pub enum SpeedoError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for SpeedoError {
    fn from(err: serde_json::Error) -> Self {
        SpeedoError::Parse(err.to_string())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, SpeedoError>;
