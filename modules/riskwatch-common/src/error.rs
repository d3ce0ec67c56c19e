use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskWatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RiskWatchError {
    fn from(err: serde_json::Error) -> Self {
        RiskWatchError::Serialization(err.to_string())
    }
}
