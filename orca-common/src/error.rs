use thiserror::Error;

/// Common error type for ORCA components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup error: {0}")]
    Logging(String),
}

/// Result type alias using ORCA's Error.
pub type Result<T> = std::result::Result<T, Error>;
