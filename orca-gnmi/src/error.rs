//! Error types for the gNMI client.

use thiserror::Error;

use crate::dispatcher::CallId;

/// Errors raised while building the channel or running a call.
#[derive(Debug, Clone, Error)]
pub enum GnmiError {
    /// The device address cannot be turned into an endpoint.
    #[error("Invalid device address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// The transport rejected the endpoint settings.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A credential cannot be carried as an ASCII metadata value.
    #[error("Invalid metadata value for '{key}'")]
    InvalidMetadata { key: &'static str },

    /// The RPC finished with a non-OK status.
    #[error("gNMI call failed: {}", .0.message())]
    Call(#[from] tonic::Status),

    /// The call task went away without reporting an outcome.
    #[error("Call {0} ended without an outcome")]
    Abandoned(CallId),

    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GnmiError {
    /// Status code of a failed call, if this is a call error.
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            GnmiError::Call(status) => Some(status.code()),
            _ => None,
        }
    }
}

impl From<tonic::transport::Error> for GnmiError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
