//! Relay error types

use thiserror::Error;

/// Relay-specific errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Unexpected failure during dequeue/dispatch; the loop backs off and resumes
    #[error("transient relay loop failure: {0}")]
    TransientLoopFailure(#[source] contracts::ContractError),

    /// Transport creation error
    #[error("failed to set up transport '{name}': {message}")]
    TransportSetup { name: String, message: String },
}

impl RelayError {
    /// Create a transport setup error
    pub fn transport_setup(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportSetup {
            name: name.into(),
            message: message.into(),
        }
    }
}
