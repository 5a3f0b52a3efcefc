//! Error types for the fuzzing packet generator

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while configuring or running a fuzzing channel
#[derive(Debug, Error)]
pub enum RtpFuzzError {
    /// Socket level failure (bind, local address lookup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid fuzzing configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Binding one of the channel sockets failed
    #[error("Failed to bind {kind} socket on {addr}: {source}")]
    Bind {
        kind: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Every port pair in the configured range is in use
    #[error("No free RTP port pair in range {base}-{max}")]
    PortRangeExhausted { base: u16, max: u16 },

    /// Operation not valid in the channel's current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl RtpFuzzError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

/// Result type for fuzzing operations
pub type Result<T> = std::result::Result<T, RtpFuzzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RtpFuzzError::PortRangeExhausted { base: 5000, max: 5003 };
        assert_eq!(err.to_string(), "No free RTP port pair in range 5000-5003");

        let err = RtpFuzzError::config("fuzz-header must be 0-100");
        assert_eq!(err.to_string(), "Configuration error: fuzz-header must be 0-100");
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: RtpFuzzError = io.into();
        assert!(matches!(err, RtpFuzzError::Io(_)));
    }
}
