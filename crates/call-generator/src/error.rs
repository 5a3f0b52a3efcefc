//! Error types for the call generator

use callgen_rtp_fuzz::RtpFuzzError;
use thiserror::Error;

/// Result type for call generator operations
pub type Result<T> = std::result::Result<T, CallGenError>;

/// Errors that can occur while configuring or running a call generation run
#[derive(Debug, Error)]
pub enum CallGenError {
    /// Invalid run configuration, detected before any worker starts
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// File or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fuzzing channel setup failure
    #[error("RTP fuzzing error: {0}")]
    Fuzz(#[from] RtpFuzzError),

    /// The signaling stack refused to create a call
    #[error("Call creation to {destination} failed: {reason}")]
    CallPlacement { destination: String, reason: String },

    /// Logging could not be initialized
    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl CallGenError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a call placement error
    pub fn placement(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallPlacement {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error should abort the run before it starts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ConfigParse(_) | Self::Logging { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CallGenError::config("Invalid times entered");
        assert_eq!(err.to_string(), "Configuration error: Invalid times entered");

        let err = CallGenError::placement("10.0.0.1", "no route");
        assert_eq!(err.to_string(), "Call creation to 10.0.0.1 failed: no route");
    }

    #[test]
    fn test_fatality() {
        assert!(CallGenError::config("x").is_fatal());
        assert!(!CallGenError::placement("a", "b").is_fatal());
        assert!(!CallGenError::Io(std::io::Error::other("x")).is_fatal());
    }

    #[test]
    fn test_from_fuzz_error() {
        let err: CallGenError = RtpFuzzError::config("bad").into();
        assert!(matches!(err, CallGenError::Fuzz(_)));
    }
}
