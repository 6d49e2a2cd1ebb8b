//! Error handling for Moodshift
//!
//! Validation-class errors (bad parameters, unknown effects) are recovered
//! locally by skipping a single effect. Everything else aborts the job.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Moodshift operations
pub type Result<T> = std::result::Result<T, MoodshiftError>;

/// Main error type for Moodshift operations
#[derive(Error, Debug)]
pub enum MoodshiftError {
    // Effect Errors
    #[error("Invalid parameters for '{effect}': {reason}")]
    ParameterValidation { effect: String, reason: String },

    #[error("Unsupported effect: '{name}'")]
    UnsupportedEffect { name: String },

    #[error("Invalid effect chain: {reason}")]
    InvalidChain { reason: String },

    // Codec Errors
    #[error("Failed to decode '{}': {reason}", .path.display())]
    Decode {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to encode '{}' as {format}: {reason}", .path.display())]
    Encode {
        path: PathBuf,
        format: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // File Errors
    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Upload rejected: {reason}")]
    InvalidUpload { reason: String },

    // Job Errors
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Invalid job transition: {event} while {from}")]
    InvalidTransition { from: String, event: String },

    #[error("Job queue is closed")]
    QueueClosed,

    // Configuration Errors
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MoodshiftError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MoodshiftError::ParameterValidation { .. } => "PARAMETER_VALIDATION",
            MoodshiftError::UnsupportedEffect { .. } => "UNSUPPORTED_EFFECT",
            MoodshiftError::InvalidChain { .. } => "INVALID_CHAIN",
            MoodshiftError::Decode { .. } => "DECODE_ERROR",
            MoodshiftError::Encode { .. } => "ENCODE_ERROR",
            MoodshiftError::FileNotFound { .. } => "FILE_NOT_FOUND",
            MoodshiftError::InvalidUpload { .. } => "INVALID_UPLOAD",
            MoodshiftError::JobNotFound { .. } => "JOB_NOT_FOUND",
            MoodshiftError::InvalidTransition { .. } => "INVALID_TRANSITION",
            MoodshiftError::QueueClosed => "QUEUE_CLOSED",
            MoodshiftError::Config { .. } => "CONFIG_ERROR",
            MoodshiftError::Internal { .. } => "INTERNAL_ERROR",
            MoodshiftError::Io(_) => "IO_ERROR",
            MoodshiftError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error aborts the whole job
    ///
    /// Parameter and lookup failures only skip the offending effect.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MoodshiftError::ParameterValidation { .. } | MoodshiftError::UnsupportedEffect { .. }
        )
    }

    /// Human-readable status shown to callers polling a failed job
    pub fn status_message(&self) -> String {
        match self {
            MoodshiftError::Decode { .. } => {
                "Error applying effects: the uploaded file could not be read as audio".to_string()
            }
            MoodshiftError::Encode { format, .. } => {
                format!("Error applying effects: could not write {} output", format)
            }
            MoodshiftError::Internal { .. } => {
                "Error applying effects: an unexpected error occurred".to_string()
            }
            other => format!("Error applying effects: {}", other),
        }
    }

    pub(crate) fn invalid_params(effect: &str, reason: impl Into<String>) -> Self {
        MoodshiftError::ParameterValidation {
            effect: effect.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MoodshiftError::FileNotFound {
            path: PathBuf::from("missing.wav"),
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert_eq!(MoodshiftError::QueueClosed.error_code(), "QUEUE_CLOSED");
    }

    #[test]
    fn test_validation_errors_are_not_fatal() {
        let err = MoodshiftError::invalid_params("echo", "decay_factor must be in (0, 1)");
        assert!(!err.is_fatal());

        let err = MoodshiftError::UnsupportedEffect {
            name: "flanger".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_codec_errors_are_fatal() {
        let err = MoodshiftError::Decode {
            path: PathBuf::from("in.wav"),
            reason: "not a RIFF file".to_string(),
            source: None,
        };
        assert!(err.is_fatal());
        assert!(err.status_message().starts_with("Error applying effects"));
        // Status hides the raw detail
        assert!(!err.status_message().contains("RIFF"));
    }

    #[test]
    fn test_internal_status_is_generic() {
        let err = MoodshiftError::Internal {
            reason: "worker panicked at index 3".to_string(),
        };
        assert_eq!(
            err.status_message(),
            "Error applying effects: an unexpected error occurred"
        );
    }
}
