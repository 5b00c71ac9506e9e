//! Persistence error types.
//!
//! All engine operations return structured errors that carry a stable
//! [`ErrorCode`], a user-facing message, and an optional remediation hint.
//! Quota exhaustion and shape-validation failures get distinct codes and
//! suggestions because the fix differs (free space vs. fix the file).

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Stable failure classification carried on events and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Local store capacity exhausted. User-actionable.
    Quota,
    /// Worker round trip exceeded its bound. Retryable.
    SerializationTimeout,
    /// Encode/decode failed, inline or in the worker.
    SerializationFault,
    /// Document shape rejected (missing both state containers).
    ValidationFault,
    /// File/remote exchange failed.
    ExchangeFault,
    /// Anything else, logged with context.
    Unknown,
}

/// Persistence operation error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Local store capacity exhausted while writing a key.
    #[error("storage quota exceeded while writing '{key}'")]
    Quota { key: String },

    /// Any other storage backend fault.
    #[error("storage fault while writing '{key}': {message}")]
    Storage { key: String, message: String },

    /// Worker round trip exceeded the configured bound.
    #[error("serialization request {request_id} timed out after {timeout_ms} ms")]
    SerializationTimeout { request_id: u64, timeout_ms: u64 },

    /// Encode/decode failure.
    #[error("failed to {operation} workspace state")]
    Serialization {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Imported or exported document has an unacceptable shape.
    #[error("workspace document validation failed: {reason}")]
    Validation { reason: String },

    /// File I/O error on the exchange boundary.
    #[error("failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote exchange (fetch/post) failure.
    #[error("exchange {operation} failed for '{resource}': {detail}")]
    Exchange {
        operation: &'static str,
        resource: String,
        detail: String,
    },

    /// Catch-all.
    #[error("unexpected persistence fault: {message}")]
    Unknown { message: String },
}

impl PersistenceError {
    /// Stable classification for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Quota { .. } => ErrorCode::Quota,
            Self::Storage { .. } => ErrorCode::Unknown,
            Self::SerializationTimeout { .. } => ErrorCode::SerializationTimeout,
            Self::Serialization { .. } => ErrorCode::SerializationFault,
            Self::Validation { .. } => ErrorCode::ValidationFault,
            Self::Io { .. } | Self::Exchange { .. } => ErrorCode::ExchangeFault,
            Self::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Quota { .. } => {
                "There is not enough local storage space to save your workspace.".to_string()
            }
            Self::Storage { message, .. } => {
                format!("The workspace could not be saved: {message}")
            }
            Self::SerializationTimeout { .. } => {
                "Preparing the workspace for saving took too long.".to_string()
            }
            Self::Serialization { .. } => {
                "An error occurred while encoding the workspace data.".to_string()
            }
            Self::Validation { reason } => {
                format!("This file is not a valid FlowDeck workspace: {reason}")
            }
            Self::Io {
                operation, path, ..
            } => {
                format!("Could not {} the file at {}", operation, path.display())
            }
            Self::Exchange {
                operation,
                resource,
                ..
            } => {
                format!("Could not {operation} '{resource}'")
            }
            Self::Unknown { message } => {
                format!("Something went wrong while saving: {message}")
            }
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Quota { .. } => {
                Some("Free up storage space, or export your workspace to a file.".into())
            }
            Self::SerializationTimeout { .. } => {
                Some("Try saving again. Large workspaces can take a moment.".into())
            }
            Self::Validation { .. } => Some(
                "Make sure you selected a workspace file exported from FlowDeck Studio.".into(),
            ),
            Self::Io { operation, .. } => {
                if *operation == "read" {
                    Some("Check that the file exists and you have permission to read it.".into())
                } else {
                    Some("Check that you have permission to write to this location.".into())
                }
            }
            Self::Exchange { .. } => {
                Some("Check your network connection and try again.".into())
            }
            Self::Storage { .. } | Self::Serialization { .. } | Self::Unknown { .. } => None,
        }
    }

    pub(crate) fn from_storage(key: &str, error: StorageError) -> Self {
        match error {
            StorageError::QuotaExceeded => Self::Quota {
                key: key.to_string(),
            },
            StorageError::Other(message) => Self::Storage {
                key: key.to_string(),
                message,
            },
        }
    }

    pub(crate) fn serialize_fault(
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            operation: "serialize",
            source: Box::new(source),
        }
    }

    pub(crate) fn parse_fault(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Serialization {
            operation: "parse",
            source: Box::new(source),
        }
    }
}

impl From<flowdeck_model::StateShapeError> for PersistenceError {
    fn from(error: flowdeck_model::StateShapeError) -> Self {
        match error {
            flowdeck_model::StateShapeError::Decode(source) => Self::Serialization {
                operation: "parse",
                source: Box::new(source),
            },
            shape => Self::Validation {
                reason: shape.to_string(),
            },
        }
    }
}

/// Normalized failure payload for notification events.
///
/// This is the shape observers receive when a fire-and-forget save fails:
/// the original caller has long returned, so the report carries everything
/// a UI needs to present the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl FailureReport {
    /// Build a report from an error, preserving its classification.
    pub fn from_error(error: &PersistenceError) -> Self {
        Self {
            code: error.code(),
            message: error.user_message(),
            suggestion: error.suggestion(),
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_and_validation_are_distinguishable() {
        let quota = PersistenceError::Quota {
            key: "flowdeck.workspace".to_string(),
        };
        let validation = PersistenceError::Validation {
            reason: "missing both containers".to_string(),
        };

        assert_eq!(quota.code(), ErrorCode::Quota);
        assert_eq!(validation.code(), ErrorCode::ValidationFault);
        assert_ne!(quota.user_message(), validation.user_message());
        assert_ne!(quota.suggestion(), validation.suggestion());
    }

    #[test]
    fn test_failure_report_carries_suggestion() {
        let error = PersistenceError::Quota {
            key: "flowdeck.workspace".to_string(),
        };
        let report = FailureReport::from_error(&error);
        assert_eq!(report.code, ErrorCode::Quota);
        assert!(report.suggestion.is_some());
    }

    #[test]
    fn test_shape_error_maps_to_validation() {
        let error: PersistenceError =
            flowdeck_model::StateShapeError::MissingContainers.into();
        assert_eq!(error.code(), ErrorCode::ValidationFault);
    }
}
