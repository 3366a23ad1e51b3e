//! Error types for Affect Guard

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while enrolling, scoring or fusing evidence
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("Identity not enrolled: {0}")]
    UnenrolledIdentity(String),

    #[error("Missing evidence: {0}")]
    MissingEvidence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid keystroke sample: {0}")]
    InvalidSample(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Coarse classification of an error, used to tell remediation paths apart
/// (retry vs re-enroll vs escalate) in deny reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or absent modality input
    Input,
    /// No usable keystroke template
    Enrollment,
    /// Lookup miss; never a decision
    Lookup,
    /// Internal or configuration failure
    System,
}

impl GuardError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::InvalidEvidence(_)
            | GuardError::MissingEvidence(_)
            | GuardError::InvalidSample(_) => ErrorKind::Input,
            GuardError::UnenrolledIdentity(_) => ErrorKind::Enrollment,
            GuardError::NotFound(_) => ErrorKind::Lookup,
            GuardError::InvalidConfig(_) | GuardError::Json(_) | GuardError::Persistence(_) => {
                ErrorKind::System
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GuardError::InvalidEvidence("x".into()).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            GuardError::MissingEvidence("x".into()).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            GuardError::UnenrolledIdentity("alice".into()).kind(),
            ErrorKind::Enrollment
        );
        assert_eq!(GuardError::NotFound("7".into()).kind(), ErrorKind::Lookup);
        assert_eq!(
            GuardError::InvalidConfig("x".into()).kind(),
            ErrorKind::System
        );
    }

    #[test]
    fn test_error_display() {
        let err = GuardError::UnenrolledIdentity("alice".to_string());
        assert_eq!(err.to_string(), "Identity not enrolled: alice");
    }
}
