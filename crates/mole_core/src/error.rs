//! Error taxonomy for uploads and analyses.

use thiserror::Error;

/// Generic message used when the service reports a failure without details.
pub const GENERIC_FAILURE: &str = "Analysis failed";

/// Why the validator refused a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("'{media_type}' is not an image type")]
    NotAnImage { media_type: String },
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("no image data supplied")]
    Empty,
}

/// Discriminant of [`AnalysisError`], handy for matching in UI code and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationRejected,
    NoSelection,
    Busy,
    Unreadable,
    ConnectivityFailure,
    Timeout,
    TransportFailure,
    ApplicationFailure,
    MalformedResponse,
}

/// Every way an analysis can end without a result.
///
/// None of these are fatal: the client is idle again once one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("upload rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("no image selected")]
    NoSelection,
    #[error("an analysis is already running")]
    Busy,
    #[error("could not read the selected file: {0}")]
    Unreadable(String),
    #[error("service unreachable: {0}")]
    Connectivity(String),
    #[error("service did not answer within {secs}s")]
    Timeout { secs: u64 },
    #[error("service rejected the request with HTTP {status}")]
    Transport { status: u16 },
    #[error("{0}")]
    Application(String),
    #[error("malformed service response: {0}")]
    Malformed(String),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Rejected(_) => ErrorKind::ValidationRejected,
            AnalysisError::NoSelection => ErrorKind::NoSelection,
            AnalysisError::Busy => ErrorKind::Busy,
            AnalysisError::Unreadable(_) => ErrorKind::Unreadable,
            AnalysisError::Connectivity(_) => ErrorKind::ConnectivityFailure,
            AnalysisError::Timeout { .. } => ErrorKind::Timeout,
            AnalysisError::Transport { .. } => ErrorKind::TransportFailure,
            AnalysisError::Application(_) => ErrorKind::ApplicationFailure,
            AnalysisError::Malformed(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Message meant for the end user. Distinguishes a bad file from an
    /// unreachable service and from a service that refused the request.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Rejected(reason) => format!("This file cannot be analyzed: {reason}."),
            AnalysisError::NoSelection => "Please upload an image first.".to_string(),
            AnalysisError::Busy => "An analysis is already running, please wait.".to_string(),
            AnalysisError::Unreadable(_) => {
                "The selected file could not be read. Please choose it again.".to_string()
            }
            AnalysisError::Connectivity(_) => {
                "The analysis service is unreachable. Check your connection and try again."
                    .to_string()
            }
            AnalysisError::Timeout { .. } => {
                "The analysis service did not respond in time. Try again later.".to_string()
            }
            AnalysisError::Transport { status } => {
                format!("The analysis service rejected the request (HTTP {status}).")
            }
            AnalysisError::Application(message) => format!("Analysis failed: {message}"),
            AnalysisError::Malformed(_) => {
                "The analysis service returned an answer that could not be understood.".to_string()
            }
        }
    }

    /// True when the failure is about the file rather than the service.
    pub fn is_bad_file(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ValidationRejected | ErrorKind::Unreadable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_separate_file_network_and_service_failures() {
        let bad_file = AnalysisError::from(Rejection::NotAnImage {
            media_type: "text/plain".into(),
        });
        let unreachable = AnalysisError::Connectivity("connection refused".into());
        let rejected = AnalysisError::Transport { status: 500 };

        assert!(bad_file.user_message().contains("cannot be analyzed"));
        assert!(unreachable.user_message().contains("unreachable"));
        assert!(rejected.user_message().contains("rejected the request"));
        assert!(bad_file.is_bad_file());
        assert!(!unreachable.is_bad_file());
    }

    #[test]
    fn application_failure_keeps_service_message() {
        let err = AnalysisError::Application("no face-like region".into());
        assert_eq!(err.kind(), ErrorKind::ApplicationFailure);
        assert_eq!(err.to_string(), "no face-like region");
        assert_eq!(err.user_message(), "Analysis failed: no face-like region");
    }
}
