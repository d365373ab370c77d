use std::fmt;

use crate::api::Problem;

/// Status value carried by locally synthesized problem documents.
///
/// Real HTTP statuses are always >= 100, so callers can tell a local failure
/// from a server response by this sentinel alone.
pub const LOCAL_PROBLEM_STATUS: u16 = 0;

/// Failure of a single ACME operation.
///
/// Every operation surfaces errors through this one type so callers can match
/// on success vs. failure without caring where the failure originated, while
/// still being able to inspect the problem `type`/`status` when they do care.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The server answered with a structured problem document and retries are
    /// exhausted. The last such document is kept verbatim.
    #[error("{0}")]
    Protocol(Problem),

    /// No response was ever obtained: every attempt failed at the transport
    /// level (or could not acquire a nonce).
    #[error("no response from server after retries during {operation}")]
    Exhausted { operation: &'static str },

    /// An unexpected local fault: malformed JSON, a signing failure, or an
    /// error from one of the key/CSR collaborators.
    #[error("unexpected failure during {operation}: {message}")]
    Exception {
        operation: &'static str,
        message: String,
    },
}

impl CallError {
    pub(crate) fn exception(operation: &'static str, err: impl fmt::Display) -> Self {
        CallError::Exception {
            operation,
            message: err.to_string(),
        }
    }

    /// Renders this error as a problem document.
    ///
    /// Server failures pass through verbatim; local failures synthesize a
    /// `bac:failed:<operation>` or `bac:exception:<operation>` document with
    /// [`LOCAL_PROBLEM_STATUS`].
    pub fn problem(&self) -> Problem {
        match self {
            CallError::Protocol(problem) => problem.clone(),
            CallError::Exhausted { operation } => Problem {
                _type: format!("bac:failed:{operation}"),
                detail: Some("no response from server after multiple attempts".to_owned()),
                status: Some(LOCAL_PROBLEM_STATUS),
                subproblems: None,
            },
            CallError::Exception { operation, message } => Problem {
                _type: format!("bac:exception:{operation}"),
                detail: Some(message.clone()),
                status: Some(LOCAL_PROBLEM_STATUS),
                subproblems: None,
            },
        }
    }

    /// Returns true if this is a server-side problem document.
    pub fn is_protocol(&self) -> bool {
        matches!(self, CallError::Protocol(_))
    }
}
