//! Normalization of HTTP outcomes into the uniform result envelope.
//!
//! The success/failure decision is made exactly once, here, where the HTTP
//! status is known. Everything above this boundary sees either a
//! [`Resource`] or a [`CallError`], never a raw response.

use serde::de::DeserializeOwned;

use crate::{
    api::Problem,
    error::CallError,
    nonce::REPLAY_NONCE,
    req::{header, safe_read_body},
};

/// Successful outcome of one ACME operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource<T> {
    /// Parsed response body.
    pub data: T,

    /// `Location` header, when the server created or named a resource.
    pub location: Option<String>,

    /// `Replay-Nonce` header. When present it has not been consumed and is
    /// safe to use for the next signed call.
    pub nonce: Option<String>,
}

impl<T> Resource<T> {
    pub fn into_data(self) -> T {
        self.data
    }
}

/// Outcome of one ACME operation.
pub type CallResult<T> = Result<Resource<T>, CallError>;

fn require_response(
    operation: &'static str,
    outcome: Option<reqwest::Response>,
) -> Result<reqwest::Response, CallError> {
    outcome.ok_or(CallError::Exhausted { operation })
}

/// Normalizes a retried call into an envelope with a JSON body.
pub(crate) async fn from_json_response<T: DeserializeOwned>(
    operation: &'static str,
    outcome: Option<reqwest::Response>,
) -> CallResult<T> {
    let res = require_response(operation, outcome)?;
    let location = header(&res, "location");
    let nonce = header(&res, REPLAY_NONCE);

    if !res.status().is_success() {
        return Err(CallError::Protocol(problem_from_response(res).await));
    }

    let body = safe_read_body(res).await;
    log::debug!("{body}");

    let data = serde_json::from_str(&body).map_err(|err| CallError::exception(operation, err))?;

    Ok(Resource {
        data,
        location,
        nonce,
    })
}

/// Normalizes a retried call whose success body is plain text (certificate
/// downloads).
pub(crate) async fn from_text_response(
    operation: &'static str,
    outcome: Option<reqwest::Response>,
) -> CallResult<String> {
    let res = require_response(operation, outcome)?;
    let location = header(&res, "location");
    let nonce = header(&res, REPLAY_NONCE);

    if !res.status().is_success() {
        return Err(CallError::Protocol(problem_from_response(res).await));
    }

    Ok(Resource {
        data: safe_read_body(res).await,
        location,
        nonce,
    })
}

/// Normalizes a retried call whose success body is irrelevant (revocation).
pub(crate) async fn from_empty_response(
    operation: &'static str,
    outcome: Option<reqwest::Response>,
) -> CallResult<()> {
    let res = require_response(operation, outcome)?;
    let location = header(&res, "location");
    let nonce = header(&res, REPLAY_NONCE);

    if !res.status().is_success() {
        return Err(CallError::Protocol(problem_from_response(res).await));
    }

    Ok(Resource {
        data: (),
        location,
        nonce,
    })
}

async fn problem_from_response(res: reqwest::Response) -> Problem {
    let status = res.status().as_u16();
    let content_type = header(&res, "content-type").unwrap_or_default();
    let body = safe_read_body(res).await;

    if content_type.starts_with("application/problem+json") {
        match serde_json::from_str::<Problem>(&body) {
            Ok(mut problem) => {
                problem.status.get_or_insert(status);
                problem
            }

            Err(err) => Problem {
                _type: "problemJsonFail".to_owned(),
                detail: Some(format!(
                    "failed to deserialize application/problem+json ({err}) body: {body}"
                )),
                status: Some(status),
                subproblems: None,
            },
        }
    } else {
        Problem {
            _type: "httpReqError".to_owned(),
            detail: Some(format!("{status} body: {body}")),
            status: Some(status),
            subproblems: None,
        }
    }
}
