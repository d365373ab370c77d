use parking_lot::Mutex;

use crate::{
    req::{header, req_head},
    util::base64url_decode,
};

pub(crate) const REPLAY_NONCE: &str = "replay-nonce";

/// Failure to produce a nonce for the next signed request.
///
/// Recoverable: the signed retry loop treats this as one failed attempt, not
/// as a reason to abort the operation.
#[derive(Debug, thiserror::Error)]
pub(crate) enum NonceError {
    #[error("nonce endpoint request failed: {0}")]
    Endpoint(#[from] reqwest::Error),

    #[error("no Replay-Nonce header available")]
    NoNonceAvailable,
}

/// Single-slot holder for the anti-replay token.
///
/// Every response from the server (success or failure) may carry a fresh
/// `Replay-Nonce` header; offering it here saves the HEAD round trip to the
/// nonce endpoint on the next signed request. A nonce is taken out of the
/// slot when consumed, so it can never be used twice.
///
/// The slot belongs to one call chain. Cloning starts a fresh, empty slot so
/// concurrent issuance flows never share nonce state.
#[derive(Debug)]
pub(crate) struct NonceSlot {
    endpoint: String,
    slot: Mutex<Option<String>>,
}

impl Clone for NonceSlot {
    fn clone(&self) -> Self {
        NonceSlot::new(self.endpoint.clone())
    }
}

impl NonceSlot {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        NonceSlot {
            endpoint: endpoint.into(),
            slot: Mutex::new(None),
        }
    }

    /// Takes the held nonce, or fetches one from the nonce endpoint.
    pub(crate) async fn acquire(&self) -> Result<String, NonceError> {
        if let Some(nonce) = self.slot.lock().take() {
            log::trace!("using nonce from previous response");
            return Ok(nonce);
        }

        log::debug!("requesting fresh nonce");
        let res = req_head(&self.endpoint).await?;

        header(&res, REPLAY_NONCE)
            .filter(|nonce| is_valid_nonce(nonce))
            .ok_or(NonceError::NoNonceAvailable)
    }

    /// Captures the `Replay-Nonce` header of a response, if present.
    pub(crate) fn offer_from(&self, res: &reqwest::Response) {
        if let Some(nonce) = header(res, REPLAY_NONCE) {
            if !is_valid_nonce(&nonce) {
                log::debug!("ignoring invalid Replay-Nonce value");
                return;
            }

            log::trace!("storing nonce from response");
            *self.slot.lock() = Some(nonce);
        }
    }

    #[cfg(test)]
    pub(crate) fn offer(&self, nonce: impl Into<String>) {
        *self.slot.lock() = Some(nonce.into());
    }
}

/// RFC 8555 §6.5.1: a `Replay-Nonce` value that is not valid base64url must
/// be ignored.
fn is_valid_nonce(nonce: &str) -> bool {
    base64url_decode(nonce).is_ok()
}
