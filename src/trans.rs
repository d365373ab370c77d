use serde::Serialize;

use crate::{
    acc::AccountKey,
    error::CallError,
    jws::{self, Jwk, Payload, ProtectedHeader},
    nonce::NonceSlot,
    req::req_post,
    retry::RetryPolicy,
};

/// Signed-call transport: owns the account key and the nonce slot for one
/// call chain.
///
/// Setup is:
///
/// 1. `Transport::new()`
/// 2. `call_jwk()` against the newAccount URL
/// 3. `set_key_id()` from the returned `Location` header
/// 4. `call_kid()` / `post_as_get()` for all calls after that
///
/// Every call runs the signed retry loop: a nonce is acquired (from the slot
/// or the nonce endpoint) and the payload re-signed on each attempt, because
/// the server invalidates a nonce on first use regardless of whether the
/// request succeeded. Cloning the transport starts a fresh nonce chain.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    key: AccountKey,
    nonce: NonceSlot,
    policy: RetryPolicy,
}

impl Transport {
    pub(crate) fn new(nonce_url: &str, key: AccountKey) -> Self {
        Self::with_policy(nonce_url, key, RetryPolicy::signed())
    }

    pub(crate) fn with_policy(nonce_url: &str, key: AccountKey, policy: RetryPolicy) -> Self {
        Transport {
            key,
            nonce: NonceSlot::new(nonce_url),
            policy,
        }
    }

    /// Update the key ID once it is known (part of setting up the transport).
    pub(crate) fn set_key_id(&mut self, kid: String) {
        self.key.set_key_id(kid);
    }

    /// The key used in the transport.
    pub(crate) fn key(&self) -> &AccountKey {
        &self.key
    }

    /// Signed call identifying the signer by its full public JWK.
    ///
    /// Only used before a key ID exists: account creation, and revocation
    /// authorized by the certificate key.
    pub(crate) async fn call_jwk<T>(
        &self,
        operation: &'static str,
        url: &str,
        body: &T,
    ) -> Result<Option<reqwest::Response>, CallError>
    where
        T: Serialize + ?Sized,
    {
        let payload = Payload::json(body).map_err(|err| CallError::exception(operation, err))?;
        let jwk = Jwk::try_from(&self.key).map_err(|err| CallError::exception(operation, err))?;

        self.retry_signed(operation, url, payload, |nonce| {
            ProtectedHeader::new_jwk(jwk.clone(), url, nonce)
        })
        .await
    }

    /// Signed call identifying the signer by the account's key ID.
    pub(crate) async fn call_kid<T>(
        &self,
        operation: &'static str,
        url: &str,
        body: &T,
    ) -> Result<Option<reqwest::Response>, CallError>
    where
        T: Serialize + ?Sized,
    {
        let payload = Payload::json(body).map_err(|err| CallError::exception(operation, err))?;
        self.call_kid_payload(operation, url, payload).await
    }

    /// POST-as-GET: a signed read with an empty payload (RFC 8555 §6.3).
    pub(crate) async fn post_as_get(
        &self,
        operation: &'static str,
        url: &str,
    ) -> Result<Option<reqwest::Response>, CallError> {
        self.call_kid_payload(operation, url, Payload::Empty).await
    }

    async fn call_kid_payload(
        &self,
        operation: &'static str,
        url: &str,
        payload: Payload,
    ) -> Result<Option<reqwest::Response>, CallError> {
        let kid = self
            .key
            .key_id()
            .ok_or_else(|| CallError::exception(operation, "account key has no key ID yet"))?
            .to_owned();

        self.retry_signed(operation, url, payload, |nonce| {
            ProtectedHeader::new_kid(&kid, url, nonce)
        })
        .await
    }

    /// The signed retry loop.
    ///
    /// Per attempt: acquire a nonce, build a fresh protected header, sign,
    /// POST, and capture the response's `Replay-Nonce` for the next call. A
    /// 2xx response returns immediately; a non-2xx response is held so the
    /// last one can be returned on exhaustion; nonce-acquisition and
    /// transport failures consume the attempt and its backoff wait without
    /// aborting the loop. Returns `None` only if no response was ever
    /// obtained.
    async fn retry_signed<F>(
        &self,
        operation: &'static str,
        url: &str,
        payload: Payload,
        protect: F,
    ) -> Result<Option<reqwest::Response>, CallError>
    where
        F: Fn(String) -> ProtectedHeader,
    {
        let mut last_response = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.nonce.acquire().await {
                Ok(nonce) => {
                    let protected = protect(nonce);

                    // serialization and signing are deterministic; retrying
                    // cannot help, so these faults abort the loop
                    let body = jws::sign(&protected, &payload, &self.key)
                        .map_err(|err| CallError::exception(operation, err))?;

                    log::debug!("call endpoint: {url}");

                    match req_post(url, &body).await {
                        Ok(res) => {
                            // either outcome may carry a nonce for the next call
                            self.nonce.offer_from(&res);

                            if res.status().is_success() {
                                return Ok(Some(res));
                            }

                            log::debug!(
                                "attempt {attempt} of {operation}: server returned {}",
                                res.status()
                            );
                            last_response = Some(res);
                        }

                        Err(err) => {
                            log::debug!("attempt {attempt} of {operation}: transport error: {err}");
                        }
                    }
                }

                Err(err) => {
                    log::debug!("attempt {attempt} of {operation}: {err}");
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt + 1)).await;
            }
        }

        Ok(last_response)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{api::EmptyObject, envelope, test::with_test_server, util::base64url_decode};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn keyed_transport(nonce_url: &str) -> Transport {
        let mut transport = Transport::with_policy(nonce_url, AccountKey::generate(), fast_policy());
        transport.set_key_id("https://example.com/acme/acct/1".to_owned());
        transport
    }

    fn protected_header_of(jws_body: &str) -> serde_json::Value {
        let jws: serde_json::Value = serde_json::from_str(jws_body).unwrap();
        let protected = base64url_decode(jws["protected"].as_str().unwrap()).unwrap();
        serde_json::from_slice(&protected).unwrap()
    }

    #[tokio::test]
    async fn re_signs_with_fresh_nonce_after_bad_nonce() {
        let server = with_test_server();
        let transport = keyed_transport(&server.nonce_url());

        let url = format!("{}/acme/bad-nonce-once", server.base_url);
        let outcome = transport
            .call_kid("challengeTrigger", &url, &EmptyObject)
            .await
            .unwrap();

        let resource = envelope::from_json_response::<serde_json::Value>("challengeTrigger", outcome)
            .await
            .unwrap();
        assert_eq!(resource.data["ok"], true);

        // the rejection response carried no Replay-Nonce, so the second
        // attempt had to go back to the nonce endpoint
        assert_eq!(server.head_nonce_calls(), 2);

        let bodies = server.signed_bodies();
        assert_eq!(bodies.len(), 2);

        let first = protected_header_of(&bodies[0]);
        let second = protected_header_of(&bodies[1]);
        assert_ne!(first["nonce"], second["nonce"]);
        assert_eq!(first["url"], second["url"]);
    }

    #[tokio::test]
    async fn reuses_nonce_offered_by_previous_response() {
        let server = with_test_server();
        let transport = keyed_transport(&server.nonce_url());

        let url = format!("{}/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789597", server.base_url);

        transport
            .call_kid("challengeTrigger", &url, &EmptyObject)
            .await
            .unwrap()
            .unwrap();
        transport
            .call_kid("challengeTrigger", &url, &EmptyObject)
            .await
            .unwrap()
            .unwrap();

        // second call was fed by the first response's Replay-Nonce
        assert_eq!(server.head_nonce_calls(), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_rejection() {
        let server = with_test_server();
        let transport = keyed_transport(&server.nonce_url());

        let url = format!("{}/acme/always-rejects", server.base_url);
        let outcome = transport
            .call_kid("finalize", &url, &EmptyObject)
            .await
            .unwrap();

        let res = outcome.expect("last rejection response is returned, not discarded");
        assert_eq!(res.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn missing_key_id_is_a_local_exception() {
        let server = with_test_server();
        let transport =
            Transport::with_policy(&server.nonce_url(), AccountKey::generate(), fast_policy());

        let url = format!("{}/acme/new-order", server.base_url);
        let err = transport
            .post_as_get("orderStatus", &url)
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Exception { .. }));
    }

    #[tokio::test]
    async fn nonce_slot_prefers_offered_value() {
        let server = with_test_server();
        let slot = NonceSlot::new(server.nonce_url());

        slot.offer("offered-nonce");
        assert_eq!(slot.acquire().await.unwrap(), "offered-nonce");
        assert_eq!(server.head_nonce_calls(), 0);

        // consumed: the next acquire goes to the endpoint
        let fresh = slot.acquire().await.unwrap();
        assert!(fresh.starts_with("test-nonce-"));
        assert_eq!(server.head_nonce_calls(), 1);
    }

    #[tokio::test]
    async fn nonce_endpoint_without_header_is_recoverable_error() {
        let server = with_test_server();
        // this route answers HEAD without a Replay-Nonce header
        let slot = NonceSlot::new(format!("{}/renewal-info/q80.AQI", server.base_url));

        let err = slot.acquire().await.unwrap_err();
        assert!(matches!(err, crate::nonce::NonceError::NoNonceAvailable));
    }
}
