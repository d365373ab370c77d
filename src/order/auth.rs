use std::{sync::Arc, time::Duration};

use sha2::{Digest as _, Sha256};

use crate::{
    acc::AccountInner,
    api::{self, EmptyObject},
    envelope,
    error::CallError,
    jws::{key_authorization, Jwk},
};

/// An authorization (ownership proof) for a domain name.
///
/// Each authorization for an order must be progressed to a valid state before the ACME API
/// will issue a certificate.
///
/// Authorizations may or may not be required depending on previous orders against the same
/// ACME account. The ACME API decides if the authorization is needed.
///
/// This library computes challenge proofs but does not place them anywhere:
/// serving the http-01 file, creating the DNS TXT record, or answering the
/// TLS-ALPN handshake is up to the caller.
#[derive(Debug)]
pub struct Auth {
    inner: Arc<AccountInner>,
    api_auth: api::Authorization,
    auth_url: String,
}

impl Auth {
    pub(crate) fn new(
        inner: &Arc<AccountInner>,
        api_auth: api::Authorization,
        auth_url: &str,
    ) -> Self {
        Auth {
            inner: Arc::clone(inner),
            api_auth,
            auth_url: auth_url.to_owned(),
        }
    }

    /// Domain name for this authorization.
    pub fn domain_name(&self) -> &str {
        &self.api_auth.identifier.value
    }

    /// Whether we actually need to do the authorization. This might not be needed if we have
    /// proven ownership of the domain recently in a previous order.
    pub fn need_challenge(&self) -> bool {
        !matches!(self.api_auth.status, api::AuthorizationStatus::Valid)
    }

    /// Get the http challenge.
    ///
    /// The http challenge proof must be accessible under:
    ///
    /// ```text
    /// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
    /// ```
    pub fn http_challenge(&self) -> Option<Challenge> {
        self.api_auth
            .http_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
    }

    /// Get the dns challenge.
    ///
    /// The dns challenge proof is a `TXT` record placed under:
    ///
    /// ```text
    /// _acme-challenge.<domain-to-be-proven>.  TXT  <proof>
    /// ```
    pub fn dns_challenge(&self) -> Option<Challenge> {
        self.api_auth
            .dns_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
    }

    /// Returns the TLS ALPN challenge.
    ///
    /// The proof is the SHA-256 of the key authorization, placed in the acmeIdentifier
    /// extension of the certificate served for the ALPN protocol "acme-tls/1".
    pub fn tls_alpn_challenge(&self) -> Option<Challenge> {
        self.api_auth
            .tls_alpn_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
    }

    /// Returns a reference to the authorization's API object.
    ///
    /// Useful for debugging.
    pub fn api_auth(&self) -> &api::Authorization {
        &self.api_auth
    }
}

/// A DNS, HTTP, or TLS-ALPN challenge as obtained from the [`Auth`].
#[derive(Debug)]
pub struct Challenge {
    inner: Arc<AccountInner>,
    api_challenge: api::Challenge,
    auth_url: String,
}

impl Challenge {
    fn new(inner: &Arc<AccountInner>, api_challenge: api::Challenge, auth_url: &str) -> Self {
        Challenge {
            inner: Arc::clone(inner),
            api_challenge,
            auth_url: auth_url.to_owned(),
        }
    }

    /// Returns the token, a unique identifier of the challenge.
    ///
    /// For http-01 this is the file name served under `.well-known/acme-challenge/`.
    pub fn token(&self) -> &str {
        &self.api_challenge.token
    }

    /// Returns true if this challenge needs validation.
    ///
    /// It might already have been done in a previous order for the same account.
    pub fn need_validate(&self) -> bool {
        matches!(self.api_challenge.status, api::ChallengeStatus::Pending)
    }

    /// Proof content for HTTP validation: the key authorization
    /// `token "." thumbprint`, served as the body of the challenge file.
    ///
    /// See [RFC 8555 §8.3](https://datatracker.ietf.org/doc/html/rfc8555#section-8.3).
    pub fn http_proof(&self) -> eyre::Result<String> {
        let jwk = Jwk::try_from(self.inner.transport.key())?;
        Ok(key_authorization(&self.api_challenge.token, &jwk, false)?)
    }

    /// Proof content for DNS validation: the base64url SHA-256 digest of the
    /// key authorization, placed in the TXT record.
    ///
    /// Not the same as the http proof.
    ///
    /// See [RFC 8555 §8.4](https://datatracker.ietf.org/doc/html/rfc8555#section-8.4).
    pub fn dns_proof(&self) -> eyre::Result<String> {
        let jwk = Jwk::try_from(self.inner.transport.key())?;
        Ok(key_authorization(&self.api_challenge.token, &jwk, true)?)
    }

    /// Proof content for TLS-ALPN validation: the raw SHA-256 of the key
    /// authorization.
    ///
    /// See [RFC 8737 §3](https://datatracker.ietf.org/doc/html/rfc8737#section-3).
    pub fn tls_alpn_proof(&self) -> eyre::Result<[u8; 32]> {
        let jwk = Jwk::try_from(self.inner.transport.key())?;
        let proof = key_authorization(&self.api_challenge.token, &jwk, false)?;
        Ok(Sha256::digest(proof).into())
    }

    /// Tells the ACME API to attempt validating the proof of this challenge.
    ///
    /// The challenge proof must be put in place before this call.
    pub async fn trigger(&self) -> Result<api::Challenge, CallError> {
        let outcome = self
            .inner
            .transport
            .call_kid("challengeTrigger", &self.api_challenge.url, &EmptyObject)
            .await?;

        let resource =
            envelope::from_json_response::<api::Challenge>("challengeTrigger", outcome).await?;
        Ok(resource.data)
    }

    /// Fetches the current state of this challenge (POST-as-GET).
    pub async fn refresh(&self) -> Result<api::Challenge, CallError> {
        let outcome = self
            .inner
            .transport
            .post_as_get("challengeStatus", &self.api_challenge.url)
            .await?;

        let resource =
            envelope::from_json_response::<api::Challenge>("challengeStatus", outcome).await?;
        Ok(resource.data)
    }

    /// Triggers validation and polls the owning authorization until it leaves
    /// the pending state. The `delay` is the wait between poll attempts.
    ///
    /// Fails with the challenge's problem document if validation ends in any
    /// state but valid.
    pub async fn validate(&self, delay: Duration) -> Result<(), CallError> {
        self.trigger().await?;

        let auth = poll_authorization(&self.inner, &self.auth_url, delay).await?;

        if !matches!(auth.status, api::AuthorizationStatus::Valid) {
            let problem = auth
                .challenges
                .iter()
                .filter_map(|c| c.error.as_ref())
                .next();

            return Err(match problem {
                Some(problem) => CallError::Protocol(problem.clone()),
                None => CallError::exception(
                    "authorization",
                    "validation failed and no error found",
                ),
            });
        }

        Ok(())
    }

    /// Returns a reference to the challenge's API object.
    ///
    /// Useful for debugging.
    pub fn api_challenge(&self) -> &api::Challenge {
        &self.api_challenge
    }
}

/// Polls the authorization status until it transitions out of the "pending" state.
async fn poll_authorization(
    inner: &Arc<AccountInner>,
    auth_url: &str,
    delay: Duration,
) -> Result<api::Authorization, CallError> {
    loop {
        let outcome = inner.transport.post_as_get("authorization", auth_url).await?;
        let resource =
            envelope::from_json_response::<api::Authorization>("authorization", outcome).await?;

        if !matches!(resource.data.status, api::AuthorizationStatus::Pending) {
            return Ok(resource.data);
        }

        tokio::time::sleep(delay).await;
    }
}
