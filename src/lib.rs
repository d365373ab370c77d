//! Client-side engine for the ACME (Automatic Certificate Management Environment) protocol,
//! as used by providers such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! It follows the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555) spec, using ACME v2
//! to issue/renew certificates, and additionally supports renewal-info (ARI) lookups.
//!
//! # Protocol engine
//!
//! Every authenticated ACME request is a signed JWS carrying a single-use anti-replay nonce,
//! and every network call is wrapped in a bounded retry with increasing backoff:
//!
//! - plain fetches (directory, renewal info) retry up to 6 times, 650 ms backoff base;
//! - signed calls retry up to 3 times, 2250 ms backoff base, re-acquiring a nonce and
//!   re-signing the payload on every attempt, since the server invalidates a nonce on
//!   first use whether or not the request succeeded.
//!
//! Both are [`RetryPolicy`] values and can be tuned. Outcomes are normalized into one
//! envelope shape: [`Resource`] (data plus the `Location` and `Replay-Nonce` headers) on
//! success, [`CallError`] on failure — a server problem document, retry exhaustion, or an
//! unexpected local fault. Errors are returned, never panicked, past the operation layer.
//!
//! # Domain Ownership
//!
//! Most website TLS certificates tries to prove ownership/control over the domain they are issued
//! for. For ACME, this means proving you control either:
//!
//! - a server answering TLS or HTTP requests for that domain;
//! - the DNS server answering name lookups against the domain.
//!
//! This library computes the challenge proofs ([`http_proof`], [`dns_proof`],
//! [`tls_alpn_proof`]) but placing them — writing the challenge file, creating the TXT
//! record, answering the ALPN handshake — is up to the caller.
//!
//! ## Multiple Domains
//!
//! When creating a new order, it's possible to provide multiple alt-names that will also be part of
//! the certificate. The ACME API requires you to prove ownership of each such domain. See
//! [`authorizations`].
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused. It
//! might be tempting to put the `delay` really low in some of this library's polling calls, but
//! balance this against the real risk of having access cut off.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the rate
//! limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [`http_proof`]: crate::order::Challenge::http_proof()
//! [`dns_proof`]: crate::order::Challenge::dns_proof()
//! [`tls_alpn_proof`]: crate::order::Challenge::tls_alpn_proof()
//! [`authorizations`]: crate::order::NewOrder::authorizations()
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod acc;
mod cert;
mod dir;
mod envelope;
mod error;
mod jws;
mod nonce;
mod req;
mod retry;
mod trans;
mod util;

pub mod api;
pub mod order;

#[cfg(test)]
mod test;

pub use crate::{
    acc::{Account, RevocationReason},
    cert::{create_p256_key, Certificate},
    dir::{Directory, DirectoryUrl},
    envelope::{CallResult, Resource},
    error::{CallError, LOCAL_PROBLEM_STATUS},
    retry::RetryPolicy,
    util::InvalidHex,
};
