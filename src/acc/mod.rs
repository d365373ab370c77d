use std::{collections::HashSet, iter, sync::Arc};

use zeroize::Zeroizing;

use crate::{
    api,
    cert::Certificate,
    envelope,
    error::CallError,
    order::{NewOrder, Order},
    trans::Transport,
    util::base64url,
};

mod account_key;

pub(crate) use self::account_key::AccountKey;

#[derive(Debug, Clone)]
pub(crate) struct AccountInner {
    pub transport: Transport,
    pub api_account: api::Account,
    pub api_directory: Arc<api::Directory>,
}

/// Account with an ACME provider.
///
/// Accounts are created using [`Directory::register_account()`] and consist of a contact email
/// address and a private key for signing requests to the ACME API.
///
/// This library uses elliptic curve P-256 for accessing the account.
///
/// [`Directory::register_account()`]: crate::Directory::register_account()
#[derive(Debug, Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

impl Account {
    pub(crate) fn new(
        transport: Transport,
        api_account: api::Account,
        api_directory: Arc<api::Directory>,
    ) -> Self {
        Self {
            inner: Arc::new(AccountInner {
                transport,
                api_account,
                api_directory,
            }),
        }
    }

    /// Private key for this account, as PKCS#8 PEM.
    pub fn private_key_pem(&self) -> eyre::Result<Zeroizing<String>> {
        self.inner.transport.key().to_pem()
    }

    /// The account's key ID: its resource URL as assigned by the server.
    pub fn key_id(&self) -> Option<&str> {
        self.inner.transport.key().key_id()
    }

    /// Create a new order to issue a certificate for this account.
    ///
    /// Each order has a required `primary_name` (which will be set as the certificate's `CN`) and a
    /// variable number of `alt_names`.
    ///
    /// This library doesn't constrain the number of `alt_names`, but it is limited by the ACME API
    /// provider. Let's Encrypt [sets a max of 100 names] per certificate.
    ///
    /// Every call creates a new order with the ACME API provider, even when the domain names
    /// supplied are exactly the same.
    ///
    /// [sets a max of 100 names]: https://letsencrypt.org/docs/rate-limits/
    pub async fn new_order(
        &self,
        primary_name: &str,
        alt_names: &[&str],
    ) -> Result<NewOrder, CallError> {
        let mut identifiers = Vec::new();
        let mut dedup = HashSet::new();
        for domain in iter::once(primary_name).chain(alt_names.iter().copied()) {
            if dedup.insert(domain) {
                identifiers.push(api::Identifier::dns(domain));
            }
        }

        let order = api::Order::from_identifiers(identifiers);

        let new_order_url = self.inner.api_directory.new_order.as_str();

        let outcome = self
            .inner
            .transport
            .call_kid("newOrder", new_order_url, &order)
            .await?;
        let resource = envelope::from_json_response::<api::Order>("newOrder", outcome).await?;

        let order_url = resource.location.clone().ok_or_else(|| {
            CallError::exception("newOrder", "response had no Location header")
        })?;

        // Let's Encrypt was observed to return domains in a different order,
        // which may flip the primary with a SAN. Keep our ordering.
        let mut api_order = resource.data;
        if api_order.identifiers.len() != order.identifiers.len()
            || api_order
                .identifiers
                .iter()
                .any(|id| !order.identifiers.contains(id))
        {
            return Err(CallError::exception(
                "newOrder",
                format!(
                    "order domain(s) mismatch: sent {:?} and got {:?}",
                    order.identifiers, api_order.identifiers
                ),
            ));
        }
        api_order.identifiers = order.identifiers;

        Ok(NewOrder {
            order: Order::new(&self.inner, api_order, order_url),
        })
    }

    /// Revoke a certificate for the reason given.
    pub async fn revoke_certificate(
        &self,
        cert: &Certificate,
        reason: RevocationReason,
    ) -> Result<(), CallError> {
        // base64url of the end-entity DER (which is not PEM).
        let der = cert
            .certificate_der()
            .map_err(|err| CallError::exception("revokeCert", err))?;
        let certificate = base64url(&der);

        let reason = match reason {
            // > the reason code CRL entry extension SHOULD be absent instead of
            // > using the unspecified (0) reasonCode value
            // see <https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1>
            RevocationReason::Unspecified => None,

            reason => Some(reason as usize),
        };

        let revocation = api::Revocation::new(certificate, reason);

        let url = self.inner.api_directory.revoke_cert.as_str();
        let outcome = self
            .inner
            .transport
            .call_kid("revokeCert", url, &revocation)
            .await?;
        envelope::from_empty_response("revokeCert", outcome).await?;

        Ok(())
    }

    /// Returns a reference to the account's API object.
    ///
    /// Useful for debugging.
    pub fn api_account(&self) -> &api::Account {
        &self.inner.api_account
    }
}

/// Enumeration of reasons for revocation.
///
/// The reason codes are taken from [RFC 5280 §5.3.1].
///
/// [RFC 5280 §5.3.1]: https://tools.ietf.org/html/rfc5280#section-5.3.1
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CACompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    // value 7 is not used
    RemoveFromCRL = 8,
    PrivilegeWithdrawn = 9,
    AACompromise = 10,
}
