//! Order life cycle.
//!
//! An order goes through a life cycle of different states that require various actions by
//! the user. To ensure the user only use appropriate actions, this library have simple façade
//! structs that wraps the actual [`api::Order`].
//!
//! 1. First prove ownership:
//!    * [`NewOrder`] -> [`Auth`]* -> [`Challenge`]
//! 2. Then submit CSR and download the cert.
//!    * [`NewOrder`] -> [`CsrOrder`] -> [`CertOrder`]
//!
//! \* Possibly multiple auths.
//!
//! The server, not this library, is the source of truth for ordering:
//! finalizing an order that is not yet ready surfaces the server's
//! `orderNotReady` problem rather than a local check.

use std::{sync::Arc, time::Duration};

use ecdsa::SigningKey;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};

use crate::{
    acc::AccountInner,
    api::{self, Finalize},
    cert::{create_csr, Certificate},
    envelope,
    error::CallError,
    util::base64url,
};

mod auth;

pub use self::auth::{Auth, Challenge};

/// The order wrapped with an outer façade.
#[derive(Debug)]
pub(crate) struct Order {
    inner: Arc<AccountInner>,
    api_order: api::Order,
    url: String,
}

impl Order {
    pub(crate) fn new(inner: &Arc<AccountInner>, api_order: api::Order, url: String) -> Self {
        Order {
            inner: Arc::clone(inner),
            api_order,
            url,
        }
    }
}

/// Refreshes an order object from its URL (POST-as-GET).
async fn refresh_order(inner: &Arc<AccountInner>, url: String) -> Result<Order, CallError> {
    let outcome = inner.transport.post_as_get("orderStatus", &url).await?;
    let resource = envelope::from_json_response::<api::Order>("orderStatus", outcome).await?;

    Ok(Order {
        inner: Arc::clone(inner),
        api_order: resource.data,
        url,
    })
}

/// A new order created by [`Account::new_order`].
///
/// An order is created using one or many domains (a primary `CN` and possible multiple
/// alt names). All domains in the order must have authorizations (confirmed ownership)
/// before the order can progress to submitting a [CSR].
///
/// This order façade provides calls to provide such authorizations and to progress the order
/// when ready.
///
/// The ACME API provider might "remember" for a time that you already own a domain, which
/// means you might not need to prove the ownership every time. Use appropriate methods to
/// first check whether you really need to handle authorizations.
///
/// [`Account::new_order`]: crate::Account::new_order
/// [CSR]: https://en.wikipedia.org/wiki/Certificate_signing_request
pub struct NewOrder {
    pub(crate) order: Order,
}

impl NewOrder {
    /// Tell if the domains in this order have been authorized.
    ///
    /// This doesn't do any calls against the API. You must manually call [`refresh`].
    ///
    /// In ACME API terms, the order can either be `ready` or `valid`, which both would
    /// mean we have passed the authorization stage.
    ///
    /// [`refresh`]: NewOrder::refresh
    pub fn is_validated(&self) -> bool {
        self.order.api_order.is_status_ready() || self.order.api_order.is_status_valid()
    }

    /// If the order [`is_validated`] progress it to a [`CsrOrder`].
    ///
    /// This doesn't do any calls against the API. You must manually call [`refresh`].
    ///
    /// [`is_validated`]: NewOrder::is_validated
    pub fn confirm_validations(&self) -> Option<CsrOrder> {
        if self.is_validated() {
            Some(CsrOrder {
                order: Order::new(
                    &self.order.inner,
                    self.order.api_order.clone(),
                    self.order.url.clone(),
                ),
            })
        } else {
            None
        }
    }

    /// Refresh the order state against the ACME API.
    ///
    /// The specification calls this a "POST-as-GET" against the order URL.
    pub async fn refresh(&mut self) -> Result<(), CallError> {
        self.order = refresh_order(&self.order.inner, self.order.url.clone()).await?;
        Ok(())
    }

    /// Provide the authorizations. The number of authorizations will be the same as
    /// the number of domains requested, i.e. at least one (the primary CN), but possibly
    /// more (for alt names).
    ///
    /// If the order includes new domain names that have not been authorized before, this
    /// list might contain a mix of already valid and not yet valid auths.
    pub async fn authorizations(&self) -> Result<Vec<Auth>, CallError> {
        let mut result = vec![];

        if let Some(authorizations) = &self.order.api_order.authorizations {
            for auth_url in authorizations {
                let outcome = self
                    .order
                    .inner
                    .transport
                    .post_as_get("authorization", auth_url)
                    .await?;
                let resource =
                    envelope::from_json_response::<api::Authorization>("authorization", outcome)
                        .await?;

                result.push(Auth::new(&self.order.inner, resource.data, auth_url));
            }
        }

        Ok(result)
    }

    /// The URL of the order resource, from the `Location` header that created it.
    pub fn url(&self) -> &str {
        &self.order.url
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}

/// An order that is ready for a [CSR] submission.
///
/// To submit the CSR is called "finalizing" the order.
///
/// To finalize, the user supplies a private key (from which a public key is derived). This
/// library provides [functions to create private keys], but the user can opt for creating them
/// in some other way.
///
/// This library makes no attempt at validating which key algorithms are used. Unsupported
/// algorithms will show as an error when finalizing the order. It is up to the ACME API
/// provider to decide which key algorithms to support.
///
/// [CSR]: https://en.wikipedia.org/wiki/Certificate_signing_request
/// [functions to create private keys]: crate::create_p256_key
pub struct CsrOrder {
    pub(crate) order: Order,
}

impl CsrOrder {
    /// Finalize the order by providing a private key as PEM.
    ///
    /// Once the CSR has been submitted, the order goes into a `processing` status,
    /// where we must poll until the status changes. The `delay` is the
    /// amount of time to wait between each poll attempt.
    ///
    /// This is a convenience wrapper that in turn calls the lower level [`finalize_signing_key`].
    ///
    /// [`finalize_signing_key`]: CsrOrder::finalize_signing_key
    pub async fn finalize(
        self,
        private_key_pem: &str,
        delay: Duration,
    ) -> Result<CertOrder, CallError> {
        let signing_key = SigningKey::from_pkcs8_pem(private_key_pem)
            .map_err(|err| CallError::exception("finalize", err))?;
        self.finalize_signing_key(signing_key, delay).await
    }

    /// Lower level finalize call that works directly with a signing key.
    ///
    /// Creates the CSR for the domains in the order and submits it to the ACME API.
    ///
    /// Once the CSR has been submitted, the order goes into a `processing` status,
    /// where we must poll until the status changes. The `delay` is the
    /// amount of time to wait between each poll attempt.
    pub async fn finalize_signing_key(
        self,
        signing_key: p256::ecdsa::SigningKey,
        delay: Duration,
    ) -> Result<CertOrder, CallError> {
        // the domains that we have authorized
        let domains = self.order.api_order.domains();

        // csr from the private key and authorized domains, as DER (not PEM)
        let csr_der = create_csr(&signing_key, &domains)
            .map_err(|err| CallError::exception("finalize", err))?;
        let finalize = Finalize::new(base64url(&csr_der));

        let inner = self.order.inner;
        let order_url = self.order.url;
        let finalize_url = &self.order.api_order.finalize;

        // an invalid CSR comes back as a 4xx problem document here
        let outcome = inner
            .transport
            .call_kid("finalize", finalize_url, &finalize)
            .await?;
        envelope::from_json_response::<api::Order>("finalize", outcome).await?;

        // wait for the status to leave processing.
        // valid -> cert is issued
        // invalid -> the whole thing is off
        let order = wait_for_order_status(&inner, &order_url, delay).await?;

        if !order.api_order.is_status_valid() {
            return Err(CallError::exception(
                "finalize",
                format!("order is in status: {:?}", order.api_order.status),
            ));
        }

        Ok(CertOrder { signing_key, order })
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}

async fn wait_for_order_status(
    inner: &Arc<AccountInner>,
    url: &str,
    delay: Duration,
) -> Result<Order, CallError> {
    loop {
        let order = refresh_order(inner, url.to_owned()).await?;
        if !order.api_order.is_status_processing() {
            return Ok(order);
        }
        tokio::time::sleep(delay).await;
    }
}

/// Order for an issued certificate that is ready to download.
pub struct CertOrder {
    signing_key: p256::ecdsa::SigningKey,
    order: Order,
}

impl CertOrder {
    /// Request download of the issued certificate.
    pub async fn download_cert(self) -> Result<Certificate, CallError> {
        let url = self.order.api_order.certificate.ok_or_else(|| {
            CallError::exception("certificate", "order has no certificate URL")
        })?;

        let inner = self.order.inner;

        let outcome = inner.transport.post_as_get("certificate", &url).await?;
        let resource = envelope::from_text_response("certificate", outcome).await?;

        let signing_key_pem = self
            .signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .map_err(|err| CallError::exception("certificate", err))?;

        Ok(Certificate::new(signing_key_pem, resource.data))
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}
