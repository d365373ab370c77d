use std::sync::Arc;

use crate::{
    acc::AccountKey,
    api,
    envelope::{self, CallResult},
    error::CallError,
    req::req_get,
    retry::{retry_until_ok, RetryPolicy},
    trans::Transport,
    util::renewal_identifier,
    Account,
};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// Entry point for accessing an ACME API.
///
/// The directory is fetched once and then shared read-only by every account
/// and order created from it. [`refetch()`][Directory::refetch] picks up new
/// URLs if the server publishes any.
#[derive(Debug, Clone)]
pub struct Directory {
    url: String,
    api_directory: Arc<api::Directory>,
    policy: RetryPolicy,
}

impl Directory {
    /// Fetches the directory object from an ACME API provider.
    pub async fn fetch(url: DirectoryUrl<'_>) -> Result<Directory, CallError> {
        Self::fetch_with(url, RetryPolicy::unauthenticated()).await
    }

    /// Fetches the directory object, retrying per the given policy.
    pub async fn fetch_with(
        url: DirectoryUrl<'_>,
        policy: RetryPolicy,
    ) -> Result<Directory, CallError> {
        let url = url.to_url().to_owned();
        let api_directory = Self::fetch_api_directory(&url, &policy).await?;

        Ok(Directory {
            url,
            api_directory: Arc::new(api_directory),
            policy,
        })
    }

    /// Re-fetches the directory object from the same URL.
    pub async fn refetch(&mut self) -> Result<(), CallError> {
        let api_directory = Self::fetch_api_directory(&self.url, &self.policy).await?;
        self.api_directory = Arc::new(api_directory);
        Ok(())
    }

    async fn fetch_api_directory(
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<api::Directory, CallError> {
        let outcome = retry_until_ok(policy, || req_get(url)).await;
        let resource = envelope::from_json_response::<api::Directory>("directory", outcome).await?;
        Ok(resource.data)
    }

    /// Creates an account with a fresh P-256 key.
    pub async fn register_account(
        &self,
        contact: Option<Vec<String>>,
    ) -> Result<Account, CallError> {
        self.upsert_account(AccountKey::generate(), contact).await
    }

    /// Creates or re-binds an account for an existing private key.
    pub async fn load_account(
        &self,
        private_key_pem: &str,
        contact: Option<Vec<String>>,
    ) -> Result<Account, CallError> {
        let key = AccountKey::from_pem(private_key_pem)
            .map_err(|err| CallError::exception("newAccount", err))?;
        self.upsert_account(key, contact).await
    }

    /// Binds to an account that must already exist for the given key.
    ///
    /// Sets `onlyReturnExisting`, so the server answers with an error instead
    /// of creating a new account when the key is unknown.
    pub async fn load_existing_account(&self, private_key_pem: &str) -> Result<Account, CallError> {
        let key = AccountKey::from_pem(private_key_pem)
            .map_err(|err| CallError::exception("newAccount", err))?;

        let acc = api::Account {
            only_return_existing: Some(true),
            ..Default::default()
        };

        self.account_call(key, acc).await
    }

    async fn upsert_account(
        &self,
        key: AccountKey,
        contact: Option<Vec<String>>,
    ) -> Result<Account, CallError> {
        // Making a call to newAccount is fine to do both for new keys and
        // existing ones. For existing the spec says to return a 200 with the
        // Location header set to the key ID (kid).
        let acc = api::Account {
            contact,
            terms_of_service_agreed: Some(true),
            ..Default::default()
        };

        self.account_call(key, acc).await
    }

    async fn account_call(&self, key: AccountKey, acc: api::Account) -> Result<Account, CallError> {
        let mut transport = Transport::new(&self.api_directory.new_nonce, key);

        let outcome = transport
            .call_jwk("newAccount", &self.api_directory.new_account, &acc)
            .await?;
        let resource = envelope::from_json_response::<api::Account>("newAccount", outcome).await?;

        // the account URL doubles as the key ID for all later calls
        let kid = resource.location.clone().ok_or_else(|| {
            CallError::exception("newAccount", "response had no Location header")
        })?;
        log::debug!("key ID is: {kid}");
        transport.set_key_id(kid);

        Ok(Account::new(
            transport,
            resource.data,
            Arc::clone(&self.api_directory),
        ))
    }

    /// Looks up renewal information (ARI) for an issued certificate.
    ///
    /// `aki_hex` is the hex form of the Authority Key Identifier of the
    /// certificate's issuer; `serial_hex` the hex form of its serial number.
    /// Both are converted to the base64url certificate identifier
    /// `base64url(AKI) "." base64url(serial)` appended to the directory's
    /// `renewalInfo` URL. The lookup is unauthenticated.
    pub async fn renewal_info(
        &self,
        aki_hex: &str,
        serial_hex: &str,
    ) -> CallResult<api::RenewalInfo> {
        let base = self.api_directory.renewal_info.as_deref().ok_or_else(|| {
            CallError::exception("renewalInfo", "directory has no renewalInfo URL")
        })?;

        let cert_id = renewal_identifier(aki_hex, serial_hex)
            .map_err(|err| CallError::exception("renewalInfo", err))?;
        let url = format!("{}/{cert_id}", base.trim_end_matches('/'));

        let outcome = retry_until_ok(&self.policy, || req_get(&url)).await;
        envelope::from_json_response("renewalInfo", outcome).await
    }

    /// Returns a reference to the directory's API object.
    ///
    /// Useful for debugging.
    pub fn api_directory(&self) -> &api::Directory {
        &self.api_directory
    }
}
