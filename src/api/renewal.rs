use serde::{Deserialize, Serialize};

/// Renewal information for an issued certificate (ACME ARI extension).
///
/// Looked up unauthenticated under the directory's `renewalInfo` URL using a
/// certificate identifier derived from the Authority Key Identifier and the
/// serial number.
///
/// # Example JSON
///
/// ```json
/// {
///   "suggestedWindow": {
///     "start": "2026-01-02T04:00:00Z",
///     "end": "2026-01-03T04:00:00Z"
///   },
///   "explanationURL": "https://example.com/docs/ari"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfo {
    /// The window during which the server recommends renewing the certificate.
    pub suggested_window: SuggestedWindow,

    /// Page explaining why the window was chosen, if the server provides one.
    #[serde(rename = "explanationURL", skip_serializing_if = "Option::is_none")]
    pub explanation_url: Option<String>,
}

/// Suggested renewal window, RFC 3339 timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedWindow {
    pub start: String,
    pub end: String,
}
