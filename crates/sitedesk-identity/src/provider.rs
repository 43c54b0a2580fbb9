//! Seam for the external identity provider.

use async_trait::async_trait;
use thiserror::Error;

/// Identity provider failure surfaced to the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider sign-out failed: {0}")]
    SignOut(String),

    #[error("provider token fetch failed: {0}")]
    TokenFetch(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Operations the session layer delegates back to the identity provider.
///
/// Load and sign-in state arrive separately as
/// [`ProviderSignals`](crate::snapshot::ProviderSignals) values; sign-in
/// itself (UI, token issuance, multi-factor) lives entirely on the
/// provider's side.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Fetches a short-lived token for attaching credentials to a request.
    async fn fetch_token(&self) -> Result<String, ProviderError>;
}
