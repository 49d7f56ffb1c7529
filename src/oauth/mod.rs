//! OAuth authentication module
//!
//! Wraps the identity-provider operations the session controller needs behind
//! a capability trait with a live (Microsoft identity platform) and a mock
//! implementation, plus the CSRF login state and the per-session token cache.

pub mod cache;
pub mod live;
pub mod mock;
pub mod state;

pub use cache::{CachedAccount, TokenCache};
pub use live::LiveProvider;
pub use mock::MockProvider;
pub use state::{verify_state, LoginState};

use crate::models::{AuthError, UserProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error reported by the identity provider, carrying the upstream error code
/// and description verbatim so callers can surface them to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: String,
    pub description: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Transport-level failure (connection refused, timeout, bad JSON)
    #[must_use]
    pub fn request_failed(description: impl Into<String>) -> Self {
        Self::new("request_failed", description)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.description)
        }
    }
}

impl std::error::Error for ProviderError {}

/// A cached account identity known to the token cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccount {
    /// Provider-assigned stable account id
    pub id: String,
    /// Sign-in name, usually the email address
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// One successful token acquisition (interactive exchange or silent refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Capability interface over the identity provider
///
/// The session controller only ever talks to the provider through this trait;
/// the mock implementation exercises the whole state machine without network
/// I/O.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the provider authorization URL carrying the requested scopes,
    /// the redirect target, and `state_token` verbatim
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` when provider credentials are
    /// missing (live mode only)
    fn login_url(&self, state_token: &str) -> Result<String, AuthError>;

    /// Exchange an authorization code for tokens, recording the resulting
    /// account in `cache`
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` on any non-success provider response,
    /// including a malformed or missing `access_token`
    async fn exchange_code(
        &self,
        auth_code: &str,
        cache: &mut TokenCache,
    ) -> Result<TokenGrant, ProviderError>;

    /// Attempt a non-interactive refresh for a previously cached account
    ///
    /// Returns `Ok(None)` when no valid refresh path exists; the caller must
    /// then fall back to a full interactive login.
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` only for transport-level failures
    async fn acquire_silent(
        &self,
        account: &ProviderAccount,
        cache: &mut TokenCache,
    ) -> Result<Option<TokenGrant>, ProviderError>;

    /// Read-only query of the accounts known to the cache
    fn list_accounts(&self, cache: &TokenCache) -> Vec<ProviderAccount>;

    /// Drop an account from the cache on logout; no-op when the provider has
    /// no session to revoke
    fn remove_account(&self, account: &ProviderAccount, cache: &mut TokenCache);

    /// Fetch the signed-in user's profile with a bearer token
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` on any non-success provider response
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ProviderError>;
}
