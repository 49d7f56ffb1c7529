//! Deterministic mock identity provider
//!
//! Returns canned tokens and a canned profile without any network I/O so the
//! whole login state machine can be exercised in tests and local development.

use crate::models::{AuthError, UserProfile};
use crate::oauth::{IdentityProvider, ProviderAccount, ProviderError, TokenCache, TokenGrant};
use async_trait::async_trait;
use chrono::Utc;

pub const MOCK_ACCESS_TOKEN: &str = "mock_access_token_delegated";
pub const MOCK_REFRESHED_ACCESS_TOKEN: &str = "mock_access_token_delegated_refreshed";
pub const MOCK_REFRESH_TOKEN: &str = "mock_refresh_token";
pub const MOCK_AUTH_CODE: &str = "mock_code";

/// Local stand-in for the provider's hosted login page
pub const MOCK_LOGIN_PATH: &str = "/auth/mock-login";

#[derive(Debug, Clone, Default)]
pub struct MockProvider;

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn mock_account() -> ProviderAccount {
        ProviderAccount {
            id: "mock_user_123".to_string(),
            username: "user@example.com".to_string(),
            display_name: Some("Mock User".to_string()),
        }
    }

    fn grant(access_token: &str, with_refresh: bool) -> TokenGrant {
        TokenGrant {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            refresh_token: with_refresh.then(|| MOCK_REFRESH_TOKEN.to_string()),
            scope: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    fn login_url(&self, _state_token: &str) -> Result<String, AuthError> {
        // Handled by the local mock login page, no state round-trip needed
        Ok(MOCK_LOGIN_PATH.to_string())
    }

    async fn exchange_code(
        &self,
        _auth_code: &str,
        cache: &mut TokenCache,
    ) -> Result<TokenGrant, ProviderError> {
        let grant = Self::grant(MOCK_ACCESS_TOKEN, true);
        cache.upsert(Self::mock_account(), &grant, Utc::now());
        Ok(grant)
    }

    async fn acquire_silent(
        &self,
        _account: &ProviderAccount,
        cache: &mut TokenCache,
    ) -> Result<Option<TokenGrant>, ProviderError> {
        let grant = Self::grant(MOCK_REFRESHED_ACCESS_TOKEN, false);
        cache.upsert(Self::mock_account(), &grant, Utc::now());
        Ok(Some(grant))
    }

    fn list_accounts(&self, _cache: &TokenCache) -> Vec<ProviderAccount> {
        vec![Self::mock_account()]
    }

    fn remove_account(&self, account: &ProviderAccount, cache: &mut TokenCache) {
        cache.remove(&account.id);
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile, ProviderError> {
        Ok(UserProfile {
            display_name: Some("Mock User".to_string()),
            mail: Some("user@example.com".to_string()),
            user_principal_name: Some("user@example.com".to_string()),
        })
    }
}
