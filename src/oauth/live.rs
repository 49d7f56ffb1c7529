//! Live identity-provider client for the Microsoft identity platform
//!
//! Talks to the v2.0 authorize/token endpoints under the configured authority
//! and to Microsoft Graph for the profile call. All requests run with a
//! bounded timeout; a timeout surfaces as a `ProviderError` like any other
//! upstream failure.

use crate::models::{AuthError, UserProfile};
use crate::oauth::{IdentityProvider, ProviderAccount, ProviderError, TokenCache, TokenGrant};
use crate::settings::ProviderSettings;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;

/// Bound on every provider network call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const GRAPH_PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Scopes the authorization request always carries on top of the configured
/// delegated permissions; `offline_access` is what makes silent refresh work
const BASE_SCOPES: &str = "openid profile offline_access";

#[derive(Clone)]
pub struct LiveProvider {
    client_id: String,
    client_secret: String,
    authority: String,
    redirect_uri: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

/// Token endpoint response; error and success fields are both optional
/// because the provider returns 200/400 with either shape
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl LiveProvider {
    /// Build a live client from provider settings
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` when the client id or secret is
    /// missing, or the HTTP client cannot be constructed
    pub fn new(settings: &ProviderSettings) -> Result<Self, AuthError> {
        if settings.client_id.is_empty() || settings.client_secret.is_empty() {
            return Err(AuthError::Configuration(
                "Microsoft credentials not configured (MICROSOFT_CLIENT_ID / MICROSOFT_CLIENT_SECRET)"
                    .to_string(),
            ));
        }
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            authority: settings.authority.trim_end_matches('/').to_string(),
            redirect_uri: settings.redirect_uri.clone(),
            scopes: settings.scopes.clone(),
            http_client,
        })
    }

    fn authorize_url(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority)
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    fn scope_param(&self) -> String {
        format!("{} {}", BASE_SCOPES, self.scopes.join(" "))
    }

    async fn post_token_request(
        &self,
        params: &HashMap<&str, &str>,
    ) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http_client
            .post(self.token_url())
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(format!("token request failed: {e}")))?;

        // The identity platform reports errors in the JSON body on both
        // success and failure status codes
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::request_failed(format!("failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::request_failed(format!("invalid token response: {e}")))
    }

    fn grant_from_response(response: TokenResponse) -> Result<TokenGrant, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::new(
                error,
                response.error_description.unwrap_or_default(),
            ));
        }
        let Some(access_token) = response.access_token.filter(|t| !t.is_empty()) else {
            return Err(ProviderError::new(
                "invalid_response",
                "token response contained no access_token",
            ));
        };
        Ok(TokenGrant {
            access_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: response.expires_in.unwrap_or(3600),
            refresh_token: response.refresh_token,
            scope: response.scope,
        })
    }

    /// Derive the cache account identity from the unverified ID token payload
    ///
    /// The claims are only used as a cache key and display hint, never as an
    /// authorization decision, so skipping signature verification is fine
    /// here.
    fn account_from_id_token(id_token: Option<&str>) -> ProviderAccount {
        let claims = id_token.and_then(|token| {
            let payload = token.split('.').nth(1)?;
            let bytes = general_purpose::URL_SAFE_NO_PAD
                .decode(payload)
                .or_else(|_| general_purpose::STANDARD.decode(payload))
                .ok()?;
            serde_json::from_slice::<serde_json::Value>(&bytes).ok()
        });
        let claim = |name: &str| -> Option<String> {
            claims
                .as_ref()
                .and_then(|c| c.get(name))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        ProviderAccount {
            id: claim("oid")
                .or_else(|| claim("sub"))
                .unwrap_or_else(|| "primary-account".to_string()),
            username: claim("preferred_username").unwrap_or_default(),
            display_name: claim("name"),
        }
    }
}

#[async_trait]
impl IdentityProvider for LiveProvider {
    fn login_url(&self, state_token: &str) -> Result<String, AuthError> {
        let mut url = url::Url::parse(&self.authorize_url())
            .map_err(|e| AuthError::Configuration(format!("invalid authority URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scope_param())
            .append_pair("state", state_token);
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        auth_code: &str,
        cache: &mut TokenCache,
    ) -> Result<TokenGrant, ProviderError> {
        let scope = self.scope_param();
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", auth_code);
        params.insert("redirect_uri", self.redirect_uri.as_str());
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("scope", scope.as_str());

        debug!("Exchanging authorization code at {}", self.token_url());
        let response = self.post_token_request(&params).await?;
        let id_token = response.id_token.clone();
        let grant = Self::grant_from_response(response)?;

        let account = Self::account_from_id_token(id_token.as_deref());
        info!("Token acquired for account {}", account.username);
        cache.upsert(account, &grant, Utc::now());
        Ok(grant)
    }

    async fn acquire_silent(
        &self,
        account: &ProviderAccount,
        cache: &mut TokenCache,
    ) -> Result<Option<TokenGrant>, ProviderError> {
        let now = Utc::now();
        let Some(cached) = cache.find(&account.id) else {
            return Ok(None);
        };

        if cached.access_token_valid(now) {
            debug!("Cached access token for {} still valid", account.username);
            return Ok(Some(TokenGrant {
                access_token: cached.access_token.clone(),
                token_type: "Bearer".to_string(),
                expires_in: (cached.expires_at - now).num_seconds(),
                refresh_token: None,
                scope: None,
            }));
        }

        let Some(refresh_token) = cached.refresh_token.clone() else {
            debug!("No refresh token cached for {}", account.username);
            return Ok(None);
        };

        let scope = self.scope_param();
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token.as_str());
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("scope", scope.as_str());

        debug!("Refreshing access token for {}", account.username);
        let response = self.post_token_request(&params).await?;
        match Self::grant_from_response(response) {
            Ok(grant) => {
                cache.upsert(account.clone(), &grant, now);
                Ok(Some(grant))
            }
            Err(e) => {
                // Revoked consent, expired refresh token and the like: not an
                // error, just no silent path left
                debug!("Silent refresh declined by provider: {e}");
                Ok(None)
            }
        }
    }

    fn list_accounts(&self, cache: &TokenCache) -> Vec<ProviderAccount> {
        cache.accounts().iter().map(|c| c.account.clone()).collect()
    }

    fn remove_account(&self, account: &ProviderAccount, cache: &mut TokenCache) {
        cache.remove(&account.id);
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ProviderError> {
        let response = self
            .http_client
            .get(GRAPH_PROFILE_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(format!("profile request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                "profile_fetch_failed",
                format!("profile request returned {status}: {body}"),
            ));
        }
        response
            .json::<UserProfile>()
            .await
            .map_err(|e| ProviderError::request_failed(format!("invalid profile response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProviderSettings;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            authority: "https://login.microsoftonline.com/common/".to_string(),
            redirect_uri: "http://localhost:5001/auth/callback".to_string(),
            scopes: vec!["User.Read".to_string(), "Chat.ReadWrite".to_string()],
        }
    }

    #[test]
    fn new_requires_credentials() {
        let mut incomplete = settings();
        incomplete.client_secret = String::new();
        assert!(matches!(
            LiveProvider::new(&incomplete),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn login_url_carries_state_verbatim_and_scopes() {
        let provider = LiveProvider::new(&settings()).unwrap();
        let url = provider.login_url("state-abc_123").unwrap();
        assert!(url.starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize?"));
        assert!(url.contains("state=state-abc_123"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("offline_access"));
        assert!(url.contains("User.Read"));
    }

    #[test]
    fn grant_from_response_surfaces_provider_error() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"AADSTS70008: expired"}"#,
        )
        .unwrap();
        let err = LiveProvider::grant_from_response(response).unwrap_err();
        assert_eq!(err.code, "invalid_grant");
        assert!(err.description.contains("AADSTS70008"));
    }

    #[test]
    fn grant_from_response_rejects_missing_access_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"token_type":"Bearer","expires_in":3599}"#).unwrap();
        let err = LiveProvider::grant_from_response(response).unwrap_err();
        assert_eq!(err.code, "invalid_response");
    }

    #[test]
    fn account_identity_from_unverified_id_token() {
        // {"oid":"oid-1","preferred_username":"u@example.com","name":"U"}
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(
            r#"{"oid":"oid-1","preferred_username":"u@example.com","name":"U"}"#,
        );
        let token = format!("header.{payload}.sig");
        let account = LiveProvider::account_from_id_token(Some(&token));
        assert_eq!(account.id, "oid-1");
        assert_eq!(account.username, "u@example.com");
        assert_eq!(account.display_name.as_deref(), Some("U"));

        let fallback = LiveProvider::account_from_id_token(None);
        assert_eq!(fallback.id, "primary-account");
    }
}
