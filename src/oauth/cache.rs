//! Serializable per-session token cache
//!
//! The session store holds the cache only as an opaque string; this codec is
//! the single place that knows its structure. Mutations flip a dirty flag so
//! callers persist the blob back to the session only when something actually
//! changed.

use crate::oauth::{ProviderAccount, TokenGrant};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Clock skew allowance when deciding whether a cached access token is still
/// usable without a refresh
const EXPIRY_SKEW_SECONDS: i64 = 300;

/// One account's credential material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAccount {
    pub account: ProviderAccount,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl CachedAccount {
    /// Whether the cached access token can be handed out without a refresh
    #[must_use]
    pub fn access_token_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS) > now
    }
}

/// Serializable token cache, one per session
#[derive(Debug, Default)]
pub struct TokenCache {
    accounts: Vec<CachedAccount>,
    state_changed: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CachePayload {
    accounts: Vec<CachedAccount>,
}

impl TokenCache {
    /// Rebuild a cache from the session's blob; a missing or corrupt blob
    /// yields a fresh empty cache rather than an error
    #[must_use]
    pub fn deserialize(blob: Option<&str>) -> Self {
        let accounts = blob
            .and_then(|raw| serde_json::from_str::<CachePayload>(raw).ok())
            .map(|payload| payload.accounts)
            .unwrap_or_default();
        Self {
            accounts,
            state_changed: false,
        }
    }

    /// Serialize the cache for persistence in the session record
    #[must_use]
    pub fn serialize(&self) -> String {
        let payload = CachePayload {
            accounts: self.accounts.clone(),
        };
        serde_json::to_string(&payload).unwrap_or_else(|_| "{\"accounts\":[]}".to_string())
    }

    /// Whether any mutation happened since deserialization; gates persistence
    #[must_use]
    pub fn has_state_changed(&self) -> bool {
        self.state_changed
    }

    #[must_use]
    pub fn accounts(&self) -> &[CachedAccount] {
        &self.accounts
    }

    #[must_use]
    pub fn find(&self, account_id: &str) -> Option<&CachedAccount> {
        self.accounts.iter().find(|c| c.account.id == account_id)
    }

    /// Insert or replace the entry for `account` with a fresh grant
    pub fn upsert(&mut self, account: ProviderAccount, grant: &TokenGrant, now: DateTime<Utc>) {
        let entry = CachedAccount {
            expires_at: now + Duration::seconds(grant.expires_in),
            access_token: grant.access_token.clone(),
            // A refresh response may omit the refresh token; keep the old one
            refresh_token: grant
                .refresh_token
                .clone()
                .or_else(|| self.find(&account.id).and_then(|c| c.refresh_token.clone())),
            account,
        };
        if let Some(existing) = self
            .accounts
            .iter_mut()
            .find(|c| c.account.id == entry.account.id)
        {
            *existing = entry;
        } else {
            self.accounts.push(entry);
        }
        self.state_changed = true;
    }

    /// Remove an account's credentials; no-op (and no dirty flag) when the
    /// account is not present
    pub fn remove(&mut self, account_id: &str) {
        let before = self.accounts.len();
        self.accounts.retain(|c| c.account.id != account_id);
        if self.accounts.len() != before {
            self.state_changed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> ProviderAccount {
        ProviderAccount {
            id: "acct-1".to_string(),
            username: "user@example.com".to_string(),
            display_name: Some("Test User".to_string()),
        }
    }

    fn grant(refresh: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            refresh_token: refresh.map(str::to_string),
            scope: None,
        }
    }

    #[test]
    fn fresh_cache_from_missing_or_corrupt_blob() {
        assert!(TokenCache::deserialize(None).accounts().is_empty());
        assert!(TokenCache::deserialize(Some("{not json"))
            .accounts()
            .is_empty());
        assert!(!TokenCache::deserialize(Some("{not json")).has_state_changed());
    }

    #[test]
    fn serialize_round_trips_accounts() {
        let mut cache = TokenCache::default();
        cache.upsert(account(), &grant(Some("refresh")), Utc::now());
        assert!(cache.has_state_changed());

        let restored = TokenCache::deserialize(Some(&cache.serialize()));
        assert!(!restored.has_state_changed());
        assert_eq!(restored.accounts().len(), 1);
        assert_eq!(restored.accounts()[0].account, account());
        assert_eq!(
            restored.accounts()[0].refresh_token.as_deref(),
            Some("refresh")
        );
    }

    #[test]
    fn upsert_preserves_refresh_token_when_response_omits_it() {
        let mut cache = TokenCache::default();
        cache.upsert(account(), &grant(Some("original-refresh")), Utc::now());
        cache.upsert(account(), &grant(None), Utc::now());
        assert_eq!(cache.accounts().len(), 1);
        assert_eq!(
            cache.accounts()[0].refresh_token.as_deref(),
            Some("original-refresh")
        );
    }

    #[test]
    fn remove_only_dirties_on_actual_removal() {
        let mut cache = TokenCache::deserialize(None);
        cache.remove("missing");
        assert!(!cache.has_state_changed());

        cache.upsert(account(), &grant(None), Utc::now());
        let mut cache = TokenCache::deserialize(Some(&cache.serialize()));
        cache.remove("acct-1");
        assert!(cache.has_state_changed());
        assert!(cache.accounts().is_empty());
    }

    #[test]
    fn access_token_validity_honors_skew() {
        let now = Utc::now();
        let mut cache = TokenCache::default();
        cache.upsert(account(), &grant(None), now);
        // 3600s lifetime minus 300s skew is still in the future
        assert!(cache.accounts()[0].access_token_valid(now));
        // 200s lifetime is inside the skew window
        let mut short = TokenCache::default();
        let mut g = grant(None);
        g.expires_in = 200;
        short.upsert(account(), &g, now);
        assert!(!short.accounts()[0].access_token_valid(now));
    }
}
