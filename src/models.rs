//! Core data types shared across the authentication flow
//!
//! This module provides the session-facing data structures (resume intents,
//! authenticated users) and the unified error type used by the session
//! authentication controller and the HTTP handlers.

use crate::oauth::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which meeting provider a protected page belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingSource {
    Zoom,
    Teams,
}

impl MeetingSource {
    /// Parse the `return_type` query value used by the login-start route
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "zoom" => Some(Self::Zoom),
            "teams" => Some(Self::Teams),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zoom => "zoom",
            Self::Teams => "teams",
        }
    }
}

impl fmt::Display for MeetingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The protected destination a user was trying to reach before being sent to
/// log in. Popped (read once) by the callback handler after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeIntent {
    pub source: MeetingSource,
    pub meeting_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ResumeIntent {
    /// The summary page this intent resumes to after login
    #[must_use]
    pub fn target_url(&self) -> String {
        format!(
            "/summary.html?type={}&id={}",
            self.source,
            urlencoding::encode(&self.meeting_id)
        )
    }
}

/// User identity derived once per login from the provider profile call and
/// cached in the session for the life of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub name: String,
    pub email: String,
}

/// Raw profile response from the identity provider's userinfo endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl From<UserProfile> for AuthenticatedUser {
    fn from(profile: UserProfile) -> Self {
        Self {
            name: profile.display_name.unwrap_or_else(|| "Unknown".to_string()),
            email: profile
                .mail
                .or(profile.user_principal_name)
                .unwrap_or_default(),
        }
    }
}

/// Unified error type for the authentication subsystem
///
/// Failures during login are per-attempt: the session returns to `Anonymous`
/// and the user can immediately retry with a fresh state token.
#[derive(Debug)]
pub enum AuthError {
    /// Provider credentials missing or malformed. Fatal for live-mode
    /// operations, never raised in mock mode.
    Configuration(String),
    /// The callback state did not match the expected state for this session
    CsrfMismatch { received: String, expected: String },
    /// Upstream identity-provider failure, carries the provider's own
    /// error code and description
    Provider(ProviderError),
    /// The provider redirected back without an authorization code
    NoAuthorizationCode,
    /// Expected control-flow signal for protected-route guards, not a bug
    NotAuthenticated,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            AuthError::CsrfMismatch { received, expected } => write!(
                f,
                "State mismatch error: received '{received}', expected '{expected}'"
            ),
            AuthError::Provider(err) => write!(f, "Authentication error: {err}"),
            AuthError::NoAuthorizationCode => write!(f, "No authorization code received"),
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Provider(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        AuthError::Provider(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_source_parse_round_trip() {
        assert_eq!(MeetingSource::parse("zoom"), Some(MeetingSource::Zoom));
        assert_eq!(MeetingSource::parse("teams"), Some(MeetingSource::Teams));
        assert_eq!(MeetingSource::parse("webex"), None);
        assert_eq!(MeetingSource::Zoom.as_str(), "zoom");
    }

    #[test]
    fn resume_intent_target_url() {
        let intent = ResumeIntent {
            source: MeetingSource::Teams,
            meeting_id: "m123".to_string(),
            email: None,
        };
        assert_eq!(intent.target_url(), "/summary.html?type=teams&id=m123");
    }

    #[test]
    fn user_from_profile_prefers_mail_over_upn() {
        let profile = UserProfile {
            display_name: Some("Ada Lovelace".to_string()),
            mail: Some("ada@example.com".to_string()),
            user_principal_name: Some("ada@corp.example.com".to_string()),
        };
        let user = AuthenticatedUser::from(profile);
        assert_eq!(user.email, "ada@example.com");

        let fallback = UserProfile {
            display_name: None,
            mail: None,
            user_principal_name: Some("ada@corp.example.com".to_string()),
        };
        let user = AuthenticatedUser::from(fallback);
        assert_eq!(user.name, "Unknown");
        assert_eq!(user.email, "ada@corp.example.com");
    }

    #[test]
    fn csrf_mismatch_message_carries_both_values() {
        let err = AuthError::CsrfMismatch {
            received: "abc".to_string(),
            expected: "xyz".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("xyz"));
    }
}
