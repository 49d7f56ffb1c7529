//! CSRF login state and its self-contained backup encoding
//!
//! The security boundary is the comparison between the state the provider
//! echoes back and the state this session generated. The backup blob exists
//! for a different problem: the session cookie can be dropped across the
//! cross-site redirect to and from the identity provider, taking the expected
//! state and the resume intent with it. The blob packs both into a URL-safe,
//! reversible encoding carried in a separate short-lived `SameSite=Lax`
//! cookie. It is deliberately NOT cryptographically authenticated; it is a
//! recovery channel, never a substitute for the state comparison itself.

use crate::models::{AuthError, ResumeIntent};
use crate::utils::crypto::constant_time_eq;
use base64::{engine::general_purpose, Engine as _};
use log::warn;
use serde::{Deserialize, Serialize};

/// The per-attempt login state: CSRF token plus the caller's resume intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_intent: Option<ResumeIntent>,
}

impl LoginState {
    #[must_use]
    pub fn new(state: String, resume_intent: Option<ResumeIntent>) -> Self {
        Self {
            state,
            resume_intent,
        }
    }

    /// Pack this state into the URL-safe backup blob
    ///
    /// Deterministic base64url-of-JSON. The plain state token, not this blob,
    /// is what goes into the provider-facing `state` parameter.
    #[must_use]
    pub fn encode_backup(&self) -> String {
        // Serialization of a plain struct with string fields cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    /// Reverse of [`encode_backup`](Self::encode_backup)
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CsrfMismatch` semantics are not used here; a blob
    /// that fails to decode yields `AuthError::Configuration` since it can
    /// only mean a corrupted or foreign cookie value.
    pub fn decode_backup(blob: &str) -> Result<Self, AuthError> {
        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(blob)
            .map_err(|e| AuthError::Configuration(format!("invalid backup state blob: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Configuration(format!("invalid backup state payload: {e}")))
    }
}

/// Verify the state echoed back by the provider against the expected state
///
/// Constant-time comparison. When `bypass` is set the check is skipped
/// entirely; that flag is a deliberate security downgrade for local debugging
/// of session-cookie problems, defaults off, and announces itself loudly on
/// every single bypass.
///
/// # Errors
///
/// Returns `AuthError::CsrfMismatch` carrying both values for diagnostics
pub fn verify_state(received: &str, expected: &str, bypass: bool) -> Result<(), AuthError> {
    if bypass {
        warn!(
            "BYPASS_STATE_CHECK is active: skipping CSRF state verification. \
             This disables CSRF protection and must never be enabled in production."
        );
        return Ok(());
    }
    if constant_time_eq(received, expected) {
        Ok(())
    } else {
        Err(AuthError::CsrfMismatch {
            received: received.to_string(),
            expected: expected.to_string(),
        })
    }
}
