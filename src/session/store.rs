//! Keyed in-memory session record store
//!
//! One record per opaque session id (delivered via cookie). The store hands
//! out a single read-modify-write per request under one lock acquisition;
//! there is no cross-session shared mutable state, so no further locking is
//! needed. A record holds at most one pending login attempt; starting a new
//! login overwrites the previous attempt, which makes any stale callback fail
//! CSRF verification instead of silently succeeding.
//!
//! Only `with_record` creates records. Read and cleanup paths go through
//! `update_record`, which leaves unknown ids alone, so a flood of forged
//! callbacks cannot grow the map. Records idle past `RECORD_IDLE_HOURS` are
//! swept on the next write-lock access; the bound matches the session cookie
//! lifetime, so a swept record's cookie has expired with it.

use crate::models::{AuthenticatedUser, ResumeIntent};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// One in-flight login, identified by its state token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub state_token: String,
    pub created_at: DateTime<Utc>,
    pub resume_intent: Option<ResumeIntent>,
}

/// Records untouched for this long are dropped on the next sweep; matches
/// the session cookie's max age
const RECORD_IDLE_HOURS: i64 = 24;

/// Everything the server remembers about one browser session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// At most one pending login attempt at a time
    pub login_attempt: Option<LoginAttempt>,
    /// Opaque serialized token cache; only the provider client reads inside
    pub token_cache: Option<String>,
    pub user: Option<AuthenticatedUser>,
    /// Mock-mode authentication flag; live mode probes the token cache instead
    pub mock_authenticated: bool,
    /// Refreshed on every access; drives the idle sweep
    pub last_seen: DateTime<Utc>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            login_attempt: None,
            token_cache: None,
            user: None,
            mock_authenticated: false,
            last_seen: Utc::now(),
        }
    }
}

pub struct SessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
    attempt_ttl: Duration,
    record_idle_ttl: Duration,
}

impl SessionStore {
    /// `attempt_ttl_minutes` bounds how long an abandoned login attempt's
    /// state token stays verifiable
    #[must_use]
    pub fn new(attempt_ttl_minutes: i64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            attempt_ttl: Duration::minutes(attempt_ttl_minutes),
            record_idle_ttl: Duration::hours(RECORD_IDLE_HOURS),
        }
    }

    /// Mint a fresh opaque session id
    #[must_use]
    pub fn create_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn sweep_idle(&self, records: &mut HashMap<String, SessionRecord>) {
        let now = Utc::now();
        records.retain(|_, record| now - record.last_seen <= self.record_idle_ttl);
    }

    /// Run one read-modify-write against the session's record, creating an
    /// empty record when the id is unknown. Reserved for paths that
    /// legitimately establish session state (login start, token persistence).
    pub fn with_record<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        let mut records = self.records.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.sweep_idle(&mut records);
        let record = records.entry(session_id.to_string()).or_default();
        record.last_seen = Utc::now();
        f(record)
    }

    /// Like `with_record` but never creates a record: unknown ids return
    /// `None` and leave the map untouched
    pub fn update_record<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Option<R> {
        let mut records = self.records.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.sweep_idle(&mut records);
        let record = records.get_mut(session_id)?;
        record.last_seen = Utc::now();
        Some(f(record))
    }

    /// Snapshot of the session's record, if any
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.update_record(session_id, |record| record.clone())
    }

    /// The pending login attempt, unless it has expired. An expired attempt
    /// is removed and counts as absent, so its callback fails verification
    /// like any unknown attempt.
    #[must_use]
    pub fn pending_attempt(&self, session_id: &str) -> Option<LoginAttempt> {
        let ttl = self.attempt_ttl;
        self.update_record(session_id, |record| {
            let expired = record
                .login_attempt
                .as_ref()
                .is_some_and(|attempt| Utc::now() - attempt.created_at > ttl);
            if expired {
                record.login_attempt = None;
            }
            record.login_attempt.clone()
        })
        .flatten()
    }

    /// Pop the resume intent from the pending attempt: first call returns and
    /// clears it, a second call returns `None`
    #[must_use]
    pub fn take_resume_intent(&self, session_id: &str) -> Option<ResumeIntent> {
        self.update_record(session_id, |record| {
            record
                .login_attempt
                .as_mut()
                .and_then(|attempt| attempt.resume_intent.take())
        })
        .flatten()
    }

    /// Consume the pending attempt without touching the rest of the record;
    /// a no-op for unknown ids
    pub fn clear_attempt(&self, session_id: &str) {
        self.update_record(session_id, |record| {
            record.login_attempt = None;
        });
    }

    /// Drop every trace of the session
    pub fn clear(&self, session_id: &str) {
        let mut records = self.records.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.remove(session_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
