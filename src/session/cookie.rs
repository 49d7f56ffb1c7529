//! Cookie helpers for the session id and the login backup blob
//!
//! Both cookies are `SameSite=Lax`. The redirect back from the identity
//! provider is a top-level cross-site navigation, and browsers withhold
//! `Strict` cookies on exactly that request; the session cookie has to ride
//! it or every callback would arrive without its session and the primary
//! state check could never fire. `Lax` still blocks the cross-site POST and
//! subresource vectors CSRF cares about; the state comparison covers the
//! rest.
//!
//! `recapd_login_backup` is the short-lived recovery channel for sessions
//! that are genuinely gone at callback time (cookies cleared mid-login,
//! fresh browser profile, an intermediary eating the session cookie).

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

pub const SESSION_COOKIE: &str = "recapd_session";
pub const BACKUP_COOKIE: &str = "recapd_login_backup";

/// How long the backup blob stays around; matches the login-attempt TTL
const BACKUP_COOKIE_MINUTES: i64 = 10;

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Strict,
            max_age: Duration::hours(24),
        }
    }
}

fn build_cookie(name: &str, value: String, options: &CookieOptions) -> Cookie<'static> {
    Cookie::build(name.to_string(), value)
        .http_only(options.http_only)
        .secure(options.secure)
        .same_site(options.same_site)
        .path("/")
        .max_age(options.max_age)
        .finish()
}

/// The session id cookie
///
/// `Lax`, not `Strict`: it must survive the top-level redirect back from
/// the identity provider or the callback can never find its session
#[must_use]
pub fn session_cookie(session_id: &str, secure: bool) -> Cookie<'static> {
    build_cookie(
        SESSION_COOKIE,
        session_id.to_string(),
        &CookieOptions {
            secure,
            same_site: SameSite::Lax,
            ..CookieOptions::default()
        },
    )
}

/// The short-lived, Lax backup-blob cookie set at login start
#[must_use]
pub fn backup_cookie(blob: String, secure: bool) -> Cookie<'static> {
    build_cookie(
        BACKUP_COOKIE,
        blob,
        &CookieOptions {
            secure,
            same_site: SameSite::Lax,
            max_age: Duration::minutes(BACKUP_COOKIE_MINUTES),
            ..CookieOptions::default()
        },
    )
}

/// An expired cookie that clears `name` on the client
#[must_use]
pub fn expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    build_cookie(
        name,
        String::new(),
        &CookieOptions {
            secure,
            same_site: SameSite::Lax,
            max_age: Duration::seconds(0),
            ..CookieOptions::default()
        },
    )
}

/// Extract the session id from the request, if the cookie is present
#[must_use]
pub fn session_id_from_request(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Extract the backup blob from the request, if the cookie survived
#[must_use]
pub fn backup_blob_from_request(req: &HttpRequest) -> Option<String> {
    req.cookie(BACKUP_COOKIE).map(|c| c.value().to_string())
}
