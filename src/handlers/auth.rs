//! Authentication handlers: login start, callback, logout, status, and the
//! mock login pair used in mock mode

use crate::models::{AuthError, MeetingSource, ResumeIntent};
use crate::oauth::mock::MOCK_LOGIN_PATH;
use crate::session::cookie::{
    backup_blob_from_request, backup_cookie, expired_cookie, session_cookie,
    session_id_from_request, BACKUP_COOKIE, SESSION_COOKIE,
};
use crate::session::{CallbackParams, SessionManager, SessionStore};
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{debug, error, info};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub email: Option<String>,
    pub return_type: Option<String>,
    pub return_id: Option<String>,
}

impl LoginQuery {
    /// The protected destination to resume after login, when the caller
    /// named one
    fn resume_intent(&self) -> Option<ResumeIntent> {
        let source = MeetingSource::parse(self.return_type.as_deref()?)?;
        let meeting_id = self.return_id.clone()?;
        Some(ResumeIntent {
            source,
            meeting_id,
            email: self.email.clone(),
        })
    }
}

/// Reuse the session named by the cookie, or mint a fresh id
fn session_id_or_new(req: &HttpRequest) -> String {
    session_id_from_request(req).unwrap_or_else(SessionStore::create_session_id)
}

/// `GET /auth/login` — initiate the login flow
///
/// Registers a fresh login attempt and redirects to the provider (or the
/// local mock login page). The backup blob rides along in its own Lax cookie
/// so the callback can recover if the session cookie is lost across the
/// provider redirect.
pub async fn auth_login(
    query: web::Query<LoginQuery>,
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let session_id = session_id_or_new(&req);
    let intent = query.resume_intent();
    if let Some(intent) = &intent {
        debug!(
            "Login will resume to {} meeting {}",
            intent.source, intent.meeting_id
        );
    }

    match manager.begin_login(&session_id, intent) {
        Ok(start) => {
            info!("Redirecting to login: {}", start.redirect_url);
            Ok(HttpResponse::Found()
                .cookie(session_cookie(&session_id, manager.cookie_secure()))
                .cookie(backup_cookie(start.backup_blob, manager.cookie_secure()))
                .append_header(("Location", start.redirect_url))
                .finish())
        }
        Err(e) => {
            error!("Failed to start login: {e}");
            Ok(HttpResponse::InternalServerError().body(e.to_string()))
        }
    }
}

/// `GET|POST /auth/callback` — the provider redirect target
///
/// Accepts the parameters via query or form post; verifies state, exchanges
/// the code, and redirects to the resumed destination or home. CSRF and
/// provider failures surface as 400 with a human-readable message and an
/// immediately retryable session.
pub async fn auth_callback(
    query: web::Query<CallbackParams>,
    form: Option<web::Form<CallbackParams>>,
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    if manager.is_mock() {
        return Ok(HttpResponse::Found()
            .append_header(("Location", MOCK_LOGIN_PATH))
            .finish());
    }

    let params = form.map_or_else(|| query.into_inner(), web::Form::into_inner);
    let session_id = session_id_or_new(&req);
    let backup_blob = backup_blob_from_request(&req);
    let secure = manager.cookie_secure();

    match manager
        .complete_callback(&session_id, params, backup_blob.as_deref())
        .await
    {
        Ok(target) => Ok(HttpResponse::Found()
            .cookie(session_cookie(&session_id, secure))
            .cookie(expired_cookie(BACKUP_COOKIE, secure))
            .append_header(("Location", target))
            .finish()),
        Err(e) => {
            error!("Login callback failed: {e}");
            let response = match e {
                AuthError::Configuration(_) => HttpResponse::InternalServerError(),
                _ => HttpResponse::BadRequest(),
            };
            Ok(response_with_cleared_backup(response, &e, secure))
        }
    }
}

fn response_with_cleared_backup(
    mut builder: actix_web::HttpResponseBuilder,
    error: &AuthError,
    secure: bool,
) -> HttpResponse {
    builder
        .cookie(expired_cookie(BACKUP_COOKIE, secure))
        .body(error.to_string())
}

/// `GET /auth/logout` — clear the session and send the browser home
pub async fn auth_logout(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    if let Some(session_id) = session_id_from_request(&req) {
        manager.logout(&session_id).await;
    }
    let secure = manager.cookie_secure();
    Ok(HttpResponse::Found()
        .cookie(expired_cookie(SESSION_COOKIE, secure))
        .cookie(expired_cookie(BACKUP_COOKIE, secure))
        .append_header(("Location", "/"))
        .finish())
}

/// `GET /auth/status` — authentication state for the front end
pub async fn auth_status(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let Some(session_id) = session_id_from_request(&req) else {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "authenticated": false })));
    };

    if manager.is_authenticated(&session_id).await {
        Ok(HttpResponse::Ok().json(serde_json::json!({
            "authenticated": true,
            "user": manager.current_user(&session_id),
        })))
    } else {
        Ok(HttpResponse::Ok().json(serde_json::json!({ "authenticated": false })))
    }
}

/// `GET /auth/mock-login` — local stand-in for the provider's login page
pub async fn mock_login(manager: web::Data<SessionManager>) -> Result<HttpResponse> {
    if !manager.is_mock() {
        return Ok(HttpResponse::Found()
            .append_header(("Location", "/auth/login"))
            .finish());
    }
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(
            "<!DOCTYPE html>\
             <html><head><title>Mock Sign In</title></head>\
             <body><h1>Mock Microsoft Sign In</h1>\
             <form method=\"post\" action=\"/auth/mock-callback\">\
             <button type=\"submit\">Sign in as Mock User</button>\
             </form></body></html>",
        ))
}

/// `POST /auth/mock-callback` — complete a mock login
pub async fn mock_callback(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    if !manager.is_mock() {
        return Ok(HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": "Mock authentication not available" })));
    }

    let session_id = session_id_or_new(&req);
    match manager.complete_mock_login(&session_id).await {
        Ok(redirect) => Ok(HttpResponse::Ok()
            .cookie(session_cookie(&session_id, manager.cookie_secure()))
            .json(serde_json::json!({ "success": true, "redirect": redirect }))),
        Err(e) => {
            error!("Mock login failed: {e}");
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": e.to_string() })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::MockProvider;
    use actix_web::{http::StatusCode, test, web::Data, App};
    use std::sync::Arc;

    fn mock_manager() -> SessionManager {
        SessionManager::new(
            Arc::new(SessionStore::new(10)),
            Arc::new(MockProvider::new()),
            true,
            false,
            false,
        )
    }

    // Live-mode flags over the deterministic provider, so the callback
    // handler runs its real verification path without any network
    fn live_manager() -> SessionManager {
        SessionManager::new(
            Arc::new(SessionStore::new(10)),
            Arc::new(MockProvider::new()),
            false,
            false,
            false,
        )
    }

    fn app_data() -> Data<SessionManager> {
        Data::new(mock_manager())
    }

    #[actix_web::test]
    async fn login_redirects_to_mock_page_with_cookies() {
        let app = test::init_service(
            App::new()
                .app_data(app_data())
                .route("/auth/login", web::get().to(auth_login)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/auth/login?email=u@example.com&return_type=teams&return_id=m123")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers().get("Location").unwrap().to_str().unwrap();
        assert_eq!(location, MOCK_LOGIN_PATH);

        let cookies: Vec<_> = resp.response().cookies().collect();
        assert!(cookies.iter().any(|c| c.name() == SESSION_COOKIE));
        assert!(cookies.iter().any(|c| c.name() == BACKUP_COOKIE));
    }

    #[actix_web::test]
    async fn status_is_unauthenticated_without_session() {
        let app = test::init_service(
            App::new()
                .app_data(app_data())
                .route("/auth/status", web::get().to(auth_status)),
        )
        .await;

        let req = test::TestRequest::get().uri("/auth/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["authenticated"], false);
    }

    #[actix_web::test]
    async fn mock_login_flow_flips_status() {
        let data = app_data();
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/auth/status", web::get().to(auth_status))
                .route("/auth/mock-callback", web::post().to(mock_callback)),
        )
        .await;

        let req = test::TestRequest::post().uri("/auth/mock-callback").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let session = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie set")
            .into_owned();

        let req = test::TestRequest::get()
            .uri("/auth/status")
            .cookie(session)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["user"]["email"], "user@example.com");
    }

    #[actix_web::test]
    async fn callback_with_mismatched_state_is_bad_request_with_message() {
        let manager = live_manager();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(manager.clone()))
                .route("/auth/callback", web::get().to(auth_callback)),
        )
        .await;

        let session_id = SessionStore::create_session_id();
        manager.begin_login(&session_id, None).unwrap();

        let req = test::TestRequest::get()
            .uri("/auth/callback?state=forged-state&code=mock_code")
            .cookie(session_cookie(&session_id, false))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let cleared_backup = resp
            .response()
            .cookies()
            .find(|c| c.name() == BACKUP_COOKIE)
            .expect("backup cookie cleared")
            .into_owned();
        assert_eq!(
            cleared_backup.max_age(),
            Some(actix_web::cookie::time::Duration::seconds(0))
        );

        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("State mismatch error"));
    }

    #[actix_web::test]
    async fn callback_without_code_is_bad_request() {
        let manager = live_manager();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(manager.clone()))
                .route("/auth/callback", web::get().to(auth_callback)),
        )
        .await;

        let session_id = SessionStore::create_session_id();
        manager.begin_login(&session_id, None).unwrap();

        let req = test::TestRequest::get()
            .uri("/auth/callback")
            .cookie(session_cookie(&session_id, false))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("No authorization code received"));
    }

    #[actix_web::test]
    async fn logout_is_idempotent() {
        let data = app_data();
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/auth/logout", web::get().to(auth_logout)),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/auth/logout").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FOUND);
            assert_eq!(resp.headers().get("Location").unwrap(), "/");
        }
    }
}
