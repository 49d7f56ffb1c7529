//! HTTP request handlers

pub mod auth;

pub use auth::{
    auth_callback, auth_login, auth_logout, auth_status, mock_callback, mock_login,
};

use actix_web::HttpResponse;

/// Health check endpoint
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

/// Minimal landing page; the default resume target after login
pub async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(
            "<!DOCTYPE html>\
             <html><head><title>Meeting Summaries</title></head>\
             <body><h1>Meeting Summaries</h1>\
             <p><a href=\"/auth/login\">Sign in</a> · \
             <a href=\"/auth/status\">Status</a></p>\
             </body></html>",
        )
}
