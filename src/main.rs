#![warn(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use recapd::{
    handlers::{
        auth_callback, auth_login, auth_logout, auth_status, health, home, mock_callback,
        mock_login,
    },
    oauth::{IdentityProvider, LiveProvider, MockProvider},
    session::{SessionManager, SessionStore},
    settings::RecapdSettings,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Loads .env, Settings.toml and environment overrides, and initializes
    // the logger
    let settings = RecapdSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let provider: Arc<dyn IdentityProvider> = if settings.auth.use_mock {
        println!("✓ Mock mode: using canned identity provider, no network calls");
        Arc::new(MockProvider::new())
    } else {
        Arc::new(
            LiveProvider::new(&settings.provider)
                .map_err(|e| std::io::Error::other(format!("Provider setup failed: {e}")))?,
        )
    };

    let store = Arc::new(SessionStore::new(settings.auth.login_attempt_ttl_minutes));
    let session_manager = SessionManager::new(
        store,
        provider,
        settings.auth.use_mock,
        settings.auth.bypass_state_check,
        settings.cookies.secure,
    );

    start_server(session_manager, settings).await
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if server binding fails or the server fails to start
async fn start_server(
    session_manager: SessionManager,
    settings: RecapdSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .app_data(web::Data::new(settings.clone()))
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg
        // Authentication endpoints
        .route("/auth/login", web::get().to(auth_login))
        .route("/auth/callback", web::get().to(auth_callback))
        .route("/auth/callback", web::post().to(auth_callback))
        .route("/auth/logout", web::get().to(auth_logout))
        .route("/auth/status", web::get().to(auth_status))
        // Mock-mode login page (stand-in for the provider's hosted page)
        .route("/auth/mock-login", web::get().to(mock_login))
        .route("/auth/mock-callback", web::post().to(mock_callback))
        // Landing page and health
        .route("/", web::get().to(home))
        .route("/ping", web::get().to(health));
}

fn print_startup_info(bind_address: &str, settings: &RecapdSettings) {
    println!("Starting recapd on http://{bind_address}");
    println!();
    println!("Authentication endpoints:");
    println!("  GET  /auth/login    - Start provider login");
    println!("  GET|POST /auth/callback - OAuth redirect target");
    println!("  GET  /auth/logout   - Clear session");
    println!("  GET  /auth/status   - Authentication status");
    println!();
    println!("OAuth callback URL for the identity provider:");
    println!("  {}/auth/callback", settings.application.redirect_base_url);
    println!();
    println!("System endpoints:");
    println!("  GET  /ping          - Health check");
    if settings.auth.bypass_state_check {
        println!();
        println!("!! BYPASS_STATE_CHECK is enabled - CSRF protection is OFF !!");
    }
}
