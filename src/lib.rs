#![warn(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the recapd application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod models;
pub mod oauth;
pub mod session;
pub mod settings;
pub mod utils;

/// Re-export commonly used items
pub use models::{AuthError, AuthenticatedUser, MeetingSource, ResumeIntent};
pub use oauth::{IdentityProvider, LiveProvider, MockProvider, TokenCache};
pub use session::{SessionManager, SessionStore};
pub use settings::RecapdSettings;
