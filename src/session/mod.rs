//! Session state: keyed record store, cookie helpers, and the
//! authentication controller that drives the login state machine

pub mod cookie;
pub mod manager;
pub mod store;

pub use manager::{CallbackParams, LoginStart, SessionManager};
pub use store::{LoginAttempt, SessionRecord, SessionStore};
