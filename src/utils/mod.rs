//! Shared utility modules

pub mod crypto;
