//! Application configuration
//!
//! Settings are loaded with the following priority (highest to lowest):
//! environment variables, `Settings.toml` in `RECAPD_SECRETS_DIR`,
//! `Settings.toml` in the current directory, built-in defaults. A plain
//! `.env` file in the working directory is folded into the environment
//! before anything else, matching the original deployment's dotenv habit.

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RecapdSettings {
    pub application: ApplicationSettings,
    pub auth: AuthSettings,
    pub provider: ProviderSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub redirect_base_url: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            redirect_base_url: "http://localhost:5001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Serve canned tokens and a local mock login page instead of the
    /// real identity provider
    pub use_mock: bool,
    /// Debug-only switch that disables CSRF state verification. Defaults
    /// off; every use is logged loudly.
    pub bypass_state_check: bool,
    /// How long a pending login attempt's state token stays verifiable
    pub login_attempt_ttl_minutes: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            use_mock: true,
            bypass_state_check: false,
            login_attempt_ttl_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub authority: String,
    pub redirect_uri: String,
    /// Delegated permissions requested at login
    pub scopes: Vec<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authority: "https://login.microsoftonline.com/common".to_string(),
            redirect_uri: "http://localhost:5001/auth/callback".to_string(),
            scopes: vec![
                "User.Read".to_string(),
                "Calendars.Read".to_string(),
                "OnlineMeetings.Read".to_string(),
                "Chat.ReadWrite".to_string(),
                "ChatMessage.Send".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        // Localhost-friendly default; flip with COOKIE_SECURE=true behind TLS
        Self { secure: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RecapdSettings {
    /// Load settings from configuration files and environment variables.
    /// Also loads the `.env` file and initializes the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed, or if
    /// logger initialization fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();
        env_logger::try_init()?;

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("RECAPD_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        if let Ok(host) = std::env::var("HOST") {
            settings.application.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse() {
                settings.application.port = port;
            }
        }
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            settings.application.redirect_base_url = redirect_base_url;
        }

        if let Ok(use_mock) = std::env::var("USE_MOCK_DATA") {
            settings.auth.use_mock = use_mock.eq_ignore_ascii_case("true");
        }
        if let Ok(bypass) = std::env::var("BYPASS_STATE_CHECK") {
            settings.auth.bypass_state_check = bypass.eq_ignore_ascii_case("true");
        }

        if let Ok(client_id) = std::env::var("MICROSOFT_CLIENT_ID") {
            settings.provider.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("MICROSOFT_CLIENT_SECRET") {
            settings.provider.client_secret = client_secret;
        }
        if let Ok(authority) = std::env::var("MICROSOFT_AUTHORITY") {
            settings.provider.authority = authority;
        }
        if let Ok(redirect_uri) = std::env::var("MICROSOFT_REDIRECT_URI") {
            settings.provider.redirect_uri = redirect_uri;
        }

        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            settings.cookies.secure = cookie_secure_str.eq_ignore_ascii_case("true");
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_are_mock_mode_with_bypass_off() {
        let settings = RecapdSettings::default();
        assert!(settings.auth.use_mock);
        assert!(!settings.auth.bypass_state_check);
        assert_eq!(settings.auth.login_attempt_ttl_minutes, 10);
        assert!(settings.provider.client_id.is_empty());
        assert_eq!(settings.get_bind_address(), "0.0.0.0:5001");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let settings: RecapdSettings = basic_toml::from_str(
            r#"
            [provider]
            client_id = "abc"
            client_secret = "def"

            [auth]
            use_mock = false
            "#,
        )
        .unwrap();
        assert!(!settings.auth.use_mock);
        assert_eq!(settings.provider.client_id, "abc");
        // Untouched sections keep their defaults
        assert_eq!(settings.application.port, 5001);
        assert!(settings.provider.scopes.contains(&"User.Read".to_string()));
    }

    #[test]
    #[serial]
    fn env_overrides_take_precedence() {
        std::env::set_var("USE_MOCK_DATA", "false");
        std::env::set_var("BYPASS_STATE_CHECK", "TRUE");
        std::env::set_var("MICROSOFT_CLIENT_ID", "env-client");
        std::env::set_var("COOKIE_SECURE", "true");

        let mut settings = RecapdSettings::default();
        RecapdSettings::apply_env_overrides(&mut settings);
        assert!(!settings.auth.use_mock);
        assert!(settings.auth.bypass_state_check);
        assert_eq!(settings.provider.client_id, "env-client");
        assert!(settings.cookies.secure);

        std::env::remove_var("USE_MOCK_DATA");
        std::env::remove_var("BYPASS_STATE_CHECK");
        std::env::remove_var("MICROSOFT_CLIENT_ID");
        std::env::remove_var("COOKIE_SECURE");
    }
}
