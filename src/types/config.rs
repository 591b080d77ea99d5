//! Configuration types
//!
//! Everything is environment-driven: the two `.env` files (Outlook
//! credentials, Anthropic key) are loaded before this module runs, so all
//! settings are read from the process environment with permissive defaults.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Default chat model when `MAILCLAW_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default maximum output tokens per completion.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting '{key}' ({hint})")]
    MissingKey { key: &'static str, hint: &'static str },
}

/// Authentication orchestration settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// How long to wait for the browser login to complete.
    pub timeout: Duration,
    /// Delay between auth status polls.
    pub poll_interval: Duration,
    /// Whether to launch the local auth helper process if present.
    pub start_auth_server: bool,
    /// Whether to open the login URL in a browser automatically.
    pub browser_open: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(2),
            start_auth_server: true,
            browser_open: true,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API key for the Anthropic Messages API.
    pub anthropic_api_key: String,
    /// Chat model identifier.
    pub model: String,
    /// Maximum output tokens per completion.
    pub max_tokens: u32,
    /// Authentication orchestration settings.
    pub auth: AuthConfig,
    /// Outlook app registration, forwarded to the server and auth helper.
    pub outlook_client_id: Option<String>,
    /// Client secret matching `outlook_client_id`.
    pub outlook_client_secret: Option<String>,
}

impl AppConfig {
    /// Build configuration from the process environment.
    ///
    /// Only `ANTHROPIC_API_KEY` is required. Everything else has a default,
    /// and malformed overrides fall back with a warning rather than failing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let anthropic_api_key = match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                return Err(ConfigError::MissingKey {
                    key: "ANTHROPIC_API_KEY",
                    hint: "set it in the environment or an .env file",
                })
            }
        };

        let model = std::env::var("MAILCLAW_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = env_u32("MAILCLAW_MAX_TOKENS", DEFAULT_MAX_TOKENS);

        let auth = AuthConfig {
            timeout: Duration::from_secs(env_u64("AUTH_TIMEOUT_SECONDS", 180)),
            poll_interval: poll_interval_from_secs(env_f64("AUTH_POLL_INTERVAL_SECONDS", 2.0)),
            start_auth_server: env_flag("START_AUTH_SERVER", true),
            browser_open: env_flag("BROWSER_OPEN", true),
        };

        Ok(Self {
            anthropic_api_key,
            model,
            max_tokens,
            auth,
            outlook_client_id: non_empty_env("OUTLOOK_CLIENT_ID"),
            outlook_client_secret: non_empty_env("OUTLOOK_CLIENT_SECRET"),
        })
    }

    /// Environment variables to forward into spawned child processes.
    pub fn child_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(ref id) = self.outlook_client_id {
            env.insert("OUTLOOK_CLIENT_ID".to_string(), id.clone());
        }
        if let Some(ref secret) = self.outlook_client_secret {
            env.insert("OUTLOOK_CLIENT_SECRET".to_string(), secret.clone());
        }
        env
    }
}

/// A default-on flag stays on unless the variable is the literal "false"
/// (any case); a default-off flag needs the literal "true".
fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => {
            if default {
                !value.trim().eq_ignore_ascii_case("false")
            } else {
                value.trim().eq_ignore_ascii_case("true")
            }
        }
        Err(_) => default,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    parse_or_default(key, default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    parse_or_default(key, default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    parse_or_default(key, default)
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {}={:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Clamp the poll interval so a zero or negative override cannot spin.
fn poll_interval_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs >= 0.1 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_millis(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_auth_config() {
        let auth = AuthConfig::default();
        assert_eq!(auth.timeout, Duration::from_secs(180));
        assert_eq!(auth.poll_interval, Duration::from_secs(2));
        assert!(auth.start_auth_server);
        assert!(auth.browser_open);
    }

    #[test]
    fn test_poll_interval_clamping() {
        assert_eq!(poll_interval_from_secs(2.0), Duration::from_secs(2));
        assert_eq!(poll_interval_from_secs(0.5), Duration::from_millis(500));
        assert_eq!(poll_interval_from_secs(0.0), Duration::from_millis(100));
        assert_eq!(poll_interval_from_secs(-3.0), Duration::from_millis(100));
        assert_eq!(poll_interval_from_secs(f64::NAN), Duration::from_millis(100));
    }

    #[test]
    fn test_env_flag_parsing() {
        // Unset variables keep the default on both polarities.
        std::env::remove_var("MAILCLAW_TEST_FLAG_UNSET");
        assert!(env_flag("MAILCLAW_TEST_FLAG_UNSET", true));
        assert!(!env_flag("MAILCLAW_TEST_FLAG_UNSET", false));

        std::env::set_var("MAILCLAW_TEST_FLAG_A", "FALSE");
        assert!(!env_flag("MAILCLAW_TEST_FLAG_A", true));

        std::env::set_var("MAILCLAW_TEST_FLAG_B", "yes");
        assert!(env_flag("MAILCLAW_TEST_FLAG_B", true));

        std::env::set_var("MAILCLAW_TEST_FLAG_C", "true");
        assert!(env_flag("MAILCLAW_TEST_FLAG_C", false));
    }

    #[test]
    fn test_parse_or_default() {
        std::env::set_var("MAILCLAW_TEST_NUM", "7");
        assert_eq!(parse_or_default("MAILCLAW_TEST_NUM", 2u64), 7);

        std::env::set_var("MAILCLAW_TEST_NUM_BAD", "seven");
        assert_eq!(parse_or_default("MAILCLAW_TEST_NUM_BAD", 2u64), 2);

        std::env::remove_var("MAILCLAW_TEST_NUM_UNSET");
        assert_eq!(parse_or_default("MAILCLAW_TEST_NUM_UNSET", 2u64), 2);
    }
}
