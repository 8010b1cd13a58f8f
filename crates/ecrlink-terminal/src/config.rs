//! # Terminal Client Configuration
//!
//! Configuration management for the terminal client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ECRLINK_BASE_URL=http://192.168.1.50:6678/v105                     │
//! │     ECRLINK_LICENSE_TOKEN=...                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     terminal.toml next to the integrating application                  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     localhost terminal, GEL currency, stock prompts                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # terminal.toml
//! base_url = "http://192.168.1.50:6678/v105"
//!
//! [credentials]
//! license_token = "..."
//! alias = "shop-1"
//! user_name = "operator"
//! password = "secret"
//!
//! [operator]
//! id = "0001"
//! name = "Front Desk"
//!
//! [device]
//! currency_code = "981"
//! language = "GE"
//! idle_text = "Insert Card"
//!
//! [timing]
//! long_poll_secs = 5
//! close_day_deadline_secs = 130
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use ecrlink_core::types::Credentials;
use ecrlink_core::validation::clamp_long_poll_secs;
use ecrlink_core::DEFAULT_CURRENCY_CODE;

use crate::error::{LinkError, LinkResult};

// =============================================================================
// Operator Configuration
// =============================================================================

/// Operator identity announced to the terminal on unlock and day-close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Operator identifier (e.g. till number).
    #[serde(default = "default_operator_id")]
    pub id: String,

    /// Human-readable operator name.
    #[serde(default = "default_operator_name")]
    pub name: String,
}

fn default_operator_id() -> String {
    "0001".to_string()
}

fn default_operator_name() -> String {
    "Operator".to_string()
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            id: default_operator_id(),
            name: default_operator_name(),
        }
    }
}

// =============================================================================
// Device Defaults
// =============================================================================

/// Per-device wire defaults sent with UNLOCKDEVICE / LOCKDEVICE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// ISO 4217 numeric currency code attached to every amount.
    #[serde(default = "default_currency_code")]
    pub currency_code: String,

    /// Terminal display language code.
    #[serde(default = "default_language")]
    pub language: String,

    /// ECR software version announced on unlock.
    #[serde(default = "default_ecr_version")]
    pub ecr_version: String,

    /// Text shown while the device waits for a card.
    #[serde(default = "default_idle_text")]
    pub idle_text: String,

    /// Text shown once the device is locked again.
    #[serde(default = "default_lock_idle_text")]
    pub lock_idle_text: String,

    /// Read the card silently, without terminal beeps/prompts.
    #[serde(default = "default_silent_card_read")]
    pub silent_card_read: bool,
}

fn default_currency_code() -> String {
    DEFAULT_CURRENCY_CODE.to_string()
}

fn default_language() -> String {
    "GE".to_string()
}

fn default_ecr_version() -> String {
    "BDX-BOG-v1.0".to_string()
}

fn default_idle_text() -> String {
    "Insert Card".to_string()
}

fn default_lock_idle_text() -> String {
    "READY".to_string()
}

fn default_silent_card_read() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            currency_code: default_currency_code(),
            language: default_language(),
            ecr_version: default_ecr_version(),
            idle_text: default_idle_text(),
            lock_idle_text: default_lock_idle_text(),
            silent_card_read: default_silent_card_read(),
        }
    }
}

// =============================================================================
// Timing Configuration
// =============================================================================

/// Poll windows, deadlines, and retry bounds.
///
/// All long-poll windows are clamped to the 1-60 s range the terminal
/// accepts when they are used, not when they are loaded, so a bad config
/// file degrades instead of failing at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Long-poll window for ordinary event waits, in seconds.
    #[serde(default = "default_long_poll_secs")]
    pub long_poll_secs: u64,

    /// Long-poll window while waiting for day-close events, in seconds.
    #[serde(default = "default_close_day_poll_secs")]
    pub close_day_poll_secs: u64,

    /// Wall-clock deadline for the day-close receipt, in seconds.
    #[serde(default = "default_close_day_deadline_secs")]
    pub close_day_deadline_secs: u64,

    /// Maximum CLOSEDOC attempts before giving up.
    #[serde(default = "default_close_doc_attempts")]
    pub close_doc_attempts: u32,

    /// Event-confirmation window after each CLOSEDOC attempt, in seconds.
    #[serde(default = "default_close_doc_event_window_secs")]
    pub close_doc_event_window_secs: u64,

    /// Long-poll window used inside the CLOSEDOC confirmation window.
    #[serde(default = "default_close_doc_event_poll_secs")]
    pub close_doc_event_poll_secs: u64,

    /// TCP connect timeout, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Per-request timeout, in seconds. Must exceed the largest long-poll
    /// window or every long wait dies as a transport timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_long_poll_secs() -> u64 {
    5
}

fn default_close_day_poll_secs() -> u64 {
    15
}

fn default_close_day_deadline_secs() -> u64 {
    130
}

fn default_close_doc_attempts() -> u32 {
    5
}

fn default_close_doc_event_window_secs() -> u64 {
    3
}

fn default_close_doc_event_poll_secs() -> u64 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    75
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            long_poll_secs: default_long_poll_secs(),
            close_day_poll_secs: default_close_day_poll_secs(),
            close_day_deadline_secs: default_close_day_deadline_secs(),
            close_doc_attempts: default_close_doc_attempts(),
            close_doc_event_window_secs: default_close_doc_event_window_secs(),
            close_doc_event_poll_secs: default_close_doc_event_poll_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TimingConfig {
    /// TCP connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Day-close wall-clock deadline as a [`Duration`].
    pub fn close_day_deadline(&self) -> Duration {
        Duration::from_secs(self.close_day_deadline_secs)
    }

    /// CLOSEDOC event-confirmation window as a [`Duration`].
    pub fn close_doc_event_window(&self) -> Duration {
        Duration::from_secs(self.close_doc_event_window_secs)
    }
}

// =============================================================================
// Terminal Configuration
// =============================================================================

/// Complete configuration for one terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Protocol base URL, including the version path segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Session credentials.
    #[serde(default)]
    pub credentials: Credentials,

    /// Operator identity.
    #[serde(default)]
    pub operator: OperatorConfig,

    /// Per-device wire defaults.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Poll windows, deadlines and retry bounds.
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_base_url() -> String {
    "http://127.0.0.1:6678/v105".to_string()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            base_url: default_base_url(),
            credentials: Credentials::default(),
            operator: OperatorConfig::default(),
            device: DeviceConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl TerminalConfig {
    /// Loads configuration from a TOML file, then applies environment
    /// overrides.
    pub fn load(path: impl AsRef<Path>) -> LinkResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: TerminalConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(base_url = %config.base_url, "Loaded terminal configuration");
        Ok(config)
    }

    /// Loads from a file when present, otherwise starts from defaults.
    /// Environment overrides apply either way.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) if p.exists() => Self::load(p).unwrap_or_else(|e| {
                warn!(?e, "Failed to load config file, using defaults");
                let mut config = TerminalConfig::default();
                config.apply_env_overrides();
                config
            }),
            _ => {
                let mut config = TerminalConfig::default();
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Applies `ECRLINK_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ECRLINK_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("ECRLINK_LICENSE_TOKEN") {
            self.credentials.license_token = v;
        }
        if let Ok(v) = std::env::var("ECRLINK_ALIAS") {
            self.credentials.alias = v;
        }
        if let Ok(v) = std::env::var("ECRLINK_USER_NAME") {
            self.credentials.user_name = v;
        }
        if let Ok(v) = std::env::var("ECRLINK_PASSWORD") {
            self.credentials.password = v;
        }
        if let Ok(v) = std::env::var("ECRLINK_CURRENCY_CODE") {
            self.device.currency_code = v;
        }
    }

    /// Validates the configuration.
    ///
    /// The base URL must parse as an absolute http(s) URL; everything else
    /// has safe defaults or is clamped at use.
    pub fn validate(&self) -> LinkResult<()> {
        let url = Url::parse(&self.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LinkError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                self.base_url
            )));
        }
        if self.timing.close_doc_attempts == 0 {
            return Err(LinkError::InvalidConfig(
                "close_doc_attempts must be at least 1".to_string(),
            ));
        }
        if self.timing.request_timeout_secs <= clamp_long_poll_secs(self.timing.long_poll_secs) {
            return Err(LinkError::InvalidConfig(
                "request_timeout_secs must exceed the long-poll window".to_string(),
            ));
        }
        Ok(())
    }

    /// The base URL with any trailing slashes removed, ready for
    /// path concatenation.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TerminalConfig::default();
        assert_eq!(config.device.currency_code, "981");
        assert_eq!(config.device.language, "GE");
        assert_eq!(config.timing.long_poll_secs, 5);
        assert_eq!(config.timing.close_day_deadline_secs, 130);
        assert_eq!(config.timing.close_doc_attempts, 5);
        assert!(config.device.silent_card_read);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            base_url = "http://192.168.1.50:6678/v105"

            [credentials]
            license_token = "lic"
            alias = "shop-1"
            user_name = "op"
            password = "pw"

            [timing]
            long_poll_secs = 10
        "#;
        let config: TerminalConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.base_url, "http://192.168.1.50:6678/v105");
        assert_eq!(config.credentials.alias, "shop-1");
        assert_eq!(config.timing.long_poll_secs, 10);
        // Unspecified sections fall back to defaults
        assert_eq!(config.device.currency_code, "981");
        assert_eq!(config.timing.close_doc_attempts, 5);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = TerminalConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidUrl(_))));

        let config = TerminalConfig {
            base_url: "ftp://terminal:6678/v105".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidUrl(_))));
    }

    #[test]
    fn test_validate_rejects_zero_close_doc_attempts() {
        let mut config = TerminalConfig::default();
        config.timing.close_doc_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(LinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_request_timeout_below_poll_window() {
        let mut config = TerminalConfig::default();
        config.timing.long_poll_secs = 30;
        config.timing.request_timeout_secs = 20;
        assert!(matches!(
            config.validate(),
            Err(LinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_normalized_base_url() {
        let config = TerminalConfig {
            base_url: "http://terminal:6678/v105///".to_string(),
            ..Default::default()
        };
        assert_eq!(config.normalized_base_url(), "http://terminal:6678/v105");
    }
}
