//! Configuration loading for the dialer service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `DIALER_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "DIALER_";

/// Application configuration derived from `DIALER_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_account_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_auth_token: Option<String>,
    /// Provisioned number used as caller id on bridged calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_phone_number: Option<String>,
    /// Outgoing application granted to issued tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_app_sid: Option<String>,
    #[serde(default = "default_twilio_api_base")]
    pub twilio_api_base: String,
    /// Public base URL the provider uses to reach our callbacks
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// External automation endpoint receiving status events; relay is disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_webhook_url: Option<String>,
    #[serde(default = "default_relay_timeout_seconds")]
    pub relay_timeout_seconds: u64,
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    #[serde(default = "default_context_ttl_seconds")]
    pub context_ttl_seconds: u64,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Call monitor timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MonitorConfig {
    /// Delay between serving a call document and starting the call search (default: 2000)
    ///
    /// Environment variable: `DIALER_MONITOR_START_DELAY_MS`
    #[serde(default = "default_monitor_start_delay_ms")]
    pub start_delay_ms: u64,

    /// Additional wait inside the search phase before listing calls (default: 3000)
    ///
    /// Environment variable: `DIALER_MONITOR_SEARCH_DELAY_MS`
    #[serde(default = "default_monitor_search_delay_ms")]
    pub search_delay_ms: u64,

    /// Polling cadence (default: 2000)
    ///
    /// Environment variable: `DIALER_MONITOR_POLL_INTERVAL_MS`
    #[serde(default = "default_monitor_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of polls per monitor (default: 150)
    ///
    /// Environment variable: `DIALER_MONITOR_MAX_POLLS`
    #[serde(default = "default_monitor_max_polls")]
    pub max_polls: u32,

    /// Absolute monitor age ceiling in seconds (default: 600)
    ///
    /// Environment variable: `DIALER_MONITOR_MAX_AGE_SECONDS`
    #[serde(default = "default_monitor_max_age_seconds")]
    pub max_age_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: default_monitor_start_delay_ms(),
            search_delay_ms: default_monitor_search_delay_ms(),
            poll_interval_ms: default_monitor_poll_interval_ms(),
            max_polls: default_monitor_max_polls(),
            max_age_seconds: default_monitor_max_age_seconds(),
        }
    }
}

impl MonitorConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    /// Validate monitor configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms < 100 || self.poll_interval_ms > 60_000 {
            return Err(ConfigError::InvalidMonitorPollInterval {
                value: self.poll_interval_ms,
            });
        }

        if self.max_polls == 0 {
            return Err(ConfigError::InvalidMonitorMaxPolls {
                value: self.max_polls,
            });
        }

        if self.max_age_seconds == 0 {
            return Err(ConfigError::InvalidMonitorMaxAge {
                value: self.max_age_seconds,
            });
        }

        Ok(())
    }
}

/// Credentials required to sign tokens and call the provider REST API.
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub api_key: String,
    pub api_secret: String,
    pub auth_token: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            twilio_account_sid: None,
            twilio_api_key: None,
            twilio_api_secret: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            twilio_app_sid: None,
            twilio_api_base: default_twilio_api_base(),
            server_url: default_server_url(),
            relay_webhook_url: None,
            relay_timeout_seconds: default_relay_timeout_seconds(),
            token_ttl_seconds: default_token_ttl_seconds(),
            context_ttl_seconds: default_context_ttl_seconds(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.twilio_api_secret.is_some() {
            config.twilio_api_secret = Some("[REDACTED]".to_string());
        }
        if config.twilio_auth_token.is_some() {
            config.twilio_auth_token = Some("[REDACTED]".to_string());
        }
        if config.twilio_api_key.is_some() {
            config.twilio_api_key = Some("[REDACTED]".to_string());
        }
        if config.relay_webhook_url.is_some() {
            config.relay_webhook_url = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Returns the mandatory provider credentials, failing on the first missing one.
    pub fn twilio_credentials(&self) -> Result<TwilioCredentials, ConfigError> {
        Ok(TwilioCredentials {
            account_sid: required(&self.twilio_account_sid, "TWILIO_ACCOUNT_SID")?,
            api_key: required(&self.twilio_api_key, "TWILIO_API_KEY")?,
            api_secret: required(&self.twilio_api_secret, "TWILIO_API_SECRET")?,
            auth_token: required(&self.twilio_auth_token, "TWILIO_AUTH_TOKEN")?,
        })
    }

    /// Parsed public base URL for callback links.
    pub fn server_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.server_url).map_err(|source| ConfigError::InvalidUrl {
            key: "SERVER_URL",
            value: self.server_url.clone(),
            source,
        })
    }

    /// Parsed relay target, if one is configured.
    pub fn relay_target(&self) -> Result<Option<Url>, ConfigError> {
        self.relay_webhook_url
            .as_deref()
            .map(|value| {
                Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                    key: "RELAY_WEBHOOK_URL",
                    value: value.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_seconds)
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_seconds)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.twilio_credentials()?;
        self.server_base_url()?;
        self.relay_target()?;

        Url::parse(&self.twilio_api_base).map_err(|source| ConfigError::InvalidUrl {
            key: "TWILIO_API_BASE",
            value: self.twilio_api_base.clone(),
            source,
        })?;

        if self.token_ttl_seconds == 0 || self.token_ttl_seconds > 86_400 {
            return Err(ConfigError::InvalidTokenTtl {
                value: self.token_ttl_seconds,
            });
        }

        if self.context_ttl_seconds == 0 {
            return Err(ConfigError::InvalidContextTtl {
                value: self.context_ttl_seconds,
            });
        }

        if self.relay_timeout_seconds == 0 {
            return Err(ConfigError::InvalidRelayTimeout {
                value: self.relay_timeout_seconds,
            });
        }

        self.monitor.validate()?;

        Ok(())
    }
}

fn required(value: &Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingCredential { key })
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_relay_timeout_seconds() -> u64 {
    5
}

fn default_token_ttl_seconds() -> u64 {
    3600 // 1 hour
}

fn default_context_ttl_seconds() -> u64 {
    600 // 10 minutes
}

fn default_monitor_start_delay_ms() -> u64 {
    2000
}

fn default_monitor_search_delay_ms() -> u64 {
    3000
}

fn default_monitor_poll_interval_ms() -> u64 {
    2000
}

fn default_monitor_max_polls() -> u32 {
    150 // ~5 minutes at the default cadence
}

fn default_monitor_max_age_seconds() -> u64 {
    600 // 10 minutes
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid port '{value}'")]
    InvalidPort { value: String },
    #[error("missing required credential; set {ENV_PREFIX}{key}")]
    MissingCredential { key: &'static str },
    #[error("invalid URL for {ENV_PREFIX}{key} '{value}': {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("token ttl must be between 1 and 86400 seconds, got {value}")]
    InvalidTokenTtl { value: u64 },
    #[error("context ttl must be positive, got {value}")]
    InvalidContextTtl { value: u64 },
    #[error("relay timeout must be positive, got {value}")]
    InvalidRelayTimeout { value: u64 },
    #[error("monitor poll interval must be between 100 and 60000 ms, got {value}")]
    InvalidMonitorPollInterval { value: u64 },
    #[error("monitor max polls must be positive, got {value}")]
    InvalidMonitorMaxPolls { value: u32 },
    #[error("monitor max age must be positive, got {value}")]
    InvalidMonitorMaxAge { value: u64 },
}

/// Loads configuration using layered `.env` files and `DIALER_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let mut api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);

        // A bare port overrides the port of the bind address.
        if let Some(port) = layered.remove("PORT").filter(|v| !v.is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value: port.clone() })?;
            let mut addr: SocketAddr =
                api_bind_addr
                    .parse()
                    .map_err(|source| ConfigError::InvalidBindAddr {
                        value: api_bind_addr.clone(),
                        source,
                    })?;
            addr.set_port(port);
            api_bind_addr = addr.to_string();
        }

        let twilio_account_sid = take_non_empty(&mut layered, "TWILIO_ACCOUNT_SID");
        let twilio_api_key = take_non_empty(&mut layered, "TWILIO_API_KEY");
        let twilio_api_secret = take_non_empty(&mut layered, "TWILIO_API_SECRET");
        let twilio_auth_token = take_non_empty(&mut layered, "TWILIO_AUTH_TOKEN");
        let twilio_phone_number = take_non_empty(&mut layered, "TWILIO_PHONE_NUMBER");
        let twilio_app_sid = take_non_empty(&mut layered, "TWILIO_APP_SID");
        let twilio_api_base = take_non_empty(&mut layered, "TWILIO_API_BASE")
            .unwrap_or_else(default_twilio_api_base);
        let server_url = take_non_empty(&mut layered, "SERVER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(default_server_url);
        let relay_webhook_url = take_non_empty(&mut layered, "RELAY_WEBHOOK_URL");

        let relay_timeout_seconds = layered
            .remove("RELAY_TIMEOUT_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_relay_timeout_seconds);
        let token_ttl_seconds = layered
            .remove("TOKEN_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_token_ttl_seconds);
        let context_ttl_seconds = layered
            .remove("CONTEXT_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_context_ttl_seconds);

        let monitor = MonitorConfig {
            start_delay_ms: layered
                .remove("MONITOR_START_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_start_delay_ms),
            search_delay_ms: layered
                .remove("MONITOR_SEARCH_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_search_delay_ms),
            poll_interval_ms: layered
                .remove("MONITOR_POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_poll_interval_ms),
            max_polls: layered
                .remove("MONITOR_MAX_POLLS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_max_polls),
            max_age_seconds: layered
                .remove("MONITOR_MAX_AGE_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_max_age_seconds),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            twilio_account_sid,
            twilio_api_key,
            twilio_api_secret,
            twilio_auth_token,
            twilio_phone_number,
            twilio_app_sid,
            twilio_api_base,
            server_url,
            relay_webhook_url,
            relay_timeout_seconds,
            token_ttl_seconds,
            context_ttl_seconds,
            monitor,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_non_empty(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered.remove(key).and_then(|val| {
        let trimmed = val.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
