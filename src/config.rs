//! Strongly-typed configuration for the manager suite.
//!
//! Values can be constructed from defaults, loaded from environment variables
//! (with optional `.env` support), or merged with explicit overrides. The
//! environment is read exactly once, here; the login flow and the scenarios
//! receive plain values instead of consulting process state themselves.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use thiserror::Error;

use crate::auth::Credentials;

/// Default QA deployment of the manager console.
pub const DEFAULT_BASE_URL: &str = "https://qa-progic.comcaqui.com";
pub const DEFAULT_STORAGE_STATE_PATH: &str = "storage/auth.json";
pub const DEFAULT_USERS_PATH: &str = "data/data/users.json";
pub const DEFAULT_MEDIA_DIR: &str = "data/media";

/// Verbosity level for suite logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Minimal,
    #[default]
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Credentials that take precedence over the users file, field by field.
#[derive(Clone, Default, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
pub struct CredentialOverride {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CredentialOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialOverride")
            .field("email", &self.email)
            .field("password_present", &self.password.is_some())
            .finish()
    }
}

/// Explicit inputs to the login routine.
#[derive(Debug, Clone, Default, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
#[serde(default)]
pub struct LoginOptions {
    /// Go straight to the identity provider instead of trying the password form.
    pub prefer_sso_strategy: bool,
    /// Allow an interactive login when the stored session is missing or stale.
    pub allow_interactive_mfa: bool,
    pub override_credentials: Option<CredentialOverride>,
}

impl LoginOptions {
    /// Credentials used for the identity provider: overrides win per field,
    /// the users file fills the gaps.
    pub fn resolve(&self, fallback: &Credentials) -> Credentials {
        let overrides = self.override_credentials.clone().unwrap_or_default();
        Credentials {
            email: overrides.email.unwrap_or_else(|| fallback.email.clone()),
            password: overrides
                .password
                .unwrap_or_else(|| fallback.password.clone()),
        }
    }
}

/// Configuration values for a suite run.
#[derive(Debug, Clone, PartialEq, DeriveSerialize, DeriveDeserialize)]
#[serde(default)]
pub struct E2eConfig {
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    #[serde(alias = "storageState")]
    pub storage_state_path: PathBuf,
    #[serde(alias = "usersFile")]
    pub users_path: PathBuf,
    #[serde(alias = "mediaDir")]
    pub media_dir: PathBuf,
    pub headless: bool,
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<PathBuf>,
    pub verbose: Verbosity,
    pub login: LoginOptions,
    #[serde(alias = "wizardTimeoutMs")]
    pub wizard_timeout_ms: u64,
    #[serde(alias = "navigationTimeoutMs")]
    pub navigation_timeout_ms: u64,
}

impl Default for E2eConfig {
    fn default() -> Self {
        E2eConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_state_path: PathBuf::from(DEFAULT_STORAGE_STATE_PATH),
            users_path: PathBuf::from(DEFAULT_USERS_PATH),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            headless: true,
            chrome_executable: None,
            verbose: Verbosity::default(),
            login: LoginOptions::default(),
            wizard_timeout_ms: 30_000,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl E2eConfig {
    /// Construct a configuration by reading relevant environment variables, after
    /// loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = E2eConfig::default();

        if let Some(value) = env_var("MANAGER_BASE_URL").or_else(|| env_var("PLAYWRIGHT_BASE_URL"))
        {
            config.base_url = value;
        }

        if let Some(value) =
            env_var("MANAGER_STORAGE_STATE").or_else(|| env_var("PLAYWRIGHT_STORAGE_STATE"))
        {
            config.storage_state_path = PathBuf::from(value);
        }

        if let Some(value) = env_var("MANAGER_USERS_FILE") {
            config.users_path = PathBuf::from(value);
        }

        if let Some(value) = env_var("MANAGER_MEDIA_DIR") {
            config.media_dir = PathBuf::from(value);
        }

        if let Some(value) = env_var("MANAGER_HEADLESS") {
            config.headless = parse_bool("MANAGER_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("MANAGER_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("MANAGER_VERBOSE") {
            let parsed = parse_u8("MANAGER_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed)
                .ok_or_else(|| ConfigError::invalid_enum("MANAGER_VERBOSE", parsed.to_string()))?;
        }

        if let Some(value) = env_var("MANAGER_WIZARD_TIMEOUT_MS") {
            config.wizard_timeout_ms = parse_u64("MANAGER_WIZARD_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("MANAGER_NAVIGATION_TIMEOUT_MS") {
            config.navigation_timeout_ms = parse_u64("MANAGER_NAVIGATION_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("ALLOW_MICROSOFT_SSO") {
            config.login.allow_interactive_mfa = parse_bool("ALLOW_MICROSOFT_SSO", &value)?;
        }

        if let Some(value) = env_var("AUTH_STRATEGY") {
            config.login.prefer_sso_strategy = value.eq_ignore_ascii_case("microsoft");
        }

        if let Some(value) = env_var("USE_MICROSOFT_SSO") {
            config.login.prefer_sso_strategy |= parse_bool("USE_MICROSOFT_SSO", &value)?;
        }

        let email = env_var("MICROSOFT_EMAIL");
        let password = env_var("MICROSOFT_PASSWORD");
        if email.is_some() || password.is_some() {
            config.login.override_credentials = Some(CredentialOverride { email, password });
        }

        check_base_url(&config.base_url)?;

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: E2eConfigOverrides) -> E2eConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.base_url {
            next.base_url = value;
        }
        if let Some(value) = overrides.storage_state_path {
            next.storage_state_path = value;
        }
        if let Some(value) = overrides.users_path {
            next.users_path = value;
        }
        if let Some(value) = overrides.media_dir {
            next.media_dir = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.login {
            next.login = value;
        }
        if let Some(value) = overrides.wizard_timeout_ms {
            next.wizard_timeout_ms = value;
        }
        if let Some(value) = overrides.navigation_timeout_ms {
            next.navigation_timeout_ms = value;
        }

        next
    }

    /// Join a site-relative path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn wizard_timeout(&self) -> Duration {
        Duration::from_millis(self.wizard_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Field-level overrides for [`E2eConfig::with_overrides`].
#[derive(Debug, Default, Clone)]
pub struct E2eConfigOverrides {
    pub base_url: Option<String>,
    pub storage_state_path: Option<PathBuf>,
    pub users_path: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
    pub headless: Option<bool>,
    pub chrome_executable: Option<Option<PathBuf>>,
    pub verbose: Option<Verbosity>,
    pub login: Option<LoginOptions>,
    pub wizard_timeout_ms: Option<u64>,
    pub navigation_timeout_ms: Option<u64>,
}

impl E2eConfigOverrides {
    /// Builder-style helper to set the `headless` override.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    /// Builder-style helper to set the `verbose` override.
    pub fn verbose(mut self, verbose: Verbosity) -> Self {
        self.verbose = Some(verbose);
        self
    }

    pub fn chrome_executable<T: Into<Option<PathBuf>>>(mut self, path: T) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }
}

/// Errors that can arise while constructing an [`E2eConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} must be an absolute http(s) URL, got '{value}'")]
    InvalidUrl { field: &'static str, value: String },
}

impl ConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        ConfigError::InvalidEnumVariant { field, value }
    }
}

fn check_base_url(value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            field: "MANAGER_BASE_URL",
            value: value.to_string(),
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}
