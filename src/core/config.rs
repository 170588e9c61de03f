use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

/// Hard cap on unparsed inbound bytes before the framer resets (20 MiB).
pub const DEFAULT_BUFFER_LIMIT: usize = 20 << 20;
/// How long an in-flight request may wait for its reply before eviction.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 30_000;
/// Delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Which server pool the session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Real,
    #[default]
    Demo,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub path: String,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub token: Option<Secret<String>>,
    pub headers: Vec<(String, String)>,
    pub account: AccountType,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub buffer_limit: usize,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            username: None,
            password: None,
            token: None,
            headers: Vec::new(),
            account: AccountType::Demo,
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: 5,
        }
    }
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for StreamConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("StreamConfig", 12)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("password", "[REDACTED]")?;
        state.serialize_field("token", "[REDACTED]")?;
        state.serialize_field("headers", &self.headers)?;
        state.serialize_field("account", &self.account)?;
        state.serialize_field("connect_timeout_ms", &self.connect_timeout_ms)?;
        state.serialize_field("handshake_timeout_ms", &self.handshake_timeout_ms)?;
        state.serialize_field("reply_timeout_ms", &self.reply_timeout_ms)?;
        state.serialize_field("buffer_limit", &self.buffer_limit)?;
        state.serialize_field("reconnect_delay_ms", &self.reconnect_delay_ms)?;
        state.serialize_field("max_reconnect_attempts", &self.max_reconnect_attempts)?;
        state.end()
    }
}

// Custom Deserialize implementation
impl<'de> Deserialize<'de> for StreamConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(default)]
        struct StreamConfigHelper {
            path: String,
            username: Option<String>,
            password: Option<String>,
            token: Option<String>,
            headers: Vec<(String, String)>,
            account: AccountType,
            connect_timeout_ms: u64,
            handshake_timeout_ms: u64,
            reply_timeout_ms: u64,
            buffer_limit: usize,
            reconnect_delay_ms: u64,
            max_reconnect_attempts: u32,
        }

        impl Default for StreamConfigHelper {
            fn default() -> Self {
                let defaults = StreamConfig::default();
                Self {
                    path: defaults.path,
                    username: None,
                    password: None,
                    token: None,
                    headers: Vec::new(),
                    account: defaults.account,
                    connect_timeout_ms: defaults.connect_timeout_ms,
                    handshake_timeout_ms: defaults.handshake_timeout_ms,
                    reply_timeout_ms: defaults.reply_timeout_ms,
                    buffer_limit: defaults.buffer_limit,
                    reconnect_delay_ms: defaults.reconnect_delay_ms,
                    max_reconnect_attempts: defaults.max_reconnect_attempts,
                }
            }
        }

        let helper = StreamConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            path: helper.path,
            username: helper.username,
            password: helper.password.map(Secret::new),
            token: helper.token.map(Secret::new),
            headers: helper.headers,
            account: helper.account,
            connect_timeout_ms: helper.connect_timeout_ms,
            handshake_timeout_ms: helper.handshake_timeout_ms,
            reply_timeout_ms: helper.reply_timeout_ms,
            buffer_limit: helper.buffer_limit,
            reconnect_delay_ms: helper.reconnect_delay_ms,
            max_reconnect_attempts: helper.max_reconnect_attempts,
        })
    }
}

impl StreamConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - `{PREFIX}_PATH` (e.g., `ENGINE_PATH`)
    /// - `{PREFIX}_USERNAME` / `{PREFIX}_PASSWORD`
    /// - `{PREFIX}_TOKEN`
    /// - `{PREFIX}_ACCOUNT` (`real` or `demo`, defaults to demo)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let mut config = Self::default();

        if let Ok(path) = env::var(format!("{}_PATH", prefix)) {
            config.path = path;
        }
        if let Ok(username) = env::var(format!("{}_USERNAME", prefix)) {
            config.username = Some(username);
        }
        if let Ok(password) = env::var(format!("{}_PASSWORD", prefix)) {
            config.password = Some(Secret::new(password));
        }
        if let Ok(token) = env::var(format!("{}_TOKEN", prefix)) {
            config.token = Some(Secret::new(token));
        }
        if let Ok(account) = env::var(format!("{}_ACCOUNT", prefix)) {
            config.account = match account.to_lowercase().as_str() {
                "real" => AccountType::Real,
                "demo" => AccountType::Demo,
                other => {
                    return Err(ConfigError::InvalidConfiguration(format!(
                        "unknown account type: {}",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// This method first loads environment variables from a .env file (if it exists),
    /// then reads the configuration using the standard environment variable names.
    ///
    /// **Security Warning**: Never commit .env files to version control!
    /// Add .env to your .gitignore file.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // .env file doesn't exist, continue with system env vars
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Check if this configuration carries login credentials
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Set the request path prepended to the connection URL
    #[must_use]
    pub fn path(mut self, path: String) -> Self {
        self.path = path;
        self
    }

    /// Set the session token sent at connect time
    #[must_use]
    pub fn token(mut self, token: String) -> Self {
        self.token = Some(Secret::new(token));
        self
    }

    /// Set basic credentials
    #[must_use]
    pub fn credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(Secret::new(password));
        self
    }

    /// Set the account type (real or demo server pool)
    #[must_use]
    pub const fn account(mut self, account: AccountType) -> Self {
        self.account = account;
        self
    }

    /// Set the reply timeout for the pending-request table
    #[must_use]
    pub const fn reply_timeout_ms(mut self, ms: u64) -> Self {
        self.reply_timeout_ms = ms;
        self
    }

    /// Set the inbound buffer hard cap
    #[must_use]
    pub const fn buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Set the reconnect policy
    #[must_use]
    pub const fn reconnect(mut self, delay_ms: u64, max_attempts: u32) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Get the session token (use carefully - exposes secret)
    pub fn token_value(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret().as_str())
    }

    /// Get the password (use carefully - exposes secret)
    pub fn password_value(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret().as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
