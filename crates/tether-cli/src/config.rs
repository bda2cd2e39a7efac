//! Chat configuration loaded from environment variables.
//!
//! Every setting has a default, so `tether` starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use tether_net::{Establisher, RetryPolicy};
use tether_shared::constants::{
    DEFAULT_ACCEPT_TIMEOUT, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_DOWNLOAD_DIR,
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PORT, DEFAULT_RETRY_DELAY,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Port suggested at the startup prompt.
    /// Env: `TETHER_PORT`
    /// Default: `11451`
    pub port: u16,

    /// Display name sent in the handshake.
    /// Env: `TETHER_NAME`
    /// Default: the host name, else `User-<port>`.
    pub display_name: Option<String>,

    /// Where received files are written.
    /// Env: `TETHER_DOWNLOAD_DIR`
    /// Default: `./downloads`
    pub download_dir: PathBuf,

    /// History database file.
    /// Env: `TETHER_DB_PATH`
    /// Default: `chat_history.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Env: `TETHER_ACCEPT_TIMEOUT_SECS`
    pub accept_timeout: Duration,

    /// Env: `TETHER_HANDSHAKE_TIMEOUT_SECS`
    pub handshake_timeout: Duration,

    /// Env: `TETHER_CONNECT_ATTEMPTS`
    pub connect_attempts: u32,

    /// Env: `TETHER_RETRY_DELAY_SECS`
    pub retry_delay: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            display_name: None,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            db_path: None,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("TETHER_PORT") {
            match val.trim().parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => tracing::warn!(value = %val, "Invalid TETHER_PORT, using default"),
            }
        }

        if let Some(name) = lookup("TETHER_NAME") {
            if !name.trim().is_empty() {
                config.display_name = Some(name);
            }
        }

        if let Some(dir) = lookup("TETHER_DOWNLOAD_DIR") {
            if !dir.is_empty() {
                config.download_dir = PathBuf::from(dir);
            }
        }

        if let Some(path) = lookup("TETHER_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(d) = seconds(&lookup, "TETHER_ACCEPT_TIMEOUT_SECS") {
            config.accept_timeout = d;
        }

        if let Some(d) = seconds(&lookup, "TETHER_HANDSHAKE_TIMEOUT_SECS") {
            config.handshake_timeout = d;
        }

        if let Some(val) = lookup("TETHER_CONNECT_ATTEMPTS") {
            match val.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.connect_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid TETHER_CONNECT_ATTEMPTS, using default"),
            }
        }

        if let Some(d) = seconds(&lookup, "TETHER_RETRY_DELAY_SECS") {
            config.retry_delay = d;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            delay: self.retry_delay,
            ..RetryPolicy::default()
        }
    }

    pub fn establisher(&self) -> Establisher {
        Establisher::new(self.handshake_timeout)
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let val = lookup(key)?;
    match val.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %val, "Invalid duration, using default");
            None
        }
    }
}
