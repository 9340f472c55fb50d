//! Target server selection.
//!
//! A `ServerConfig` is the scheme plus host of a RedForester deployment. Two
//! deployments are known; anything else (a local mock, a staging host) is
//! built with `ServerConfig::new`.

use std::fmt;
use std::str::FromStr;

pub const ENV_VAR: &str = "REDFORESTER_ENV";
pub const PROTOCOL_VAR: &str = "REDFORESTER_PROTOCOL";
pub const HOST_VAR: &str = "REDFORESTER_HOST";

/// Scheme and host of the server every request goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub protocol: String,
    pub basic_url: String,
}

impl ServerConfig {
    pub fn new(protocol: impl Into<String>, basic_url: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            basic_url: basic_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn production() -> Self {
        Self::new("http", "app.redforester.com")
    }

    pub fn development() -> Self {
        Self::new("http", "188.68.16.188")
    }

    /// `{protocol}://{basic_url}`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.basic_url)
    }

    /// Read the configuration from `REDFORESTER_*` environment variables.
    ///
    /// Falls back to production when nothing is set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, with an injectable variable source.
    ///
    /// `REDFORESTER_ENV` picks the base deployment (unknown values fall back to
    /// production); `REDFORESTER_PROTOCOL` and `REDFORESTER_HOST` override its
    /// fields.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup(ENV_VAR)
            .and_then(|value| value.parse::<Environment>().ok())
            .unwrap_or_default();
        let mut config = environment.config();
        if let Some(protocol) = lookup(PROTOCOL_VAR).filter(|v| !v.is_empty()) {
            config.protocol = protocol;
        }
        if let Some(host) = lookup(HOST_VAR).filter(|v| !v.is_empty()) {
            config.basic_url = host.trim_end_matches('/').to_string();
        }
        config
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Known RedForester deployments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn config(self) -> ServerConfig {
        match self {
            Environment::Production => ServerConfig::production(),
            Environment::Development => ServerConfig::development(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Development => f.write_str("development"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}
