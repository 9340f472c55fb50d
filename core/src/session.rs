//! Credentials and target server of a RedForester user.

use base64::{engine::general_purpose, Engine as _};
use md5::{Digest, Md5};

use crate::config::ServerConfig;

/// MD5 hex digest of a password, the form RedForester expects in Basic auth.
pub fn password_digest(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

/// Who the client acts as and which server it talks to.
///
/// Immutable once built; every request borrows it.
#[derive(Clone)]
pub struct Session {
    username: String,
    password_digest: String,
    config: ServerConfig,
}

impl Session {
    /// Session for `username` with a plain-text password, hashed here.
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self::with_digest(username, password_digest(password))
    }

    /// Session for `username` when the caller already holds the MD5 digest.
    pub fn with_digest(username: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_digest: digest.into(),
            config: ServerConfig::production(),
        }
    }

    /// Point the session at another server.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password_digest);
        format!("Basic {}", general_purpose::STANDARD.encode(credentials))
    }

    /// Absolute URL of an API path such as `/api/user`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
