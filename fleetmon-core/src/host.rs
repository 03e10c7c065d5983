//! Host identity records
//!
//! A [`HostIdentity`] describes one monitored machine. It is immutable
//! after registration; the pool keys sessions by the `id` field.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How the transport authenticates to the host.
///
/// This is an opaque handle, not credential storage: the password variant
/// wraps [`SecretString`] so the material never appears in `Debug` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Private key file on the local filesystem
    KeyFile(PathBuf),
    /// Password supplied by the configuration collaborator
    Password(SecretString),
    /// Defer to a running SSH agent
    Agent,
}

/// Identity of one monitored host
#[derive(Debug, Clone, Deserialize)]
pub struct HostIdentity {
    /// Unique host id; registry and cache key
    pub id: String,
    /// Hostname or IP address
    pub address: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Remote username; `None` lets the ssh client pick its default
    #[serde(default)]
    pub username: Option<String>,
    /// Authentication handle
    #[serde(default = "default_auth")]
    pub auth: AuthMethod,
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

const fn default_auth() -> AuthMethod {
    AuthMethod::Agent
}

impl HostIdentity {
    /// Creates a host identity with agent authentication and default port
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            auth: AuthMethod::Agent,
        }
    }

    /// Sets the SSH port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the remote username
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the authentication handle
    #[must_use]
    pub fn with_auth(mut self, auth: AuthMethod) -> Self {
        self.auth = auth;
        self
    }

    /// `user@address` destination string for the ssh client
    #[must_use]
    pub fn destination(&self) -> String {
        self.username.as_ref().map_or_else(
            || self.address.clone(),
            |user| format!("{user}@{}", self.address),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_with_and_without_user() {
        let host = HostIdentity::new("web1", "10.0.0.5");
        assert_eq!(host.destination(), "10.0.0.5");

        let host = host.with_username("deploy");
        assert_eq!(host.destination(), "deploy@10.0.0.5");
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let host = HostIdentity::new("db1", "10.0.0.9")
            .with_auth(AuthMethod::Password(SecretString::from("hunter2")));
        let debug = format!("{host:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_builder_defaults() {
        let host = HostIdentity::new("h", "example.com").with_port(2222);
        assert_eq!(host.port, 2222);
        assert!(host.username.is_none());
        assert!(matches!(host.auth, AuthMethod::Agent));
    }
}
