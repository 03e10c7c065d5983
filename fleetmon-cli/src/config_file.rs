//! Fleet configuration file
//!
//! TOML document listing the monitored hosts plus monitor settings.
//! Passwords never appear in the file; a host may name an environment
//! variable that holds one, which is read once at startup and wrapped
//! in an opaque handle.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use fleetmon_core::config::MonitorSettings;
use fleetmon_core::host::{AuthMethod, HostIdentity, DEFAULT_SSH_PORT};

use crate::error::CliError;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "fleetmon.toml";

/// One `[[hosts]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Unique host id
    pub id: String,
    /// Hostname or IP address
    pub address: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Remote username
    #[serde(default)]
    pub username: Option<String>,
    /// Path to a private key file
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl HostEntry {
    /// Converts the entry into a pool-ready identity.
    ///
    /// # Errors
    /// `Config` when both a key file and a password variable are given,
    /// or when the named variable is not set.
    pub fn identity(&self) -> Result<HostIdentity, CliError> {
        let auth = match (&self.key_file, &self.password_env) {
            (Some(_), Some(_)) => {
                return Err(CliError::Config(format!(
                    "host '{}' sets both key_file and password_env",
                    self.id
                )));
            }
            (Some(key), None) => AuthMethod::KeyFile(key.clone()),
            (None, Some(var)) => {
                let password = std::env::var(var).map_err(|_| {
                    CliError::Config(format!(
                        "host '{}': environment variable '{var}' is not set",
                        self.id
                    ))
                })?;
                AuthMethod::Password(SecretString::from(password))
            }
            (None, None) => AuthMethod::Agent,
        };
        let mut identity = HostIdentity::new(&self.id, &self.address)
            .with_port(self.port)
            .with_auth(auth);
        if let Some(username) = &self.username {
            identity = identity.with_username(username);
        }
        Ok(identity)
    }
}

/// Full fleet configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Monitored hosts
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
    /// Monitoring settings
    #[serde(default)]
    pub monitor: MonitorSettings,
}

impl FleetConfig {
    /// Loads the configuration from `path`, or from `fleetmon.toml` in
    /// the working directory when none is given.
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Config` when it does not
    /// parse, lists no hosts, or contains duplicate host ids.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            CliError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| CliError::Config(format!("invalid '{}': {e}", path.display())))?;
        config.monitor.validate();
        config.check_hosts()?;
        Ok(config)
    }

    fn check_hosts(&self) -> Result<(), CliError> {
        if self.hosts.is_empty() {
            return Err(CliError::Config("no hosts configured".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for host in &self.hosts {
            if !seen.insert(host.id.as_str()) {
                return Err(CliError::Config(format!(
                    "duplicate host id '{}'",
                    host.id
                )));
            }
        }
        Ok(())
    }

    /// Looks up one host entry by id
    #[must_use]
    pub fn host(&self, id: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|host| host.id == id)
    }
}
