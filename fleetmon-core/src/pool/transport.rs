//! Command transports
//!
//! The pool talks to hosts through the [`Transport`] / [`TransportSession`]
//! pair so tests can substitute a scripted implementation. The real
//! transport shells out to OpenSSH with a per-host control socket: the
//! master holds the authenticated session open and each command is one
//! multiplexed exec over it, so nothing is installed on the remote side.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{MonitorError, MonitorResult};
use crate::host::{AuthMethod, HostIdentity};

/// Default timeout for the initial connect (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default timeout for a single command round trip (seconds)
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Opens authenticated sessions to hosts
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects and authenticates to `host`.
    ///
    /// # Errors
    /// [`MonitorError::Auth`] when credentials are rejected,
    /// [`MonitorError::Connection`] for any other transport failure.
    async fn connect(&self, host: &HostIdentity) -> MonitorResult<Box<dyn TransportSession>>;
}

/// One open command channel to one host.
///
/// Owned exclusively by the session; the pool serializes access, so
/// implementations never see concurrent `run` calls.
#[async_trait]
pub trait TransportSession: Send {
    /// Runs one shell command and returns its stdout.
    ///
    /// # Errors
    /// [`MonitorError::Connection`] when the channel drops or times out,
    /// [`MonitorError::Auth`] when the host rejects the session.
    async fn run(&mut self, command: &str) -> MonitorResult<String>;

    /// Tears the channel down. Idempotent; errors are swallowed.
    async fn close(&mut self);
}

/// Configuration for the OpenSSH transport
#[derive(Debug, Clone)]
pub struct SshTransportConfig {
    /// Timeout for the initial connect
    pub connect_timeout: Duration,
    /// Timeout for one command round trip
    pub command_timeout: Duration,
    /// Directory holding control sockets; defaults to the system tmpdir
    pub control_dir: PathBuf,
}

impl Default for SshTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            control_dir: std::env::temp_dir(),
        }
    }
}

/// OpenSSH subprocess transport with connection multiplexing
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    config: SshTransportConfig,
}

impl SshTransport {
    /// Creates a transport with the given configuration
    #[must_use]
    pub const fn new(config: SshTransportConfig) -> Self {
        Self { config }
    }

    fn control_path(&self, host: &HostIdentity) -> PathBuf {
        self.config
            .control_dir
            .join(format!("fleetmon-{}-{}.sock", host.id, host.port))
    }

    fn base_command(host: &HostIdentity, control_path: &Path) -> Command {
        let mut cmd = match &host.auth {
            AuthMethod::Password(password) => {
                // sshpass reads the password from SSHPASS with -e
                let mut c = Command::new("sshpass");
                c.arg("-e").arg("ssh");
                c.env("SSHPASS", password.expose_secret());
                c
            }
            _ => {
                let mut c = Command::new("ssh");
                c.arg("-o").arg("BatchMode=yes");
                c
            }
        };
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", control_path.display()));
        if host.port != crate::host::DEFAULT_SSH_PORT {
            cmd.arg("-p").arg(host.port.to_string());
        }
        if let AuthMethod::KeyFile(key) = &host.auth {
            cmd.arg("-i").arg(key);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Maps an ssh failure to the error taxonomy.
///
/// Exit status 255 is the ssh client's own failure channel; the stderr
/// text distinguishes credential rejection from everything else.
fn classify_ssh_failure(stderr: &str) -> MonitorError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
    {
        MonitorError::Auth(stderr.trim().to_string())
    } else {
        MonitorError::Connection(stderr.trim().to_string())
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, host: &HostIdentity) -> MonitorResult<Box<dyn TransportSession>> {
        let control_path = self.control_path(host);
        let mut cmd = Self::base_command(host, &control_path);
        cmd.arg("-o").arg("ControlMaster=auto");
        cmd.arg("-o").arg("ControlPersist=yes");
        cmd.arg("-o").arg(format!(
            "ConnectTimeout={}",
            self.config.connect_timeout.as_secs()
        ));
        cmd.arg(host.destination());
        cmd.arg("true");

        let output = tokio::time::timeout(self.config.connect_timeout * 2, cmd.output())
            .await
            .map_err(|_| {
                MonitorError::Connection(format!(
                    "connect to {} timed out after {}s",
                    host.address,
                    self.config.connect_timeout.as_secs() * 2
                ))
            })?
            .map_err(|e| MonitorError::Connection(format!("failed to spawn ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_ssh_failure(&stderr));
        }

        tracing::debug!(host = %host.id, "ssh control master established");
        Ok(Box::new(SshSession {
            host: host.clone(),
            control_path,
            command_timeout: self.config.command_timeout,
            closed: false,
        }))
    }
}

/// One multiplexed exec channel over an established control master
struct SshSession {
    host: HostIdentity,
    control_path: PathBuf,
    command_timeout: Duration,
    closed: bool,
}

#[async_trait]
impl TransportSession for SshSession {
    async fn run(&mut self, command: &str) -> MonitorResult<String> {
        if self.closed {
            return Err(MonitorError::Connection("session already closed".into()));
        }

        let mut cmd = SshTransport::base_command(&self.host, &self.control_path);
        cmd.arg(self.host.destination());
        cmd.arg(command);

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                MonitorError::Connection(format!(
                    "command on {} timed out after {}s",
                    self.host.id,
                    self.command_timeout.as_secs()
                ))
            })?
            .map_err(|e| MonitorError::Connection(format!("failed to spawn ssh: {e}")))?;

        // 255 is the ssh client failing, anything else came from the
        // remote command itself; diagnostic commands routinely exit
        // non-zero, so their stdout is still returned.
        if output.status.code() == Some(255) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_ssh_failure(&stderr));
        }
        if !output.status.success() {
            tracing::debug!(
                host = %self.host.id,
                status = %output.status,
                "remote command exited non-zero"
            );
        }

        String::from_utf8(output.stdout)
            .map_err(|e| MonitorError::Parse(format!("invalid UTF-8 in command output: {e}")))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut cmd = SshTransport::base_command(&self.host, &self.control_path);
        cmd.arg("-O").arg("exit");
        cmd.arg(self.host.destination());
        if let Err(e) = cmd.output().await {
            tracing::debug!(host = %self.host.id, error = %e, "control master exit failed");
        }
    }
}
