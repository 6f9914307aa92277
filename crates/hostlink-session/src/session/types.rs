// ── Types ─────────────────────────────────────────────────────────────────────

use hostlink_core::{Error, HostlinkSettings, Protocol, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SSH_PORT: u16 = 22;

// ── Credentials ──────────────────────────────────────────────────────────────

/// Authentication material. Methods are tried in order: agent, in-memory key,
/// key file, default `~/.ssh` keys (only when no password is given), password,
/// keyboard-interactive.
#[derive(Debug, Default)]
pub struct Credentials {
    pub username: String,
    pub password: Option<SecretString>,
    pub private_key_path: Option<PathBuf>,
    pub private_key_data: Option<SecretString>,
    pub private_key_passphrase: Option<SecretString>,
    pub use_agent: bool,
}

impl Credentials {
    pub fn password(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: Some(SecretString::new(password.to_string())),
            ..Default::default()
        }
    }

    pub fn key_file(username: &str, path: impl Into<PathBuf>, passphrase: Option<&str>) -> Self {
        Self {
            username: username.to_string(),
            private_key_path: Some(path.into()),
            private_key_passphrase: passphrase.map(|p| SecretString::new(p.to_string())),
            ..Default::default()
        }
    }

    pub fn agent(username: &str) -> Self {
        Self {
            username: username.to_string(),
            use_agent: true,
            ..Default::default()
        }
    }
}

// ── Connection info ──────────────────────────────────────────────────────────

/// Everything a handshake needs. Built only through `ConnectionInfo::builder`.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub credentials: Credentials,
    pub connect_timeout: Duration,
    pub operation_timeout: Option<Duration>,
    pub keepalive_interval_secs: u64,
    pub compress: bool,
    pub chunk_size: usize,
}

impl ConnectionInfo {
    pub fn builder(host: &str) -> ConnectionInfoBuilder {
        ConnectionInfoBuilder::new(host)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct ConnectionInfoBuilder {
    host: String,
    port: u16,
    protocol: Protocol,
    credentials: Option<Credentials>,
    connect_timeout: Duration,
    operation_timeout: Option<Duration>,
    keepalive_interval_secs: u64,
    compress: bool,
    chunk_size: usize,
}

impl ConnectionInfoBuilder {
    fn new(host: &str) -> Self {
        let defaults = HostlinkSettings::default();
        Self {
            host: host.trim().to_string(),
            port: DEFAULT_SSH_PORT,
            protocol: Protocol::Ssh,
            credentials: None,
            connect_timeout: defaults.connect_timeout(),
            operation_timeout: defaults.operation_timeout(),
            keepalive_interval_secs: defaults.keepalive_interval_secs,
            compress: false,
            chunk_size: defaults.chunk_size,
        }
    }

    /// Apply timeouts, keepalive and chunk size from settings.
    pub fn settings(mut self, settings: &HostlinkSettings) -> Self {
        self.connect_timeout = settings.connect_timeout();
        self.operation_timeout = settings.operation_timeout();
        self.keepalive_interval_secs = settings.keepalive_interval_secs;
        self.chunk_size = settings.chunk_size;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn keepalive_interval_secs(mut self, secs: u64) -> Self {
        self.keepalive_interval_secs = secs;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> Result<ConnectionInfo> {
        if self.host.is_empty() {
            return Err(Error::Config("connection target has no host".into()));
        }
        if self.port == 0 {
            return Err(Error::Config(format!("invalid port 0 for '{}'", self.host)));
        }
        let credentials = self
            .credentials
            .ok_or_else(|| Error::Config(format!("no credentials given for '{}'", self.host)))?;
        if credentials.username.is_empty() {
            return Err(Error::Config(format!("no username given for '{}'", self.host)));
        }

        Ok(ConnectionInfo {
            host: self.host,
            port: self.port,
            protocol: self.protocol,
            credentials,
            connect_timeout: self.connect_timeout,
            operation_timeout: self.operation_timeout,
            keepalive_interval_secs: self.keepalive_interval_secs,
            compress: self.compress,
            chunk_size: self.chunk_size.max(1),
        })
    }
}

// ── Host key ─────────────────────────────────────────────────────────────────

/// Host key observed during a handshake, without any trust decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostKeyInfo {
    pub host: String,
    pub port: u16,
    pub key_type: String,
    /// Colon-separated hex, as stored in the trust store.
    pub fingerprint: String,
    /// `SHA256:<base64>` as printed by OpenSSH.
    pub openssh_fingerprint: String,
}

// ── Remote filesystem ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteKind {
    File,
    Directory,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttributes {
    pub kind: RemoteKind,
    pub size: u64,
}

impl RemoteAttributes {
    pub fn is_dir(&self) -> bool {
        self.kind == RemoteKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == RemoteKind::File
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    pub kind: RemoteKind,
}

// ── Command execution ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub output: String,
    pub error: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let info = ConnectionInfo::builder(" h1 ")
            .credentials(Credentials::password("root", "pw"))
            .build()
            .unwrap();
        assert_eq!(info.host, "h1");
        assert_eq!(info.port, 22);
        assert_eq!(info.protocol, Protocol::Ssh);
        assert_eq!(info.address(), "h1:22");
        assert_eq!(info.connect_timeout, Duration::from_secs(30));
        assert!(info.operation_timeout.is_none());
    }

    #[test]
    fn test_builder_applies_settings() {
        let settings = HostlinkSettings {
            connect_timeout_secs: 3,
            operation_timeout_secs: 9,
            chunk_size: 4096,
            ..Default::default()
        };
        let info = ConnectionInfo::builder("h1")
            .settings(&settings)
            .protocol(Protocol::Sftp)
            .port(2222)
            .credentials(Credentials::agent("me"))
            .build()
            .unwrap();
        assert_eq!(info.connect_timeout, Duration::from_secs(3));
        assert_eq!(info.operation_timeout, Some(Duration::from_secs(9)));
        assert_eq!(info.chunk_size, 4096);
        assert_eq!(info.port, 2222);
        assert!(info.credentials.use_agent);
    }

    #[test]
    fn test_builder_rejects_incomplete_targets() {
        assert!(ConnectionInfo::builder("").credentials(Credentials::agent("me")).build().is_err());
        assert!(ConnectionInfo::builder("h1").build().is_err());
        assert!(ConnectionInfo::builder("h1").credentials(Credentials::agent("")).build().is_err());
        assert!(ConnectionInfo::builder("h1")
            .port(0)
            .credentials(Credentials::agent("me"))
            .build()
            .is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials::password("root", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_remote_metadata_serde_is_camel_case() {
        let out = CommandOutput {
            output: "ok".into(),
            error: String::new(),
            exit_status: 0,
        };
        assert!(out.success());
        assert!(serde_json::to_string(&out).unwrap().contains("exitStatus"));
    }
}
