// ── ssh2 connector / transport ────────────────────────────────────────────────
//
// Both families share one connect path: TCP, handshake, host-key verification,
// authentication, keepalive. They differ afterwards:
//   • SFTP – the SFTP subsystem for metadata and streaming
//   • SSH  – SCP channels for streaming, shell commands for metadata

use crate::session::transport::{copy_with_progress, Connected, Connector, ProgressFn, Transport};
use crate::session::types::*;
use hostlink_core::fingerprint::{fingerprint_of, openssh_fingerprint_of};
use hostlink_core::{Error, Protocol, Result};
use hostlink_trust::HostKeyVerifier;
use secrecy::ExposeSecret;
use ssh2::{ErrorCode, OpenFlags, OpenType, Session, Sftp};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use tracing::{debug, info, warn};

/// libssh2 `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct Ssh2Connector;

impl Ssh2Connector {
    pub fn new() -> Self {
        Self
    }

    fn open_tcp(info: &ConnectionInfo) -> Result<TcpStream> {
        let addr = info.address();
        let candidates = (info.host.as_str(), info.port)
            .to_socket_addrs()
            .map_err(|e| Error::connection(&info.host, format!("cannot resolve {}: {}", addr, e)))?;

        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, info.connect_timeout) {
                Ok(tcp) => {
                    tcp.set_nonblocking(false)
                        .map_err(|e| Error::connection(&info.host, format!("failed to set blocking mode: {}", e)))?;
                    return Ok(tcp);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(Error::connection(
            &info.host,
            match last_error {
                Some(e) => format!("TCP connection to {} failed: {}", addr, e),
                None => format!("{} resolved to no addresses", addr),
            },
        ))
    }

    /// TCP connect and SSH handshake; no authentication.
    fn handshake(info: &ConnectionInfo) -> Result<(Session, TcpStream)> {
        debug!("Connecting to {} ({})", info.address(), info.protocol);
        let tcp = Self::open_tcp(info)?;

        let mut session =
            Session::new().map_err(|e| Error::connection(&info.host, format!("failed to create SSH session: {}", e)))?;
        if info.compress {
            session.set_compress(true);
        }
        session.set_timeout(duration_millis(info.connect_timeout));
        session.set_tcp_stream(
            tcp.try_clone()
                .map_err(|e| Error::connection(&info.host, e))?,
        );
        session
            .handshake()
            .map_err(|e| Error::connection(&info.host, format!("SSH handshake failed: {}", e)))?;

        Ok((session, tcp))
    }

    fn observed_key(session: &Session, info: &ConnectionInfo) -> Result<HostKeyInfo> {
        let (raw, key_type) = session
            .host_key()
            .ok_or_else(|| Error::connection(&info.host, "server presented no host key"))?;
        Ok(HostKeyInfo {
            host: info.host.clone(),
            port: info.port,
            key_type: format!("{:?}", key_type).to_lowercase(),
            fingerprint: fingerprint_of(raw),
            openssh_fingerprint: openssh_fingerprint_of(raw),
        })
    }
}

impl Connector for Ssh2Connector {
    fn connect(&self, info: &ConnectionInfo, verifier: &dyn HostKeyVerifier) -> Result<Connected> {
        let (mut session, tcp) = Self::handshake(info)?;

        // Trust is settled before any credential leaves this process.
        let key = Self::observed_key(&session, info)?;
        let decision = verifier.verify(&info.host, &key.fingerprint)?.ensure_allowed()?;

        let method = authenticate(&mut session, &info.credentials)
            .map_err(|reason| Error::connection(&info.host, format!("authentication failed: {}", reason)))?;
        if !session.authenticated() {
            return Err(Error::connection(&info.host, "not authenticated after auth attempt"));
        }
        info!(
            "Authenticated to {} as {} via {}",
            info.address(),
            info.credentials.username,
            method
        );

        session.set_keepalive(info.keepalive_interval_secs > 0, info.keepalive_interval_secs as u32);
        session.set_timeout(info.operation_timeout.map(duration_millis).unwrap_or(0));

        let mut transport = Ssh2Transport {
            host: info.host.clone(),
            protocol: info.protocol,
            session,
            _tcp: tcp,
            sftp: None,
            chunk_size: info.chunk_size,
            connected: true,
        };
        if info.protocol == Protocol::Sftp {
            // Fail at connect time when the subsystem is unavailable.
            transport.sftp()?;
        }

        Ok(Connected {
            transport: Box::new(transport),
            decision,
        })
    }

    fn host_key(&self, info: &ConnectionInfo) -> Result<HostKeyInfo> {
        let (session, _tcp) = Self::handshake(info)?;
        let key = Self::observed_key(&session, info)?;
        let _ = session.disconnect(None, "host key probe", None);
        Ok(key)
    }
}

fn duration_millis(d: std::time::Duration) -> u32 {
    d.as_millis().min(u32::MAX as u128) as u32
}

// ── Authentication ───────────────────────────────────────────────────────────

fn authenticate(session: &mut Session, creds: &Credentials) -> std::result::Result<&'static str, String> {
    let username = creds.username.as_str();
    let passphrase = creds.private_key_passphrase.as_ref().map(|p| p.expose_secret().as_str());

    if creds.use_agent {
        if let Ok(mut agent) = session.agent() {
            if agent.connect().is_ok() {
                let _ = agent.list_identities();
                for identity in agent.identities().unwrap_or_default() {
                    if agent.userauth(username, &identity).is_ok() {
                        return Ok("agent");
                    }
                }
            }
        }
    }

    if let Some(ref key_data) = creds.private_key_data {
        let mut key_file = tempfile::NamedTempFile::new().map_err(|e| format!("cannot stage key: {}", e))?;
        key_file
            .write_all(key_data.expose_secret().as_bytes())
            .map_err(|e| format!("cannot stage key: {}", e))?;
        session
            .userauth_pubkey_file(username, None, key_file.path(), passphrase)
            .map_err(|e| format!("public-key (memory) auth failed: {}", e))?;
        if session.authenticated() {
            return Ok("publickey-memory");
        }
    }

    if let Some(ref key_path) = creds.private_key_path {
        session
            .userauth_pubkey_file(username, None, key_path, passphrase)
            .map_err(|e| format!("public-key (file) auth failed: {}", e))?;
        if session.authenticated() {
            return Ok("publickey");
        }
    }

    if creds.password.is_none() {
        if let Some(ssh_dir) = dirs::home_dir().map(|h| h.join(".ssh")) {
            for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let path = ssh_dir.join(name);
                if path.exists()
                    && session.userauth_pubkey_file(username, None, &path, passphrase).is_ok()
                    && session.authenticated()
                {
                    return Ok("publickey-default");
                }
            }
        }
    }

    if let Some(ref password) = creds.password {
        if session.userauth_password(username, password.expose_secret()).is_ok() && session.authenticated() {
            return Ok("password");
        }

        struct PasswordPrompt<'a>(&'a str);

        impl ssh2::KeyboardInteractivePrompt for PasswordPrompt<'_> {
            fn prompt(&mut self, _username: &str, _instructions: &str, prompts: &[ssh2::Prompt]) -> Vec<String> {
                prompts.iter().map(|_| self.0.to_string()).collect()
            }
        }

        let mut prompt = PasswordPrompt(password.expose_secret());
        if session.userauth_keyboard_interactive(username, &mut prompt).is_ok() && session.authenticated() {
            return Ok("keyboard-interactive");
        }
    }

    Err("no authentication method succeeded".to_string())
}

// ── Transport ────────────────────────────────────────────────────────────────

pub struct Ssh2Transport {
    host: String,
    protocol: Protocol,
    session: Session,
    _tcp: TcpStream,
    sftp: Option<Sftp>,
    chunk_size: usize,
    connected: bool,
}

impl Ssh2Transport {
    pub fn host(&self) -> &str {
        &self.host
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::transport(format!("connection to {} is closed", self.host)))
        }
    }

    /// Run `op` on a live connection. When it fails because the socket
    /// went away, the transport is marked disconnected and the failure is
    /// reported as a lost connection.
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ensure_connected()?;
        let result = op(self);
        match result {
            Err(e) if !matches!(e, Error::Connection { .. } | Error::Cancelled) && self.link_lost() => {
                self.connected = false;
                self.sftp = None;
                warn!("Connection to {} lost: {}", self.host, e);
                Err(Error::connection(&self.host, format!("connection lost: {}", e)))
            }
            other => other,
        }
    }

    fn link_lost(&self) -> bool {
        ssh2::Error::last_session_error(&self.session).map_or(false, |e| is_link_failure(&e.code()))
    }

    fn sftp(&mut self) -> Result<&Sftp> {
        if self.sftp.is_none() {
            let sftp = self
                .session
                .sftp()
                .map_err(|e| Error::transport(format!("SFTP subsystem unavailable on {}: {}", self.host, e)))?;
            self.sftp = Some(sftp);
        }
        self.sftp
            .as_ref()
            .ok_or_else(|| Error::transport("SFTP channel missing"))
    }

    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.ensure_connected()?;
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| Error::transport(format!("failed to open channel: {}", e)))?;
        channel
            .exec(command)
            .map_err(|e| Error::transport(format!("failed to execute command: {}", e)))?;

        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| Error::transport(format!("failed to read command output: {}", e)))?;
        let mut error = String::new();
        channel
            .stderr()
            .read_to_string(&mut error)
            .map_err(|e| Error::transport(format!("failed to read command error stream: {}", e)))?;
        channel.wait_close().ok();
        let exit_status = channel.exit_status().unwrap_or(-1);

        Ok(CommandOutput {
            output,
            error,
            exit_status,
        })
    }

    /// Run a shell helper that must succeed.
    fn run_checked(&mut self, command: &str, path: &str) -> Result<String> {
        let out = self.run(command)?;
        if out.success() {
            Ok(out.output)
        } else {
            Err(Error::remote(path, out.error.trim()))
        }
    }

    // ── SCP family metadata via shell ────────────────────────────────────────

    fn shell_attributes(&mut self, path: &str) -> Result<Option<RemoteAttributes>> {
        let p = shell_escape(path);
        let script = format!(
            "if [ -d {p} ]; then echo d; \
             elif [ -f {p} ]; then echo f $(stat -c %s {p} 2>/dev/null || stat -f %z {p}); \
             elif [ -e {p} ]; then echo o; \
             else echo n; fi",
            p = p
        );
        let out = self.run_checked(&script, path)?;
        parse_shell_attributes(&out).ok_or_else(|| Error::remote(path, format!("unexpected stat output '{}'", out.trim())))
    }

    fn shell_list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let out = self.run_checked(&format!("ls -1Ap {}", shell_escape(path)), path)?;
        Ok(parse_ls_entries(&out))
    }

    // ── Streaming ────────────────────────────────────────────────────────────

    fn scp_upload(&mut self, source: &mut dyn Read, size: u64, remote_path: &str, progress: ProgressFn<'_>) -> Result<u64> {
        let chunk = self.chunk_size;
        let mut channel = self
            .session
            .scp_send(Path::new(remote_path), 0o644, size, None)
            .map_err(|e| Error::remote(remote_path, format!("SCP send init failed: {}", e)))?;

        let written = copy_with_progress(source, &mut channel, chunk, progress)?;

        channel
            .send_eof()
            .map_err(|e| Error::remote(remote_path, format!("failed to send EOF: {}", e)))?;
        channel
            .wait_eof()
            .map_err(|e| Error::remote(remote_path, format!("failed waiting for EOF: {}", e)))?;
        channel.close().ok();
        channel
            .wait_close()
            .map_err(|e| Error::remote(remote_path, format!("failed waiting for close: {}", e)))?;
        Ok(written)
    }

    fn scp_download(&mut self, remote_path: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64> {
        let chunk = self.chunk_size;
        let (mut channel, stat) = self
            .session
            .scp_recv(Path::new(remote_path))
            .map_err(|e| Error::remote(remote_path, format!("SCP recv init failed: {}", e)))?;

        // SCP frames the payload; never read past the announced size.
        let expected = stat.size();
        let mut limited = (&mut channel).take(expected);
        let read = copy_with_progress(&mut limited, sink, chunk, progress)?;

        channel.send_eof().ok();
        channel.wait_eof().ok();
        channel.close().ok();
        channel.wait_close().ok();

        if read != expected {
            return Err(Error::remote(
                remote_path,
                format!("short read: {} of {} bytes", read, expected),
            ));
        }
        Ok(read)
    }
}

impl Transport for Ssh2Transport {
    fn is_connected(&self) -> bool {
        self.connected && self.session.authenticated()
    }

    fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.sftp = None;
        if let Err(e) = self.session.disconnect(None, "Client disconnecting", None) {
            warn!("Disconnect from {} was not clean: {}", self.host, e);
        }
        debug!("Disconnected from {}", self.host);
        Ok(())
    }

    fn attributes(&mut self, path: &str) -> Result<Option<RemoteAttributes>> {
        self.guarded(|t| {
            if t.protocol == Protocol::Ssh {
                return t.shell_attributes(path);
            }
            match t.sftp()?.stat(Path::new(path)) {
                Ok(stat) => Ok(Some(RemoteAttributes {
                    kind: kind_of(&stat),
                    size: stat.size.unwrap_or(0),
                })),
                Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => Ok(None),
                Err(e) => Err(Error::remote(path, format!("stat failed: {}", e))),
            }
        })
    }

    fn create_dir(&mut self, path: &str) -> Result<()> {
        self.guarded(|t| {
            if t.protocol == Protocol::Ssh {
                t.run_checked(&format!("mkdir {}", shell_escape(path)), path)?;
                return Ok(());
            }
            t.sftp()?
                .mkdir(Path::new(path), 0o755)
                .map_err(|e| Error::remote(path, format!("mkdir failed: {}", e)))
        })
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.guarded(|t| {
            if t.protocol == Protocol::Ssh {
                return t.shell_list_dir(path);
            }
            let entries = t
                .sftp()?
                .readdir(Path::new(path))
                .map_err(|e| Error::remote(path, format!("readdir failed: {}", e)))?;

            Ok(entries
                .into_iter()
                .filter_map(|(p, stat)| {
                    let name = p.file_name()?.to_string_lossy().to_string();
                    if name == "." || name == ".." {
                        return None;
                    }
                    Some(RemoteEntry {
                        name,
                        kind: kind_of(&stat),
                    })
                })
                .collect())
        })
    }

    fn upload(&mut self, source: &mut dyn Read, size: u64, remote_path: &str, progress: ProgressFn<'_>) -> Result<u64> {
        self.guarded(|t| {
            if t.protocol == Protocol::Ssh {
                return t.scp_upload(source, size, remote_path, progress);
            }
            let chunk = t.chunk_size;
            let mut file = t
                .sftp()?
                .open_mode(
                    Path::new(remote_path),
                    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                    0o644,
                    OpenType::File,
                )
                .map_err(|e| Error::remote(remote_path, format!("cannot open for writing: {}", e)))?;
            copy_with_progress(source, &mut file, chunk, progress)
        })
    }

    fn download(&mut self, remote_path: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64> {
        self.guarded(|t| {
            if t.protocol == Protocol::Ssh {
                return t.scp_download(remote_path, sink, progress);
            }
            let chunk = t.chunk_size;
            let mut file = t
                .sftp()?
                .open(Path::new(remote_path))
                .map_err(|e| Error::remote(remote_path, format!("cannot open for reading: {}", e)))?;
            copy_with_progress(&mut file, sink, chunk, progress)
        })
    }

    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        self.guarded(|t| t.run(command))
    }
}

fn kind_of(stat: &ssh2::FileStat) -> RemoteKind {
    if stat.is_dir() {
        RemoteKind::Directory
    } else if stat.is_file() {
        RemoteKind::File
    } else {
        RemoteKind::Other
    }
}

// ── Link failures ────────────────────────────────────────────────────────────

/// libssh2 codes meaning the socket under the session is gone.
const LINK_FAILURE_CODES: [i32; 4] = [
    -7,  // LIBSSH2_ERROR_SOCKET_SEND
    -13, // LIBSSH2_ERROR_SOCKET_DISCONNECT
    -30, // LIBSSH2_ERROR_SOCKET_TIMEOUT
    -43, // LIBSSH2_ERROR_SOCKET_RECV
];

pub(crate) fn is_link_failure(code: &ErrorCode) -> bool {
    matches!(code, ErrorCode::Session(c) if LINK_FAILURE_CODES.contains(c))
}

// ── Shell helpers ────────────────────────────────────────────────────────────

/// Single-quote for POSIX sh.
pub(crate) fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn parse_shell_attributes(output: &str) -> Option<Option<RemoteAttributes>> {
    let mut parts = output.split_whitespace();
    match parts.next()? {
        "d" => Some(Some(RemoteAttributes {
            kind: RemoteKind::Directory,
            size: 0,
        })),
        "f" => Some(Some(RemoteAttributes {
            kind: RemoteKind::File,
            size: parts.next().and_then(|s| s.parse().ok()).unwrap_or(0),
        })),
        "o" => Some(Some(RemoteAttributes {
            kind: RemoteKind::Other,
            size: 0,
        })),
        "n" => Some(None),
        _ => None,
    }
}

/// Parse `ls -1Ap`: one name per line, directories suffixed with `/`.
fn parse_ls_entries(output: &str) -> Vec<RemoteEntry> {
    output
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(|line| match line.strip_suffix('/') {
            Some(dir) if dir.is_empty() || dir == "." || dir == ".." => None,
            Some(dir) => Some(RemoteEntry {
                name: dir.to_string(),
                kind: RemoteKind::Directory,
            }),
            None => Some(RemoteEntry {
                name: line.to_string(),
                kind: RemoteKind::File,
            }),
        })
        .collect()
}
