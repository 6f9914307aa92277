// ── Transport boundary ────────────────────────────────────────────────────────
//
// The SSH library sits behind two traits: `Connector` performs the handshake
// (consulting a `HostKeyVerifier` before authenticating) and yields a boxed
// `Transport`, which owns the live connection and exposes the remote
// filesystem and streaming copy primitives the transfer engine needs.

use crate::session::types::*;
use hostlink_core::{Error, Result};
use hostlink_trust::{HostKeyVerifier, TrustDecision};
use std::io::{Read, Write};
use std::ops::ControlFlow;

/// Byte-count callback: receives cumulative bytes transferred, returns
/// `Break` to abort the copy.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64) -> ControlFlow<()>;

pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    fn disconnect(&mut self) -> Result<()>;

    /// `None` when the path does not exist.
    fn attributes(&mut self, path: &str) -> Result<Option<RemoteAttributes>>;

    fn exists(&mut self, path: &str) -> Result<bool> {
        Ok(self.attributes(path)?.is_some())
    }

    /// Create one directory; the parent must exist.
    fn create_dir(&mut self, path: &str) -> Result<()>;

    /// Entries of a directory, excluding `.` and `..`.
    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Stream `size` bytes from `source` into `remote_path` (created or
    /// truncated). Returns bytes written.
    fn upload(
        &mut self,
        source: &mut dyn Read,
        size: u64,
        remote_path: &str,
        progress: ProgressFn<'_>,
    ) -> Result<u64>;

    /// Stream `remote_path` into `sink`. Returns bytes read.
    fn download(&mut self, remote_path: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64>;

    fn exec(&mut self, command: &str) -> Result<CommandOutput>;
}

/// A freshly authenticated connection and the trust decision that let it in.
pub struct Connected {
    pub transport: Box<dyn Transport>,
    pub decision: TrustDecision,
}

pub trait Connector: Send + Sync {
    /// Handshake, verify the host key, authenticate.
    fn connect(&self, info: &ConnectionInfo, verifier: &dyn HostKeyVerifier) -> Result<Connected>;

    /// Handshake only; report the host key.
    fn host_key(&self, info: &ConnectionInfo) -> Result<HostKeyInfo>;
}

/// Chunked copy reporting cumulative bytes after every chunk.
pub fn copy_with_progress(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    chunk_size: usize,
    progress: ProgressFn<'_>,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut transferred: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::transport(format!("read error: {}", e))),
        };

        writer
            .write_all(&buf[..n])
            .map_err(|e| Error::transport(format!("write error: {}", e)))?;
        transferred += n as u64;

        if progress(transferred).is_break() {
            return Err(Error::Cancelled);
        }
    }

    writer
        .flush()
        .map_err(|e| Error::transport(format!("flush error: {}", e)))?;
    Ok(transferred)
}

// ── Remote path helpers ──────────────────────────────────────────────────────

/// Join with `/` regardless of the local platform.
pub fn remote_join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Last path component, ignoring trailing slashes.
pub fn remote_file_name(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_handles_slashes() {
        assert_eq!(remote_join("/srv", "a.txt"), "/srv/a.txt");
        assert_eq!(remote_join("/srv/", "a.txt"), "/srv/a.txt");
        assert_eq!(remote_join("/", "a.txt"), "/a.txt");
        assert_eq!(remote_join("", "a.txt"), "a.txt");
        assert_eq!(remote_join("/srv", "/a.txt"), "/srv/a.txt");
    }

    #[test]
    fn test_file_name_of_remote_paths() {
        assert_eq!(remote_file_name("/srv/data/a.txt"), Some("a.txt"));
        assert_eq!(remote_file_name("/srv/data/"), Some("data"));
        assert_eq!(remote_file_name("plain"), Some("plain"));
        assert_eq!(remote_file_name("/"), None);
        assert_eq!(remote_file_name(".."), None);
    }

    #[test]
    fn test_copy_reports_cumulative_bytes() {
        let data = vec![7u8; 10];
        let mut out = Vec::new();
        let mut seen = Vec::new();
        let n = copy_with_progress(&mut data.as_slice(), &mut out, 4, &mut |b| {
            seen.push(b);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(n, 10);
        assert_eq!(out, data);
        assert_eq!(seen, vec![4, 8, 10]);
    }

    #[test]
    fn test_copy_stops_on_break() {
        let data = vec![1u8; 100];
        let mut out = Vec::new();
        let err = copy_with_progress(&mut data.as_slice(), &mut out, 10, &mut |b| {
            if b >= 30 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(out.len(), 30);
    }
}
