//! In-memory remote filesystem.
//!
//! `MemoryFs` is shared (cloning shares state) so a test can keep one handle
//! while the transport built on it is moved into a session registry.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hostlink_core::{Error, Result};
use hostlink_session::transport::copy_with_progress;
use hostlink_session::{CommandOutput, ProgressFn, RemoteAttributes, RemoteEntry, RemoteKind, Transport};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct FsState {
    nodes: BTreeMap<String, Node>,
    /// Paths whose upload/download fails with a transport error.
    failing: BTreeSet<String>,
    /// Paths whose upload/download drops the link.
    severing: BTreeSet<String>,
    commands: Vec<String>,
}

/// Shared in-memory tree rooted at `/`.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<FsState>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(i) => Some(path[..i].to_string()),
        None => None,
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut state = FsState::default();
        state.nodes.insert("/".to_string(), Node::Dir);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a directory and any missing parents.
    pub fn mkdir_p(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.state();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.mkdir_p(&parent);
        }
        self.state().nodes.insert(path, Node::File(data.to_vec()));
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.state().nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.state().nodes.get(&normalize(path)), Some(Node::Dir))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state().nodes.contains_key(&normalize(path))
    }

    /// Every file below `root`, keyed by path relative to it.
    pub fn files_under(&self, root: &str) -> BTreeMap<String, Vec<u8>> {
        let root = normalize(root);
        let prefix = if root == "/" { "/".to_string() } else { format!("{}/", root) };
        self.state()
            .nodes
            .iter()
            .filter_map(|(path, node)| match node {
                Node::File(data) => path.strip_prefix(&prefix).map(|rel| (rel.to_string(), data.clone())),
                Node::Dir => None,
            })
            .collect()
    }

    /// Make transfers touching `path` fail.
    pub fn fail_transfers_of(&self, path: &str) {
        self.state().failing.insert(normalize(path));
    }

    /// Make the link drop when a transfer touches `path`.
    pub fn sever_link_on(&self, path: &str) {
        self.state().severing.insert(normalize(path));
    }

    /// Commands passed to `exec`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone())
    }
}

/// `Transport` over a `MemoryFs`.
#[derive(Debug)]
pub struct MemoryTransport {
    fs: MemoryFs,
    connected: bool,
    chunk_size: usize,
    /// Disconnect after this many successful uploads.
    drop_after_uploads: Option<usize>,
    uploads: usize,
    download_delay: Option<Duration>,
}

impl MemoryTransport {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            connected: true,
            chunk_size: 1024,
            drop_after_uploads: None,
            uploads: 0,
            download_delay: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Simulate the link dropping once `n` uploads have completed.
    pub fn drop_after_uploads(mut self, n: usize) -> Self {
        self.drop_after_uploads = Some(n);
        self
    }

    /// Hold every download open this long after the bytes are written.
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    pub fn fs(&self) -> &MemoryFs {
        &self.fs
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::transport("not connected"))
        }
    }

    fn check_link(&mut self, path: &str) -> Result<()> {
        if self.fs.state().severing.contains(path) {
            self.connected = false;
            return Err(Error::connection("memory", format!("link dropped while transferring {}", path)));
        }
        Ok(())
    }

    fn check_parent_dir(&self, path: &str) -> Result<()> {
        let parent = parent_of(path).ok_or_else(|| Error::remote(path, "has no parent"))?;
        if self.fs.is_dir(&parent) {
            Ok(())
        } else {
            Err(Error::remote(path, "parent directory does not exist"))
        }
    }
}

impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn attributes(&mut self, path: &str) -> Result<Option<RemoteAttributes>> {
        self.ensure_connected()?;
        Ok(match self.fs.state().nodes.get(&normalize(path)) {
            Some(Node::Dir) => Some(RemoteAttributes {
                kind: RemoteKind::Directory,
                size: 0,
            }),
            Some(Node::File(data)) => Some(RemoteAttributes {
                kind: RemoteKind::File,
                size: data.len() as u64,
            }),
            None => None,
        })
    }

    fn create_dir(&mut self, path: &str) -> Result<()> {
        self.ensure_connected()?;
        let path = normalize(path);
        self.check_parent_dir(&path)?;
        let mut state = self.fs.state();
        if state.nodes.contains_key(&path) {
            return Err(Error::remote(&path, "already exists"));
        }
        state.nodes.insert(path, Node::Dir);
        Ok(())
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.ensure_connected()?;
        let path = normalize(path);
        if !self.fs.is_dir(&path) {
            return Err(Error::remote(&path, "not a directory"));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
        Ok(self
            .fs
            .state()
            .nodes
            .iter()
            .filter_map(|(p, node)| {
                let rest = p.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                let kind = match node {
                    Node::Dir => RemoteKind::Directory,
                    Node::File(_) => RemoteKind::File,
                };
                Some(RemoteEntry {
                    name: rest.to_string(),
                    kind,
                })
            })
            .collect())
    }

    fn upload(&mut self, source: &mut dyn Read, _size: u64, remote_path: &str, progress: ProgressFn<'_>) -> Result<u64> {
        self.ensure_connected()?;
        let path = normalize(remote_path);
        self.check_link(&path)?;
        self.check_parent_dir(&path)?;
        if self.fs.is_dir(&path) {
            return Err(Error::remote(&path, "is a directory"));
        }
        if self.fs.state().failing.contains(&path) {
            return Err(Error::transport(format!("injected failure writing {}", path)));
        }

        let mut buf = Vec::new();
        let written = copy_with_progress(source, &mut buf, self.chunk_size, progress)?;
        self.fs.state().nodes.insert(path, Node::File(buf));

        self.uploads += 1;
        if self.drop_after_uploads == Some(self.uploads) {
            self.connected = false;
        }
        Ok(written)
    }

    fn download(&mut self, remote_path: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64> {
        self.ensure_connected()?;
        let path = normalize(remote_path);
        self.check_link(&path)?;
        if self.fs.state().failing.contains(&path) {
            return Err(Error::transport(format!("injected failure reading {}", path)));
        }
        let data = self.fs.read(&path).ok_or_else(|| Error::remote(&path, "no such file"))?;
        let read = copy_with_progress(&mut data.as_slice(), sink, self.chunk_size, progress)?;
        if let Some(delay) = self.download_delay {
            std::thread::sleep(delay);
        }
        Ok(read)
    }

    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        self.ensure_connected()?;
        self.fs.state().commands.push(command.to_string());
        Ok(match command.strip_prefix("echo ") {
            Some(text) => CommandOutput {
                output: format!("{}\n", text),
                error: String::new(),
                exit_status: 0,
            },
            None => CommandOutput {
                output: String::new(),
                error: format!("{}: command not found\n", command),
                exit_status: 127,
            },
        })
    }
}
