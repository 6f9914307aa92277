// ── Session registry ──────────────────────────────────────────────────────────
//
// Per-process, append-only list of sessions per protocol family. Ids are the
// position within the family list, so they stay dense and never get reused;
// a disconnected session keeps its slot and reports `connected: false`.

use crate::session::transport::Transport;
use chrono::{DateTime, Utc};
use hostlink_core::{Error, Protocol, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Static facts about a session, captured at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub fingerprint: String,
    pub connected_at: DateTime<Utc>,
}

/// Serializable listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: usize,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub fingerprint: String,
    pub connected: bool,
    pub connected_at: DateTime<Utc>,
}

/// A registered session. Clones share the same underlying connection, and
/// operations on one connection are serialized by its lock.
#[derive(Clone)]
pub struct SessionHandle {
    id: usize,
    protocol: Protocol,
    info: SessionInfo,
    connection: Arc<Mutex<Box<dyn Transport>>>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("host", &self.info.host)
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.info.host
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Transport>>> {
        self.connection
            .lock()
            .map_err(|_| Error::transport(format!("connection to {} is poisoned", self.info.host)))
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut dyn Transport) -> Result<R>) -> Result<R> {
        let mut guard = self.lock()?;
        f(guard.as_mut())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().map(|t| t.is_connected()).unwrap_or(false)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.lock()?.disconnect()
    }

    /// True when both handles wrap the same connection.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            protocol: self.protocol,
            host: self.info.host.clone(),
            port: self.info.port,
            username: self.info.username.clone(),
            fingerprint: self.info.fingerprint.clone(),
            connected: self.is_connected(),
            connected_at: self.info.connected_at,
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    families: Mutex<BTreeMap<Protocol, Vec<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn families(&self) -> MutexGuard<'_, BTreeMap<Protocol, Vec<SessionHandle>>> {
        // The map is only ever appended to, so a poisoned guard is still consistent.
        self.families.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a connection; its id is the family list length before insertion.
    pub fn add(&self, protocol: Protocol, info: SessionInfo, transport: Box<dyn Transport>) -> SessionHandle {
        let mut families = self.families();
        let list = families.entry(protocol).or_default();
        let handle = SessionHandle {
            id: list.len(),
            protocol,
            info,
            connection: Arc::new(Mutex::new(transport)),
        };
        list.push(handle.clone());
        info!(
            "Registered {} session {} for {}@{}:{}",
            protocol, handle.id, handle.info.username, handle.info.host, handle.info.port
        );
        handle
    }

    /// Handles whose id is in `ids`, in id order. Unknown ids are skipped.
    pub fn lookup_ids(&self, protocol: Protocol, ids: &[usize]) -> Vec<SessionHandle> {
        let wanted: BTreeSet<usize> = ids.iter().copied().collect();
        self.families()
            .get(&protocol)
            .map(|list| list.iter().filter(|h| wanted.contains(&h.id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve caller-held handles back to their registered entries. Handles
    /// from another registry (or a different family slot) are skipped.
    pub fn lookup_handles(&self, handles: &[SessionHandle]) -> Vec<SessionHandle> {
        let families = self.families();
        handles
            .iter()
            .filter_map(|h| {
                families
                    .get(&h.protocol)
                    .and_then(|list| list.get(h.id))
                    .filter(|registered| registered.same_session(h))
                    .cloned()
            })
            .collect()
    }

    pub fn get(&self, protocol: Protocol, id: usize) -> Result<SessionHandle> {
        self.families()
            .get(&protocol)
            .and_then(|list| list.get(id))
            .cloned()
            .ok_or(Error::SessionNotFound { protocol, id })
    }

    /// Every session in a family, including disconnected ones.
    pub fn list(&self, protocol: Protocol) -> Vec<SessionHandle> {
        self.families().get(&protocol).cloned().unwrap_or_default()
    }

    pub fn len(&self, protocol: Protocol) -> usize {
        self.families().get(&protocol).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.families().values().all(Vec::is_empty)
    }

    /// Disconnect a session. The slot (and its id) remains.
    pub fn disconnect(&self, protocol: Protocol, id: usize) -> Result<()> {
        let handle = self.get(protocol, id)?;
        handle.disconnect()?;
        info!("Disconnected {} session {} ({})", protocol, id, handle.info.host);
        Ok(())
    }
}
