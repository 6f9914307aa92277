//! Scripted connector.
//!
//! Each registered host has a fixed host-key fingerprint and a `MemoryFs`.
//! `connect` runs the real verifier before "authenticating", so trust
//! behaviour is exercised exactly as with a network connector.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use hostlink_core::fingerprint::{fingerprint_of, openssh_fingerprint_of};
use hostlink_core::{Error, Result};
use hostlink_session::{Connected, ConnectionInfo, Connector, HostKeyInfo};
use hostlink_trust::HostKeyVerifier;

use crate::memory::MemoryFs;

#[derive(Debug, Clone)]
struct MockHost {
    fingerprint: String,
    openssh_fingerprint: String,
    fs: MemoryFs,
    unreachable: bool,
    reject_auth: bool,
}

#[derive(Debug, Default)]
pub struct MockConnector {
    hosts: Mutex<BTreeMap<String, MockHost>>,
    latency: Option<Duration>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each connect blocks this long (to observe concurrency).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn hosts(&self) -> MutexGuard<'_, BTreeMap<String, MockHost>> {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `host` presenting `fingerprint`; returns its filesystem.
    pub fn add_host(&self, host: &str, fingerprint: &str) -> MemoryFs {
        let fs = MemoryFs::new();
        self.hosts().insert(
            host.to_string(),
            MockHost {
                fingerprint: fingerprint.to_string(),
                openssh_fingerprint: String::new(),
                fs: fs.clone(),
                unreachable: false,
                reject_auth: false,
            },
        );
        fs
    }

    /// Register `host` presenting the raw key blob `key`.
    pub fn add_host_key(&self, host: &str, key: &[u8]) -> MemoryFs {
        let fs = self.add_host(host, &fingerprint_of(key));
        if let Some(h) = self.hosts().get_mut(host) {
            h.openssh_fingerprint = openssh_fingerprint_of(key);
        }
        fs
    }

    /// Present a different key from now on.
    pub fn rotate_key(&self, host: &str, fingerprint: &str) {
        if let Some(h) = self.hosts().get_mut(host) {
            h.fingerprint = fingerprint.to_string();
        }
    }

    pub fn set_unreachable(&self, host: &str) {
        if let Some(h) = self.hosts().get_mut(host) {
            h.unreachable = true;
        }
    }

    pub fn reject_auth(&self, host: &str) {
        if let Some(h) = self.hosts().get_mut(host) {
            h.reject_auth = true;
        }
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `connect` calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn reachable_host(&self, info: &ConnectionInfo) -> Result<MockHost> {
        match self.hosts().get(&info.host) {
            Some(h) if !h.unreachable => Ok(h.clone()),
            _ => Err(Error::connection(
                &info.host,
                format!("TCP connection to {} failed: connection refused", info.address()),
            )),
        }
    }
}

impl Connector for MockConnector {
    fn connect(&self, info: &ConnectionInfo, verifier: &dyn HostKeyVerifier) -> Result<Connected> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let result = (|| -> Result<Connected> {
            let host = self.reachable_host(info)?;
            let decision = verifier.verify(&info.host, &host.fingerprint)?.ensure_allowed()?;
            if host.reject_auth {
                return Err(Error::connection(&info.host, "authentication failed: no method succeeded"));
            }
            Ok(Connected {
                transport: Box::new(host.fs.transport().with_chunk_size(info.chunk_size)),
                decision,
            })
        })();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn host_key(&self, info: &ConnectionInfo) -> Result<HostKeyInfo> {
        let host = self.reachable_host(info)?;
        Ok(HostKeyInfo {
            host: info.host.clone(),
            port: info.port,
            key_type: "ssh-ed25519".to_string(),
            fingerprint: host.fingerprint,
            openssh_fingerprint: host.openssh_fingerprint,
        })
    }
}
