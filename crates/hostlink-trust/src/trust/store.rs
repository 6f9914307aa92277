// ── TrustStore – persisted host → fingerprints mapping ────────────────────────
//
// File shape (pretty JSON, sorted keys, lowercase hosts):
//
//   {
//     "h1": ["aa:bb:cc"],
//     "h2": ["01:02", "03:04"]
//   }
//
// Older files mapped a host to a single fingerprint string; both shapes load.
// Every `set` re-reads the file, merges and atomically replaces it, so two
// writers never lose each other's entries.

use crate::trust::types::TrustEntry;
use hostlink_core::fingerprint::normalize;
use hostlink_core::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

type HostMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFingerprints {
    One(String),
    Many(Vec<String>),
}

pub struct TrustStore {
    path: PathBuf,
    hosts: Mutex<HostMap>,
}

impl TrustStore {
    /// Load the store at `path`, creating an empty file if none exists.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let hosts = if path.exists() {
            read_map(&path)?
        } else {
            let empty = HostMap::new();
            write_map(&path, &empty)?;
            info!("Created empty trust store at {}", path.display());
            empty
        };

        debug!("Loaded {} trusted host(s) from {}", hosts.len(), path.display());
        Ok(Self {
            path,
            hosts: Mutex::new(hosts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trusted fingerprints for `host` (case-insensitive).
    pub fn get(&self, host: &str) -> Option<BTreeSet<String>> {
        self.lock().get(&host_key(host)).cloned()
    }

    pub fn contains(&self, host: &str, fingerprint: &str) -> bool {
        self.lock()
            .get(&host_key(host))
            .map(|set| set.contains(&normalize(fingerprint)))
            .unwrap_or(false)
    }

    /// Trust `fingerprint` for `host` and persist immediately.
    ///
    /// Returns `false` when the pair was already trusted.
    pub fn set(&self, host: &str, fingerprint: &str) -> Result<bool> {
        let host = host_key(host);
        let fingerprint = normalize(fingerprint);
        if host.is_empty() || fingerprint.is_empty() {
            return Err(Error::persistence(
                &self.path,
                "refusing to store an empty host or fingerprint",
            ));
        }

        let mut hosts = self.lock();

        let mut merged = if self.path.exists() {
            read_map(&self.path)?
        } else {
            HostMap::new()
        };
        for (h, fps) in hosts.iter() {
            merged.entry(h.clone()).or_default().extend(fps.iter().cloned());
        }
        let added = merged
            .entry(host.clone())
            .or_default()
            .insert(fingerprint.clone());

        write_map(&self.path, &merged)?;
        *hosts = merged;

        if added {
            info!("Trusted {} for host {}", fingerprint, host);
        }
        Ok(added)
    }

    /// Every trusted pair, sorted by host then fingerprint.
    pub fn entries(&self) -> Vec<TrustEntry> {
        self.lock()
            .iter()
            .flat_map(|(host, fps)| {
                fps.iter().map(move |fp| TrustEntry {
                    host: host.clone(),
                    fingerprint: fp.clone(),
                })
            })
            .collect()
    }

    /// Number of hosts with at least one trusted fingerprint.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostMap> {
        // The map is only replaced wholesale after a successful write, so a
        // poisoned guard still holds a consistent snapshot.
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn host_key(host: &str) -> String {
    host.trim().to_lowercase()
}

fn read_map(path: &Path) -> Result<HostMap> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::persistence(path, e))?;
    if raw.trim().is_empty() {
        return Ok(HostMap::new());
    }

    let stored: BTreeMap<String, StoredFingerprints> =
        serde_json::from_str(&raw).map_err(|e| Error::persistence(path, format!("malformed: {}", e)))?;

    let mut hosts = HostMap::new();
    for (host, fps) in stored {
        let fps = match fps {
            StoredFingerprints::One(fp) => vec![fp],
            StoredFingerprints::Many(fps) => fps,
        };
        let set: BTreeSet<String> = fps
            .iter()
            .map(|fp| normalize(fp))
            .filter(|fp| !fp.is_empty())
            .collect();
        if !set.is_empty() {
            hosts.entry(host_key(&host)).or_default().extend(set);
        }
    }
    Ok(hosts)
}

fn write_map(path: &Path, hosts: &HostMap) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| Error::persistence(path, e))?;

    let mut json = serde_json::to_string_pretty(hosts).map_err(|e| Error::persistence(path, e))?;
    json.push('\n');

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::persistence(path, e))?;
    tmp.write_all(json.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::persistence(path, e))?;
    tmp.persist(path).map_err(|e| Error::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> TrustStore {
        TrustStore::load(dir.path().join("trusted_hosts.json")).unwrap()
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trusted_hosts.json");
        let store = TrustStore::load(&path).unwrap();
        assert!(store.is_empty());
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn test_set_then_get_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.set("Server.Example.COM", "AA:BB:CC").unwrap());

        let fps = store.get("server.example.com").unwrap();
        assert!(fps.contains("aa:bb:cc"));
        assert!(store.contains("SERVER.example.com", "aa:bb:cc"));
        assert!(store.get("other").is_none());
    }

    #[test]
    fn test_set_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.set("h1", "aa:bb").unwrap());
        assert!(!store.set("h1", "aa:bb").unwrap());
        assert_eq!(store.get("h1").unwrap().len(), 1);
    }

    #[test]
    fn test_rotation_keeps_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set("h1", "aa:bb").unwrap();
        store.set("h1", "cc:dd").unwrap();
        let fps = store.get("h1").unwrap();
        assert_eq!(fps.len(), 2);
        assert_eq!(store.entries().len(), 2);
    }

    #[test]
    fn test_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        store_in(&dir).set("h1", "aa:bb:cc").unwrap();

        let reloaded = store_in(&dir);
        assert!(reloaded.contains("h1", "aa:bb:cc"));
    }

    #[test]
    fn test_file_is_stable_sorted_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set("zeta", "02").unwrap();
        store.set("alpha", "01").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.find("alpha").unwrap() < raw.find("zeta").unwrap());
        let parsed: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["alpha"], vec!["01".to_string()]);
    }

    #[test]
    fn test_legacy_single_fingerprint_shape_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted_hosts.json");
        std::fs::write(&path, r#"{ "H1": "AA:BB", "h2": ["01:02", "03:04"] }"#).unwrap();

        let store = TrustStore::load(&path).unwrap();
        assert!(store.contains("h1", "aa:bb"));
        assert_eq!(store.get("h2").unwrap().len(), 2);

        // Rewritten in the set shape on the next save.
        store.set("h3", "ff").unwrap();
        let parsed: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["h1"], vec!["aa:bb".to_string()]);
    }

    #[test]
    fn test_malformed_file_is_persistence_error_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted_hosts.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let err = TrustStore::load(&path).err().unwrap();
        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ this is not json");
    }

    #[test]
    fn test_corrupted_after_load_surfaces_on_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "[1, 2").unwrap();
        assert!(matches!(store.set("h1", "aa"), Err(Error::Persistence { .. })));
    }

    #[test]
    fn test_empty_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.set("  ", "aa").is_err());
        assert!(store.set("h1", "").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_two_instances_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let a = store_in(&dir);
        let b = store_in(&dir);
        a.set("h1", "aa").unwrap();
        b.set("h2", "bb").unwrap();

        let reloaded = store_in(&dir);
        assert!(reloaded.contains("h1", "aa"));
        assert!(reloaded.contains("h2", "bb"));
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let workers: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.set(&format!("host{}", t), &format!("{:02x}:{:02x}", t, i)).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.len(), 8);
        assert_eq!(reloaded.entries().len(), 80);
    }
}
