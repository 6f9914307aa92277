// ── Directory trees ───────────────────────────────────────────────────────────
//
// Depth-first, entries in name order. Directories are created on demand and
// merged into when they already exist; each file goes through the single-file
// path. Per-item failures become outcomes, while cancellation and a dropped
// connection abort the walk.

use crate::transfer::orchestrator::{record, TransferOrchestrator};
use crate::transfer::progress::TransferObserver;
use crate::transfer::types::*;
use hostlink_core::{Error, Result};
use hostlink_session::{remote_join, RemoteKind, Transport};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// State shared across one tree walk.
struct Walk<'a> {
    transport: &'a mut dyn Transport,
    observer: &'a mut dyn TransferObserver,
    cancel: &'a CancellationToken,
    overwrite: bool,
    stop_on_error: bool,
    report: TransferReport,
}

impl Walk<'_> {
    fn proceed(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.report.aborted = Some(Error::Cancelled);
            return false;
        }
        true
    }

    /// Record an item result. Returns false when the walk must stop.
    fn settle(&mut self, source: String, destination: String, kind: ItemKind, result: Result<u64>) -> bool {
        let result = match result {
            Err(e) if e.is_terminating_for_batch() => {
                warn!("Transfer aborted at {}: {}", source, e);
                self.report.aborted = Some(e);
                return false;
            }
            other => other,
        };

        let failed = result.is_err();
        record(
            &mut self.report,
            self.observer,
            ItemOutcome {
                source,
                destination,
                kind,
                result,
            },
        );
        if !failed {
            return true;
        }
        if !self.transport.is_connected() {
            self.report.aborted = Some(Error::transport("connection lost during transfer"));
            return false;
        }
        !self.stop_on_error
    }
}

impl TransferOrchestrator {
    pub(crate) fn upload_tree(
        &self,
        transport: &mut dyn Transport,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
        source_root: &Path,
        dest_root: &str,
        overwrite: bool,
    ) -> TransferReport {
        let mut walk = Walk {
            transport,
            observer,
            cancel,
            overwrite,
            stop_on_error: self.options().stop_on_error,
            report: TransferReport::default(),
        };

        let mut entries = WalkDir::new(source_root).follow_links(true).sort_by_file_name().into_iter();
        while let Some(entry) = entries.next() {
            if !walk.proceed() {
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().unwrap_or(source_root).to_path_buf();
                    let err = Error::local(&path, &e);
                    if !walk.settle(path.display().to_string(), String::new(), ItemKind::File, Err(err)) {
                        break;
                    }
                    continue;
                }
            };

            let destination = match entry.path().strip_prefix(source_root) {
                Ok(rel) if rel.as_os_str().is_empty() => dest_root.to_string(),
                Ok(rel) => remote_join(dest_root, &to_remote_relative(rel)),
                Err(_) => continue,
            };
            let source = entry.path().display().to_string();

            if entry.file_type().is_dir() {
                match ensure_remote_dir(walk.transport, &destination) {
                    Ok(()) => debug!("Remote directory ready: {}", destination),
                    Err(e) => {
                        entries.skip_current_dir();
                        if !walk.settle(source, destination, ItemKind::Directory, Err(e)) {
                            break;
                        }
                    }
                }
            } else if entry.file_type().is_file() {
                let result =
                    self.upload_file(walk.transport, entry.path(), &destination, walk.overwrite, walk.observer, cancel);
                if !walk.settle(source, destination, ItemKind::File, result) {
                    break;
                }
            } else {
                debug!("Skipping {}: not a regular file", source);
            }
        }

        walk.report
    }

    pub(crate) fn download_tree(
        &self,
        transport: &mut dyn Transport,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
        source_root: &str,
        dest_root: &Path,
        overwrite: bool,
    ) -> TransferReport {
        let mut walk = Walk {
            transport,
            observer,
            cancel,
            overwrite,
            stop_on_error: self.options().stop_on_error,
            report: TransferReport::default(),
        };
        self.download_dir(&mut walk, source_root, dest_root);
        walk.report
    }

    /// Returns false when the walk must stop.
    fn download_dir(&self, walk: &mut Walk<'_>, remote_dir: &str, local_dir: &Path) -> bool {
        if !walk.proceed() {
            return false;
        }

        let listing = ensure_local_dir(local_dir).and_then(|()| walk.transport.list_dir(remote_dir));
        let mut entries = match listing {
            Ok(entries) => entries,
            Err(e) => {
                return walk.settle(
                    remote_dir.to_string(),
                    local_dir.display().to_string(),
                    ItemKind::Directory,
                    Err(e),
                )
            }
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            if !walk.proceed() {
                return false;
            }
            if entry.name.contains('/') || entry.name.contains('\\') || entry.name == ".." || entry.name == "." {
                warn!("Skipping suspicious remote entry '{}' in {}", entry.name, remote_dir);
                continue;
            }

            let source = remote_join(remote_dir, &entry.name);
            let destination = local_dir.join(&entry.name);
            let keep_going = match entry.kind {
                RemoteKind::Directory => self.download_dir(walk, &source, &destination),
                RemoteKind::File => {
                    let result = self.download_file(
                        walk.transport,
                        &source,
                        &destination,
                        walk.overwrite,
                        walk.observer,
                        walk.cancel,
                    );
                    walk.settle(source, destination.display().to_string(), ItemKind::File, result)
                }
                RemoteKind::Other => {
                    debug!("Skipping {}: not a regular file", source);
                    true
                }
            };
            if !keep_going {
                return false;
            }
        }
        true
    }
}

fn ensure_remote_dir(transport: &mut dyn Transport, path: &str) -> Result<()> {
    match transport.attributes(path)? {
        Some(a) if a.is_dir() => Ok(()),
        Some(_) => Err(Error::remote(path, "exists and is not a directory")),
        None => transport.create_dir(path),
    }
}

fn ensure_local_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(Error::local(path, "exists and is not a directory")),
        Err(e) if e.kind() == ErrorKind::NotFound => fs::create_dir(path).map_err(|e| Error::local(path, e)),
        Err(e) => Err(Error::local(path, e)),
    }
}

/// Relative local path rendered with `/` separators.
fn to_remote_relative(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_use_forward_slashes() {
        let rel = Path::new("a").join("b").join("c.txt");
        assert_eq!(to_remote_relative(&rel), "a/b/c.txt");
    }

    #[test]
    fn test_local_dir_is_created_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sub");
        ensure_local_dir(&dir).unwrap();
        ensure_local_dir(&dir).unwrap();
        assert!(dir.is_dir());

        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        assert!(ensure_local_dir(&file).is_err());
    }
}
