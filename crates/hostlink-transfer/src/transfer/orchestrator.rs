// ── Transfer orchestrator ─────────────────────────────────────────────────────
//
// Per file:
//   1. source exists and is a file; destination parent is a directory
//   2. existing destination + no overwrite -> OverwriteConflict, untouched
//   3. stream through the transport with a byte-count callback
//   4. throttled progress, cleared at the end either way
//   5. downloads land in a sibling temp file, renamed into place on success

use crate::transfer::progress::{ProgressThrottle, ProgressUpdate, TransferObserver};
use crate::transfer::types::*;
use hostlink_core::{Error, Result};
use hostlink_session::{remote_file_name, remote_join, ProgressFn, Transport};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct TransferOrchestrator {
    options: TransferOptions,
}

impl TransferOrchestrator {
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Run one task. A file source fails with `Err` on any problem; a
    /// directory source records per-item failures in the report instead.
    pub fn execute(
        &self,
        transport: &mut dyn Transport,
        task: &TransferTask,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let report = match task.direction {
            Direction::Upload => self.upload(transport, task, observer, cancel)?,
            Direction::Download => self.download(transport, task, observer, cancel)?,
        };
        info!(
            "{:?} {} <-> {}: {} succeeded, {} failed, {} bytes{}",
            task.direction,
            task.local_path.display(),
            task.remote_path,
            report.succeeded(),
            report.failed(),
            report.total_bytes(),
            if report.aborted.is_some() { " (aborted)" } else { "" }
        );
        Ok(report)
    }

    fn upload(
        &self,
        transport: &mut dyn Transport,
        task: &TransferTask,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let source = &task.local_path;
        let meta = local_metadata(source)?;

        let name = match task.checked_new_name()? {
            Some(n) => n.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| Error::local(source, "has no file name"))?,
        };

        match transport.attributes(&task.remote_path)? {
            Some(a) if a.is_dir() => {}
            Some(_) => return Err(Error::remote(&task.remote_path, "is not a directory")),
            None => return Err(Error::remote(&task.remote_path, "does not exist")),
        }
        let destination = remote_join(&task.remote_path, &name);

        if meta.is_dir() {
            return Ok(self.upload_tree(transport, observer, cancel, source, &destination, task.overwrite));
        }

        let bytes = self.upload_file(transport, source, &destination, task.overwrite, observer, cancel)?;
        let mut report = TransferReport::default();
        record(
            &mut report,
            observer,
            ItemOutcome {
                source: source.display().to_string(),
                destination,
                kind: ItemKind::File,
                result: Ok(bytes),
            },
        );
        Ok(report)
    }

    fn download(
        &self,
        transport: &mut dyn Transport,
        task: &TransferTask,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let source = task.remote_path.as_str();
        let attrs = transport
            .attributes(source)?
            .ok_or_else(|| Error::remote(source, "does not exist"))?;

        let dest_dir = &task.local_path;
        if !local_metadata(dest_dir)?.is_dir() {
            return Err(Error::local(dest_dir, "is not a directory"));
        }

        let name = match task.checked_new_name()? {
            Some(n) => n.to_string(),
            None => remote_file_name(source)
                .map(str::to_string)
                .ok_or_else(|| Error::remote(source, "has no file name"))?,
        };
        let destination = dest_dir.join(name);

        if attrs.is_dir() {
            return Ok(self.download_tree(transport, observer, cancel, source, &destination, task.overwrite));
        }

        if !attrs.is_file() {
            return Err(Error::remote(source, "is neither a regular file nor a directory"));
        }

        let bytes = self.download_file(transport, source, &destination, task.overwrite, observer, cancel)?;
        let mut report = TransferReport::default();
        record(
            &mut report,
            observer,
            ItemOutcome {
                source: source.to_string(),
                destination: destination.display().to_string(),
                kind: ItemKind::File,
                result: Ok(bytes),
            },
        );
        Ok(report)
    }

    // ── Single file ──────────────────────────────────────────────────────────

    pub(crate) fn upload_file(
        &self,
        transport: &mut dyn Transport,
        source: &Path,
        destination: &str,
        overwrite: bool,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let meta = local_metadata(source)?;
        if meta.is_dir() {
            return Err(Error::local(source, "is a directory, expected a file"));
        }

        match transport.attributes(destination)? {
            Some(a) if a.is_dir() => return Err(Error::remote(destination, "exists as a directory")),
            Some(_) if !overwrite => return Err(Error::overwrite(destination)),
            _ => {}
        }

        let mut file = File::open(source).map_err(|e| Error::local(source, e))?;
        let size = meta.len();
        let label = source.display().to_string();
        debug!("Uploading {} -> {} ({} bytes)", label, destination, size);

        self.stream(&label, size, observer, cancel, |progress| {
            transport.upload(&mut file, size, destination, progress)
        })
    }

    pub(crate) fn download_file(
        &self,
        transport: &mut dyn Transport,
        source: &str,
        destination: &Path,
        overwrite: bool,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let attrs = transport
            .attributes(source)?
            .ok_or_else(|| Error::remote(source, "does not exist"))?;
        if !attrs.is_file() {
            return Err(Error::remote(source, "is not a regular file"));
        }

        match fs::metadata(destination) {
            Ok(m) if m.is_dir() => return Err(Error::local(destination, "exists as a directory")),
            Ok(_) if !overwrite => return Err(Error::overwrite(destination.display())),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::local(destination, e)),
        }

        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !local_metadata(parent)?.is_dir() {
            return Err(Error::local(parent, "is not a directory"));
        }

        let mut staging = tempfile::Builder::new()
            .prefix(".hostlink-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| Error::local(parent, format!("cannot create temporary file: {}", e)))?;
        debug!("Downloading {} -> {} ({} bytes)", source, destination.display(), attrs.size);

        // The staging file is removed on drop if anything below fails.
        let bytes = self.stream(source, attrs.size, observer, cancel, |progress| {
            transport.download(source, staging.as_file_mut(), progress)
        })?;
        staging
            .as_file()
            .sync_all()
            .map_err(|e| Error::local(destination, e))?;
        // Without overwrite the commit itself must not replace a file that
        // appeared while streaming.
        let committed = if overwrite {
            staging.persist(destination).map(|_| ())
        } else {
            staging.persist_noclobber(destination).map(|_| ())
        };
        committed.map_err(|e| match e.error.kind() {
            ErrorKind::AlreadyExists if !overwrite => Error::overwrite(destination.display()),
            _ => Error::local(destination, e.error),
        })?;
        Ok(bytes)
    }

    /// Run `op` with a progress callback wired to the throttle, observer and
    /// cancellation token; the indicator is cleared whatever the result.
    fn stream<F>(
        &self,
        item: &str,
        total: u64,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<u64>
    where
        F: FnOnce(ProgressFn<'_>) -> Result<u64>,
    {
        let mut throttle = ProgressThrottle::new(&self.options.progress, total);
        let result = {
            let mut on_bytes = |bytes: u64| {
                if cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                if let Some(percent) = throttle.observe(bytes) {
                    observer.progress(&ProgressUpdate {
                        item,
                        percent,
                        bytes,
                        total,
                    });
                }
                ControlFlow::Continue(())
            };
            let progress: ProgressFn<'_> = &mut on_bytes;
            op(progress)
        };
        observer.clear(item);
        result
    }
}

pub(crate) fn record(report: &mut TransferReport, observer: &mut dyn TransferObserver, outcome: ItemOutcome) {
    observer.item_finished(&outcome);
    report.outcomes.push(outcome);
}

fn local_metadata(path: &Path) -> Result<fs::Metadata> {
    fs::metadata(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::local(path, "does not exist")
        } else {
            Error::local(path, e)
        }
    })
}
