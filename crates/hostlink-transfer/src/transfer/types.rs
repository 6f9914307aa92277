// ── Types ─────────────────────────────────────────────────────────────────────

use hostlink_core::{Error, ProgressSettings, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Upload,
    Download,
}

/// One item to move. For uploads `remote_path` is the destination directory;
/// for downloads `local_path` is. The item keeps its name unless `new_name`
/// is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub direction: Direction,
    pub overwrite: bool,
    pub new_name: Option<String>,
}

impl TransferTask {
    pub fn upload(local_path: impl Into<PathBuf>, remote_dir: &str) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_dir.to_string(),
            direction: Direction::Upload,
            overwrite: false,
            new_name: None,
        }
    }

    pub fn download(remote_path: &str, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_dir.into(),
            remote_path: remote_path.to_string(),
            direction: Direction::Download,
            overwrite: false,
            new_name: None,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn rename(mut self, new_name: &str) -> Self {
        self.new_name = Some(new_name.to_string());
        self
    }

    /// `new_name`, validated as a single path component.
    pub(crate) fn checked_new_name(&self) -> Result<Option<&str>> {
        match self.new_name.as_deref() {
            None => Ok(None),
            Some(n) if n.is_empty() || n == "." || n == ".." || n.contains('/') || n.contains('\\') => {
                Err(Error::Config(format!("invalid destination name '{}'", n)))
            }
            Some(n) => Ok(Some(n)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    #[serde(default)]
    pub progress: ProgressSettings,
    /// Halt a tree transfer at the first failed item.
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    File,
    Directory,
}

/// Result for one file, or for a directory that could not be prepared.
#[derive(Debug)]
pub struct ItemOutcome {
    pub source: String,
    pub destination: String,
    pub kind: ItemKind,
    /// Bytes moved on success.
    pub result: Result<u64>,
}

impl ItemOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }
}

#[derive(Debug, Default)]
pub struct TransferReport {
    pub outcomes: Vec<ItemOutcome>,
    /// Set when the whole operation stopped early (cancellation, lost link).
    pub aborted: Option<Error>,
}

impl TransferReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    /// Every item succeeded and nothing aborted.
    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.failed() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(result: Result<u64>) -> ItemOutcome {
        ItemOutcome {
            source: "a".into(),
            destination: "b".into(),
            kind: ItemKind::File,
            result,
        }
    }

    #[test]
    fn test_report_summaries() {
        let report = TransferReport {
            outcomes: vec![outcome(Ok(10)), outcome(Err(Error::overwrite("/b"))), outcome(Ok(5))],
            aborted: None,
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total_bytes(), 15);
        assert!(!report.is_clean());
        assert!(report.failures().all(|o| o.error().map(Error::is_overwrite_conflict).unwrap_or(false)));
    }

    #[test]
    fn test_new_name_must_be_one_component() {
        assert_eq!(TransferTask::upload("/a", "/r").checked_new_name().unwrap(), None);
        assert_eq!(
            TransferTask::upload("/a", "/r").rename("b.txt").checked_new_name().unwrap(),
            Some("b.txt")
        );
        for bad in ["", "..", "x/y", "x\\y"] {
            assert!(TransferTask::upload("/a", "/r").rename(bad).checked_new_name().is_err());
        }
    }

    #[test]
    fn test_builders_default_to_no_overwrite() {
        let t = TransferTask::download("/srv/f", "/tmp");
        assert_eq!(t.direction, Direction::Download);
        assert!(!t.overwrite);
        assert!(t.overwrite(true).overwrite);
    }
}
