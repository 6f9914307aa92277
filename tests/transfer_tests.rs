use hostlink::*;
use hostlink_test_utils::{MemoryFs, MockConnector};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

fn session(dir: &tempfile::TempDir, settings: HostlinkSettings) -> (Hostlink, SessionHandle, MemoryFs) {
    let settings = HostlinkSettings {
        trust_store_path: Some(dir.path().join("trusted_hosts.json")),
        ..settings
    };
    let connector = Arc::new(MockConnector::new());
    let remote = connector.add_host("web1", "aa:bb");
    remote.mkdir_p("/srv");

    let hostlink = Hostlink::with_connector(settings, connector).unwrap();
    let info = hostlink
        .connection("web1")
        .protocol(Protocol::Sftp)
        .credentials(Credentials::password("deploy", "secret"))
        .build()
        .unwrap();
    let handle = hostlink
        .create_session(&info, TrustFlags::accept_new(), Arc::new(DenyPrompt))
        .unwrap();
    (hostlink, handle, remote)
}

fn local_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

#[derive(Default)]
struct Recorder {
    percents: Vec<u8>,
    cleared: usize,
    finished: Vec<String>,
}

impl TransferObserver for Recorder {
    fn progress(&mut self, update: &ProgressUpdate<'_>) {
        self.percents.push(update.percent);
    }

    fn clear(&mut self, _item: &str) {
        self.cleared += 1;
    }

    fn item_finished(&mut self, outcome: &ItemOutcome) {
        self.finished.push(outcome.destination.clone());
    }
}

#[test]
fn test_directory_round_trip_through_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, handle, remote) = session(&dir, HostlinkSettings::default());

    let src = dir.path().join("site");
    std::fs::create_dir_all(src.join("css")).unwrap();
    std::fs::write(src.join("index.html"), b"<html></html>").unwrap();
    std::fs::write(src.join("css/main.css"), b"body {}").unwrap();

    let cancel = CancellationToken::new();
    let up = hostlink
        .transfer(&handle, &TransferTask::upload(&src, "/srv"), &mut NoopObserver, &cancel)
        .unwrap();
    assert_eq!(up.succeeded(), 2);
    assert_eq!(remote.files_under("/srv/site"), local_files(&src));

    let out = dir.path().join("mirror");
    std::fs::create_dir(&out).unwrap();
    let down = hostlink
        .transfer(
            &handle,
            &TransferTask::download("/srv/site", &out).rename("copy"),
            &mut NoopObserver,
            &cancel,
        )
        .unwrap();
    assert!(down.is_clean());
    assert_eq!(local_files(&out.join("copy")), local_files(&src));
}

#[test]
fn test_conflicts_are_reported_per_item() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, handle, remote) = session(&dir, HostlinkSettings::default());
    let src = dir.path().join("batch");
    std::fs::create_dir(&src).unwrap();
    for i in 0..150 {
        std::fs::write(src.join(format!("f{:03}", i)), b"new").unwrap();
    }
    remote.write("/srv/batch/f077", b"old");

    let mut recorder = Recorder::default();
    let report = hostlink
        .transfer(&handle, &TransferTask::upload(&src, "/srv"), &mut recorder, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.succeeded(), 149);
    assert_eq!(report.failed(), 1);
    assert!(report.aborted.is_none());
    assert_eq!(recorder.finished.len(), 150);
    assert_eq!(remote.read("/srv/batch/f077").unwrap(), b"old");
}

#[test]
fn test_progress_follows_settings() {
    let dir = tempfile::tempdir().unwrap();
    let settings = HostlinkSettings {
        chunk_size: 1000,
        progress: ProgressSettings {
            percent_step: 25,
            call_stride: 1,
            min_interval_ms: 0,
        },
        ..Default::default()
    };
    let (hostlink, handle, _remote) = session(&dir, settings);
    let file = dir.path().join("big.bin");
    std::fs::write(&file, vec![0u8; 100_000]).unwrap();

    let mut recorder = Recorder::default();
    hostlink
        .transfer(&handle, &TransferTask::upload(&file, "/srv"), &mut recorder, &CancellationToken::new())
        .unwrap();
    assert_eq!(recorder.percents, vec![25, 50, 75]);
    assert_eq!(recorder.cleared, 1);
}

#[test]
fn test_stop_on_error_option() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, handle, remote) = session(&dir, HostlinkSettings::default());
    let src = dir.path().join("d");
    std::fs::create_dir(&src).unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(src.join(name), name).unwrap();
    }
    remote.write("/srv/d/a", b"taken");

    let options = TransferOptions {
        stop_on_error: true,
        ..hostlink.transfer_options()
    };
    let report = hostlink
        .transfer_with(
            &handle,
            &TransferTask::upload(&src, "/srv"),
            &options,
            &mut NoopObserver,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert!(!remote.exists("/srv/d/b"));
}

#[test]
fn test_single_file_errors_are_returned() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, handle, remote) = session(&dir, HostlinkSettings::default());
    remote.write("/srv/app.conf", b"remote");
    std::fs::write(dir.path().join("app.conf"), b"local").unwrap();

    let err = hostlink
        .transfer(
            &handle,
            &TransferTask::download("/srv/app.conf", dir.path()),
            &mut NoopObserver,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(err.is_overwrite_conflict());
    assert_eq!(std::fs::read(dir.path().join("app.conf")).unwrap(), b"local");

    let err = hostlink
        .transfer(
            &handle,
            &TransferTask::download("/srv/app.conf", dir.path()).rename(".."),
            &mut NoopObserver,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{:?}", err);
}
