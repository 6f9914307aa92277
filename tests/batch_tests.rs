use hostlink::*;
use hostlink_test_utils::{MemoryFs, MockConnector};
use std::sync::Arc;
use std::time::Duration;

fn context(dir: &tempfile::TempDir, connector: MockConnector, limit: usize) -> (Hostlink, Arc<MockConnector>) {
    let settings = HostlinkSettings {
        trust_store_path: Some(dir.path().join("trusted_hosts.json")),
        max_concurrent_hosts: limit,
        ..Default::default()
    };
    let connector = Arc::new(connector);
    let hostlink = Hostlink::with_connector(settings, connector.clone()).unwrap();
    (hostlink, connector)
}

fn targets(hostlink: &Hostlink, hosts: &[&str]) -> Vec<ConnectionInfo> {
    hosts
        .iter()
        .map(|h| {
            hostlink
                .connection(h)
                .protocol(Protocol::Sftp)
                .credentials(Credentials::password("deploy", "secret"))
                .build()
                .unwrap()
        })
        .collect()
}

async fn connect_all(hostlink: &Hostlink, hosts: &[&str]) -> Vec<SessionHandle> {
    hostlink
        .create_sessions(targets(hostlink, hosts), TrustFlags::accept_new(), Arc::new(DenyPrompt))
        .await
        .into_iter()
        .map(|(_, r)| r.unwrap())
        .collect()
}

#[tokio::test]
async fn test_create_sessions_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, connector) = context(&dir, MockConnector::new().with_latency(Duration::from_millis(20)), 2);
    for (i, host) in ["h0", "h1", "h2", "h3", "h4", "h5"].iter().enumerate() {
        connector.add_host(host, &format!("{:02x}:{:02x}", i, i));
    }
    connector.set_unreachable("h2");
    hostlink.trust_host("h4", "ff:ff").unwrap();

    let hosts = ["h0", "h1", "h2", "h3", "h4", "h5"];
    let results = hostlink
        .create_sessions(targets(&hostlink, &hosts), TrustFlags::accept_new(), Arc::new(DenyPrompt))
        .await;

    let order: Vec<&str> = results.iter().map(|(h, _)| h.as_str()).collect();
    assert_eq!(order, hosts);
    assert!(matches!(results[2].1, Err(Error::Connection { .. })));
    assert!(matches!(results[4].1, Err(Error::TrustRejected { .. })));
    assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 4);

    assert_eq!(connector.attempts(), 6);
    assert!(connector.peak_in_flight() <= 2, "peak {}", connector.peak_in_flight());
    assert_eq!(hostlink.list_sessions(Protocol::Sftp, None).len(), 4);
}

#[test]
fn test_create_sessions_on_a_current_thread_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, connector) = context(&dir, MockConnector::new(), 1);
    connector.add_host("h1", "aa:aa");

    let results = tokio_test::block_on(hostlink.create_sessions(
        targets(&hostlink, &["h1"]),
        TrustFlags::accept_new(),
        Arc::new(DenyPrompt),
    ));
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
}

#[tokio::test]
async fn test_transfer_all_uploads_to_every_host() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, connector) = context(&dir, MockConnector::new(), 2);
    let remotes: Vec<MemoryFs> = ["h1", "h2", "h3"]
        .iter()
        .map(|h| {
            let fs = connector.add_host(h, "aa:aa");
            fs.mkdir_p("/data");
            fs
        })
        .collect();
    let local = dir.path().join("release.tar");
    std::fs::write(&local, b"payload").unwrap();

    let handles = connect_all(&hostlink, &["h1", "h2", "h3"]).await;
    let results = hostlink
        .transfer_all(handles, TransferTask::upload(&local, "/data"), CancellationToken::new())
        .await;

    assert_eq!(results.len(), 3);
    for (handle, result) in &results {
        assert!(result.as_ref().unwrap().is_clean(), "{}", handle.host());
    }
    for fs in &remotes {
        assert_eq!(fs.read("/data/release.tar").unwrap(), b"payload");
    }
}

#[tokio::test]
async fn test_transfer_each_downloads_into_per_host_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, connector) = context(&dir, MockConnector::new(), 4);
    for host in ["h1", "h2"] {
        connector
            .add_host(host, "aa:aa")
            .write("/var/log/app.log", format!("log of {}", host).as_bytes());
    }

    let handles = connect_all(&hostlink, &["h1", "h2"]).await;
    let jobs = handles
        .into_iter()
        .map(|h| {
            let local = dir.path().join(h.host());
            std::fs::create_dir(&local).unwrap();
            (h, TransferTask::download("/var/log/app.log", local))
        })
        .collect();
    let results = hostlink.transfer_each(jobs, CancellationToken::new()).await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    for host in ["h1", "h2"] {
        let got = std::fs::read_to_string(dir.path().join(host).join("app.log")).unwrap();
        assert_eq!(got, format!("log of {}", host));
    }
}

#[tokio::test]
async fn test_disconnected_session_fails_only_its_own_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, connector) = context(&dir, MockConnector::new(), 2);
    for host in ["h1", "h2"] {
        connector.add_host(host, "aa:aa").mkdir_p("/data");
    }
    let local = dir.path().join("f.txt");
    std::fs::write(&local, b"x").unwrap();

    let handles = connect_all(&hostlink, &["h1", "h2"]).await;
    hostlink.disconnect(&handles[0]).unwrap();

    let results = hostlink
        .transfer_all(handles, TransferTask::upload(&local, "/data"), CancellationToken::new())
        .await;
    assert!(matches!(results[0].1, Err(Error::Transport(_))));
    assert!(results[1].1.is_ok());
}

#[tokio::test]
async fn test_cancelled_batch_transfers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (hostlink, connector) = context(&dir, MockConnector::new(), 2);
    let remote = connector.add_host("h1", "aa:aa");
    remote.mkdir_p("/data");
    let local = dir.path().join("f.txt");
    std::fs::write(&local, b"x").unwrap();

    let handles = connect_all(&hostlink, &["h1"]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = hostlink
        .transfer_all(handles, TransferTask::upload(&local, "/data"), cancel)
        .await;
    assert!(matches!(results[0].1, Err(Error::Cancelled)));
    assert!(!remote.exists("/data/f.txt"));
}
