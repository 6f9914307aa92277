// ── Hostlink context ──────────────────────────────────────────────────────────
//
// Explicit replacement for process-global state: one trust store, one session
// registry and one connector, shared behind `Arc` so batch operations can fan
// out onto blocking worker threads.

use futures::stream::{self, StreamExt};
use hostlink_core::{Error, HostlinkSettings, Protocol, Result};
use hostlink_session::{
    establish, CommandOutput, ConnectionInfo, ConnectionInfoBuilder, Connector, HostKeyInfo, SessionHandle,
    SessionRegistry, Ssh2Connector,
};
use hostlink_transfer::{
    LogObserver, TransferObserver, TransferOptions, TransferOrchestrator, TransferReport, TransferTask,
};
use hostlink_trust::{TrustEntry, TrustFlags, TrustPolicy, TrustPrompt, TrustStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Hostlink {
    settings: HostlinkSettings,
    trust: Arc<TrustStore>,
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn Connector>,
}

impl Hostlink {
    /// Load the trust store named by `settings` and connect over ssh2.
    pub fn new(settings: HostlinkSettings) -> Result<Self> {
        Self::with_connector(settings, Arc::new(Ssh2Connector::new()))
    }

    pub fn with_connector(settings: HostlinkSettings, connector: Arc<dyn Connector>) -> Result<Self> {
        let trust = Arc::new(TrustStore::load(settings.trust_store_path()?)?);
        Ok(Self::from_parts(settings, trust, connector))
    }

    pub fn from_parts(settings: HostlinkSettings, trust: Arc<TrustStore>, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            trust,
            registry: Arc::new(SessionRegistry::new()),
            connector,
        }
    }

    pub fn settings(&self) -> &HostlinkSettings {
        &self.settings
    }

    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Connection builder pre-filled from settings.
    pub fn connection(&self, host: &str) -> ConnectionInfoBuilder {
        ConnectionInfo::builder(host).settings(&self.settings)
    }

    pub fn policy(&self, flags: TrustFlags, prompt: Arc<dyn TrustPrompt>) -> TrustPolicy {
        TrustPolicy::new(Arc::clone(&self.trust), flags, prompt)
    }

    // ── Sessions ─────────────────────────────────────────────────────────────

    pub fn create_session(
        &self,
        info: &ConnectionInfo,
        flags: TrustFlags,
        prompt: Arc<dyn TrustPrompt>,
    ) -> Result<SessionHandle> {
        let policy = self.policy(flags, prompt);
        establish(self.connector.as_ref(), &policy, &self.registry, info)
    }

    /// Connect to every target with at most `max_concurrent_hosts` handshakes
    /// in flight. Results come back in input order; failures never stop the
    /// batch.
    pub async fn create_sessions(
        &self,
        targets: Vec<ConnectionInfo>,
        flags: TrustFlags,
        prompt: Arc<dyn TrustPrompt>,
    ) -> Vec<(String, Result<SessionHandle>)> {
        let policy = self.policy(flags, prompt);
        let limit = self.settings.max_concurrent_hosts.max(1);
        info!("Connecting to {} host(s), {} at a time", targets.len(), limit);

        let mut results: Vec<(usize, String, Result<SessionHandle>)> = stream::iter(targets.into_iter().enumerate())
            .map(|(index, info)| {
                let connector = Arc::clone(&self.connector);
                let registry = Arc::clone(&self.registry);
                let policy = policy.clone();
                async move {
                    let host = info.host.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        establish(connector.as_ref(), &policy, &registry, &info)
                    })
                    .await
                    .unwrap_or_else(|e| Err(Error::connection(&host, format!("connect task failed: {}", e))));
                    (index, host, result)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        results.sort_by_key(|(index, _, _)| *index);
        let failed = results.iter().filter(|(_, _, r)| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} connection(s) failed", failed, results.len());
        }
        results.into_iter().map(|(_, host, result)| (host, result)).collect()
    }

    /// Sessions of one family, optionally restricted to `ids` (unknown ids
    /// are ignored), in id order.
    pub fn list_sessions(&self, protocol: Protocol, ids: Option<&[usize]>) -> Vec<SessionHandle> {
        match ids {
            Some(ids) => self.registry.lookup_ids(protocol, ids),
            None => self.registry.list(protocol),
        }
    }

    pub fn session(&self, protocol: Protocol, id: usize) -> Result<SessionHandle> {
        self.registry.get(protocol, id)
    }

    pub fn disconnect(&self, handle: &SessionHandle) -> Result<()> {
        self.registry.disconnect(handle.protocol(), handle.id())
    }

    pub fn invoke_command(&self, handle: &SessionHandle, command: &str) -> Result<CommandOutput> {
        debug!("{} session {}: exec {}", handle.protocol(), handle.id(), command);
        handle.with_transport(|t| {
            ensure_live(handle, t.is_connected())?;
            t.exec(command)
        })
    }

    // ── Transfers ────────────────────────────────────────────────────────────

    /// Options derived from settings.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            progress: self.settings.progress.clone(),
            stop_on_error: false,
        }
    }

    pub fn transfer(
        &self,
        handle: &SessionHandle,
        task: &TransferTask,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        self.transfer_with(handle, task, &self.transfer_options(), observer, cancel)
    }

    pub fn transfer_with(
        &self,
        handle: &SessionHandle,
        task: &TransferTask,
        options: &TransferOptions,
        observer: &mut dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let orchestrator = TransferOrchestrator::new(options.clone());
        handle.with_transport(|t| {
            ensure_live(handle, t.is_connected())?;
            orchestrator.execute(t, task, observer, cancel)
        })
    }

    /// Run the same task against every handle, bounded by
    /// `max_concurrent_hosts`. Progress and outcomes go to the log.
    pub async fn transfer_all(
        &self,
        handles: Vec<SessionHandle>,
        task: TransferTask,
        cancel: CancellationToken,
    ) -> Vec<(SessionHandle, Result<TransferReport>)> {
        let jobs = handles.into_iter().map(|h| (h, task.clone())).collect();
        self.transfer_each(jobs, cancel).await
    }

    /// Run a task per handle, bounded by `max_concurrent_hosts`. Results come
    /// back in input order.
    pub async fn transfer_each(
        &self,
        jobs: Vec<(SessionHandle, TransferTask)>,
        cancel: CancellationToken,
    ) -> Vec<(SessionHandle, Result<TransferReport>)> {
        let limit = self.settings.max_concurrent_hosts.max(1);
        let options = self.transfer_options();

        let mut results: Vec<(usize, SessionHandle, Result<TransferReport>)> =
            stream::iter(jobs.into_iter().enumerate())
                .map(|(index, (handle, task))| {
                    let options = options.clone();
                    let cancel = cancel.clone();
                    async move {
                        let worker = handle.clone();
                        let result = tokio::task::spawn_blocking(move || {
                            let orchestrator = TransferOrchestrator::new(options);
                            worker.with_transport(|t| {
                                ensure_live(&worker, t.is_connected())?;
                                orchestrator.execute(t, &task, &mut LogObserver, &cancel)
                            })
                        })
                        .await
                        .unwrap_or_else(|e| Err(Error::transport(format!("transfer task failed: {}", e))));
                        (index, handle, result)
                    }
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        results.sort_by_key(|(index, _, _)| *index);
        results.into_iter().map(|(_, handle, result)| (handle, result)).collect()
    }

    // ── Host keys ────────────────────────────────────────────────────────────

    /// Handshake only; report the presented key without consulting trust.
    pub fn host_key(&self, info: &ConnectionInfo) -> Result<HostKeyInfo> {
        self.connector.host_key(info)
    }

    pub fn trusted_hosts(&self) -> Vec<TrustEntry> {
        self.trust.entries()
    }

    /// Add `fingerprint` to the trusted set for `host`. Returns false when it
    /// was already trusted.
    pub fn trust_host(&self, host: &str, fingerprint: &str) -> Result<bool> {
        self.trust.set(host, fingerprint)
    }
}

fn ensure_live(handle: &SessionHandle, connected: bool) -> Result<()> {
    if connected {
        Ok(())
    } else {
        Err(Error::transport(format!(
            "{} session {} to {} is disconnected",
            handle.protocol(),
            handle.id(),
            handle.host()
        )))
    }
}
