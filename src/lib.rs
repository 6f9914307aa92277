//! # hostlink
//!
//! Trusted SSH / SFTP sessions and file transfer across many hosts.
//!
//! The [`Hostlink`] context owns the process-wide state (trust store, session
//! registry, connector) and exposes the operator-facing operations:
//! connecting (singly or in bounded-concurrency batches), listing sessions,
//! transferring files and directory trees, running commands, and managing
//! trusted host keys.

mod context;

pub use context::Hostlink;

pub use hostlink_core::logging::init_logging;
pub use hostlink_core::{Error, HostlinkSettings, LogFormat, LoggingSettings, ProgressSettings, Protocol, Result};
pub use hostlink_session::{
    CommandOutput, ConnectionInfo, ConnectionInfoBuilder, Connector, Credentials, HostKeyInfo, SessionHandle,
    SessionRegistry, SessionSummary, Ssh2Connector, Transport,
};
pub use hostlink_transfer::{
    Direction, ItemKind, ItemOutcome, LogObserver, NoopObserver, ProgressUpdate, TransferObserver, TransferOptions,
    TransferReport, TransferTask,
};
pub use hostlink_trust::{
    DenyPrompt, HostKeyVerifier, TrustDecision, TrustEntry, TrustFlags, TrustPolicy, TrustPrompt, TrustState,
    TrustStore,
};
pub use tokio_util::sync::CancellationToken;
