// ── Session establishment ─────────────────────────────────────────────────────

use crate::session::registry::{SessionHandle, SessionInfo, SessionRegistry};
use crate::session::transport::Connector;
use crate::session::types::ConnectionInfo;
use chrono::Utc;
use hostlink_core::Result;
use hostlink_trust::HostKeyVerifier;
use tracing::{info, warn};

/// Connect through `connector`, verifying the host key with `verifier`, and
/// register the result. Nothing is registered when any step fails.
pub fn establish(
    connector: &dyn Connector,
    verifier: &dyn HostKeyVerifier,
    registry: &SessionRegistry,
    info: &ConnectionInfo,
) -> Result<SessionHandle> {
    let connected = match connector.connect(info, verifier) {
        Ok(c) => c,
        Err(e) => {
            warn!("{} session to {} failed: {}", info.protocol, info.address(), e);
            return Err(e);
        }
    };

    let session = SessionInfo {
        host: info.host.clone(),
        port: info.port,
        username: info.credentials.username.clone(),
        fingerprint: connected.decision.fingerprint.clone(),
        connected_at: Utc::now(),
    };
    let handle = registry.add(info.protocol, session, connected.transport);
    info!(
        "{} session {} established to {} ({:?})",
        info.protocol,
        handle.id(),
        info.address(),
        connected.decision.state
    );
    Ok(handle)
}
