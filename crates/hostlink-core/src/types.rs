// ── Shared types ──────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session family. Each family has its own id sequence in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    /// Shell / exec sessions; file transfer goes over SCP.
    Ssh,
    /// SFTP subsystem sessions.
    Sftp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ssh => f.write_str("SSH"),
            Protocol::Sftp => f.write_str("SFTP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_uppercase() {
        assert_eq!(Protocol::Ssh.to_string(), "SSH");
        assert_eq!(Protocol::Sftp.to_string(), "SFTP");
    }

    #[test]
    fn test_serde_uses_camel_case() {
        assert_eq!(serde_json::to_string(&Protocol::Sftp).unwrap(), "\"sftp\"");
        let back: Protocol = serde_json::from_str("\"ssh\"").unwrap();
        assert_eq!(back, Protocol::Ssh);
    }
}
