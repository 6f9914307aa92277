// ── Types ─────────────────────────────────────────────────────────────────────

use hostlink_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One trusted (host, fingerprint) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEntry {
    pub host: String,
    pub fingerprint: String,
}

/// Operator-supplied flags for one connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustFlags {
    /// Skip verification entirely.
    #[serde(default)]
    pub force: bool,
    /// Trust and remember unknown hosts without asking.
    #[serde(default)]
    pub accept_key: bool,
    /// Reject unknown hosts without asking.
    #[serde(default)]
    pub error_on_untrusted: bool,
}

impl TrustFlags {
    pub fn accept_new() -> Self {
        Self {
            accept_key: true,
            ..Default::default()
        }
    }

    pub fn strict() -> Self {
        Self {
            error_on_untrusted: true,
            ..Default::default()
        }
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrustState {
    /// Key observed but not yet evaluated.
    Unknown,
    MatchedTrusted,
    Mismatched,
    PromptPending,
    AutoAccepted,
    ForcedBypass,
}

/// Final verdict for one observed host key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustDecision {
    pub host: String,
    pub fingerprint: String,
    pub state: TrustState,
    /// A new fingerprint was written to the trust store.
    pub persisted: bool,
    /// Why the key was rejected; empty when allowed.
    pub reason: String,
}

impl TrustDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(
            self.state,
            TrustState::MatchedTrusted | TrustState::AutoAccepted | TrustState::ForcedBypass
        )
    }

    /// Turn a rejection into `TrustRejected`; allowed decisions pass through.
    pub fn ensure_allowed(self) -> Result<Self> {
        if self.is_allowed() {
            Ok(self)
        } else {
            Err(Error::trust_rejected(&self.host, &self.fingerprint, &self.reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(state: TrustState) -> TrustDecision {
        TrustDecision {
            host: "h1".into(),
            fingerprint: "aa:bb".into(),
            state,
            persisted: false,
            reason: String::new(),
        }
    }

    #[test]
    fn test_only_terminal_accept_states_are_allowed() {
        assert!(decision(TrustState::MatchedTrusted).is_allowed());
        assert!(decision(TrustState::AutoAccepted).is_allowed());
        assert!(decision(TrustState::ForcedBypass).is_allowed());
        assert!(!decision(TrustState::Mismatched).is_allowed());
        assert!(!decision(TrustState::PromptPending).is_allowed());
        assert!(!decision(TrustState::Unknown).is_allowed());
    }

    #[test]
    fn test_mismatch_becomes_trust_rejected() {
        let err = decision(TrustState::Mismatched).ensure_allowed().unwrap_err();
        assert!(err.is_trust_failure());
    }

    #[test]
    fn test_flag_constructors() {
        assert!(TrustFlags::accept_new().accept_key);
        assert!(TrustFlags::strict().error_on_untrusted);
        assert!(TrustFlags::forced().force);
        assert_eq!(TrustFlags::default(), TrustFlags {
            force: false,
            accept_key: false,
            error_on_untrusted: false,
        });
    }
}
