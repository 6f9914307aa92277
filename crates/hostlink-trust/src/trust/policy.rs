// ── TrustPolicy – trust-on-first-use decision logic ───────────────────────────
//
// Rules, first match wins:
//   1. force                         → ForcedBypass (allowed, nothing stored)
//   2. known host, key in set        → MatchedTrusted
//   3. known host, key not in set    → Mismatched (always rejected)
//   4. unknown host
//        error_on_untrusted          → Mismatched
//        accept_key                  → AutoAccepted (stored)
//        otherwise                   → PromptPending → prompt decides

use crate::trust::store::TrustStore;
use crate::trust::types::{TrustDecision, TrustFlags, TrustState};
use hostlink_core::fingerprint::normalize;
use hostlink_core::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Interactive "do you trust this key?" capability owned by the caller.
pub trait TrustPrompt: Send + Sync {
    fn confirm(&self, host: &str, fingerprint: &str) -> bool;
}

impl<F> TrustPrompt for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn confirm(&self, host: &str, fingerprint: &str) -> bool {
        self(host, fingerprint)
    }
}

/// Non-interactive prompt: declines every unknown key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyPrompt;

impl TrustPrompt for DenyPrompt {
    fn confirm(&self, _host: &str, _fingerprint: &str) -> bool {
        false
    }
}

/// Synchronous host-key check performed during the handshake, before
/// authentication.
pub trait HostKeyVerifier: Send + Sync {
    fn verify(&self, host: &str, fingerprint: &str) -> Result<TrustDecision>;
}

/// First-pass classification without side effects. Unknown hosts that need
/// the operator come back as `PromptPending`.
pub fn classify(known: Option<&BTreeSet<String>>, fingerprint: &str, flags: TrustFlags) -> TrustState {
    if flags.force {
        return TrustState::ForcedBypass;
    }
    match known {
        Some(set) if !set.is_empty() => {
            if set.contains(&normalize(fingerprint)) {
                TrustState::MatchedTrusted
            } else {
                TrustState::Mismatched
            }
        }
        _ if flags.error_on_untrusted => TrustState::Mismatched,
        _ if flags.accept_key => TrustState::AutoAccepted,
        _ => TrustState::PromptPending,
    }
}

#[derive(Clone)]
pub struct TrustPolicy {
    store: Arc<TrustStore>,
    flags: TrustFlags,
    prompt: Arc<dyn TrustPrompt>,
}

impl TrustPolicy {
    pub fn new(store: Arc<TrustStore>, flags: TrustFlags, prompt: Arc<dyn TrustPrompt>) -> Self {
        Self { store, flags, prompt }
    }

    pub fn flags(&self) -> TrustFlags {
        self.flags
    }

    /// Decide whether `fingerprint` is acceptable for `host`, persisting it
    /// when the decision is to accept a previously unknown host.
    pub fn evaluate(&self, host: &str, fingerprint: &str) -> Result<TrustDecision> {
        let fingerprint = normalize(fingerprint);
        let known = self.store.get(host);

        let mut state = classify(known.as_ref(), &fingerprint, self.flags);
        let mut reason = String::new();

        if state == TrustState::PromptPending {
            state = if self.prompt.confirm(host, &fingerprint) {
                TrustState::AutoAccepted
            } else {
                reason = "operator declined the host key".into();
                TrustState::Mismatched
            };
        }

        let mut persisted = false;
        match state {
            TrustState::ForcedBypass => {
                warn!(
                    "Host key verification skipped for {} ({}); connection is untrusted",
                    host, fingerprint
                );
            }
            TrustState::AutoAccepted => {
                persisted = self.store.set(host, &fingerprint)?;
                info!("Accepted new host key for {} ({})", host, fingerprint);
            }
            TrustState::Mismatched => {
                if reason.is_empty() {
                    reason = if known.is_some() {
                        "fingerprint does not match any trusted key for this host".into()
                    } else {
                        "host is not trusted".into()
                    };
                }
                warn!("Rejected host key for {} ({}): {}", host, fingerprint, reason);
            }
            _ => {}
        }

        Ok(TrustDecision {
            host: host.to_string(),
            fingerprint,
            state,
            persisted,
            reason,
        })
    }
}

impl HostKeyVerifier for TrustPolicy {
    fn verify(&self, host: &str, fingerprint: &str) -> Result<TrustDecision> {
        self.evaluate(host, fingerprint)
    }
}
