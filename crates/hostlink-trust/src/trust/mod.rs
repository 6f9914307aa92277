// ── hostlink-trust / trust module ─────────────────────────────────────────────
//
//   • types   – TrustEntry, TrustFlags, TrustState, TrustDecision
//   • store   – load / get / set with atomic persistence
//   • policy  – TOFU decision logic, prompt and verifier capabilities

pub mod policy;
pub mod store;
pub mod types;

pub use policy::{DenyPrompt, HostKeyVerifier, TrustPolicy, TrustPrompt};
pub use store::TrustStore;
pub use types::*;
