//! # hostlink – trust
//!
//! Host-key trust handling:
//!   • `TrustStore` – per-user JSON file mapping host → set of trusted fingerprints
//!   • `TrustPolicy` – the trust-on-first-use state machine consulted during the
//!     SSH handshake, exposed as a synchronous `HostKeyVerifier`

pub mod trust;

pub use trust::*;
