//! # hostlink – core
//!
//! Shared building blocks for every hostlink crate:
//!   • `Error` / `Result` – the single error taxonomy (trust, file, persistence, …)
//!   • `HostlinkSettings` – JSON settings with per-field defaults
//!   • `init_logging` – tracing-subscriber setup (text or JSON)
//!   • Host-key fingerprint formatting
//!   • `Protocol` – the SSH / SFTP session families

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod types;

pub use config::{HostlinkSettings, LogFormat, LoggingSettings, ProgressSettings};
pub use error::{Error, Result};
pub use types::Protocol;
