//! # hostlink – session
//!
//! Establishing and tracking remote sessions:
//!   • `ConnectionInfo::builder` – the one place connection parameters are assembled
//!   • `Transport` / `Connector` – the boundary to the SSH library
//!   • `Ssh2Connector` – ssh2-backed implementation (SFTP subsystem, SCP + shell)
//!   • `SessionRegistry` – append-only, per-family list of live handles

pub mod session;

pub use session::*;
