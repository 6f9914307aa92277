//! hostlink-test-utils: test infrastructure for hostlink.
//!
//! Provides:
//! - MemoryFs / MemoryTransport: an in-memory remote filesystem behind the
//!   `Transport` trait
//! - MockConnector: scripted hosts (fingerprint, reachability, auth outcome)
//!   behind the `Connector` trait

mod connector;
mod memory;

pub use connector::MockConnector;
pub use memory::{MemoryFs, MemoryTransport};
