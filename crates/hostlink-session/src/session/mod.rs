// ── hostlink-session / session module ─────────────────────────────────────────
//
//   • types          – ConnectionInfo (+ builder), Credentials, remote metadata
//   • connect        – connect, verify and register in one step
//   • transport      – Transport / Connector traits, streaming copy helper
//   • ssh2_transport – ssh2 connector and transport
//   • registry       – SessionHandle and SessionRegistry

pub mod connect;
pub mod registry;
pub mod ssh2_transport;
pub mod transport;
pub mod types;

pub use connect::establish;
pub use registry::{SessionHandle, SessionInfo, SessionRegistry, SessionSummary};
pub use ssh2_transport::{Ssh2Connector, Ssh2Transport};
pub use transport::{remote_file_name, remote_join, Connected, Connector, ProgressFn, Transport};
pub use types::*;
