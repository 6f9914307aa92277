// ── hostlink-transfer / transfer module ───────────────────────────────────────
//
//   • types        – TransferTask, TransferOptions, ItemOutcome, TransferReport
//   • progress     – ProgressThrottle and the TransferObserver capability
//   • orchestrator – single-item transfer steps
//   • directory    – depth-first tree upload / download

mod directory;
pub mod orchestrator;
pub mod progress;
pub mod types;

pub use orchestrator::TransferOrchestrator;
pub use progress::{LogObserver, NoopObserver, ProgressThrottle, ProgressUpdate, TransferObserver};
pub use types::*;
