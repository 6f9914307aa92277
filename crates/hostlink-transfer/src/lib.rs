//! # hostlink – transfer
//!
//! Moves files and directory trees between the local filesystem and a remote
//! session's `Transport`, one item at a time, with overwrite protection,
//! throttled progress reporting and cooperative cancellation.

pub mod transfer;

pub use transfer::*;
