//! Async service handles shared by the CLI and other front ends.

mod offline;

pub use offline::{OfflineStore, PullReport};
