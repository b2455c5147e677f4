pub mod cache;
pub mod common;
pub mod config;
pub mod conflicts;
pub mod errors;
pub mod pull;
pub mod queue;
pub mod status;
pub mod sync;
