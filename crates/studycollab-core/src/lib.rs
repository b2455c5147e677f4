//! studycollab-core - Core library for StudyCollab
//!
//! This crate contains the offline cache, the durable sync queue and its
//! reconciliation engine, the collaborative canvas protocol and the
//! configuration shared by all StudyCollab front ends.

pub mod auth;
pub mod cache;
pub mod canvas;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod host;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use auth::Identity;
pub use config::CoreConfig;
pub use error::{Error, Result};
pub use services::{OfflineStore, PullReport};
