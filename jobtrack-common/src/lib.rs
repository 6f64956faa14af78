//! # jobtrack common library
//!
//! Shared code for the job tracker services:
//! - Error type and result alias
//! - Event types (`JobTrackerEvent`) and the broadcast `EventBus`
//! - TOML / environment configuration loading
//! - SQLite pool setup and schema creation
//! - Timestamp formatting used for persisted columns

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
