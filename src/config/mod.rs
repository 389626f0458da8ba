// src/config/mod.rs
pub mod edc;

pub use edc::{AccountConfig, DatabaseConfig, EdcConfig, PollConfig, StorageMode};
