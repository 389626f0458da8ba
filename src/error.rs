// src/error.rs
//! Error taxonomy for the poller.
//!
//! Only `Configuration` is fatal (startup). Everything else is raised inside the
//! steady-state loop, logged against a stream and/or entry, and skipped.

use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Missing or invalid required settings. Aborts startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or HTTP failure for one stream in one round.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed response body.
    #[error("decode error: {0}")]
    Decode(String),

    /// A record's required field could not be derived.
    #[error("field extraction error for entry '{entry}': {reason}")]
    FieldExtraction { entry: String, reason: String },

    /// Storage failure for one record.
    #[error("sink write error for entry '{entry}': {reason}")]
    SinkWrite { entry: String, reason: String },
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport(e: impl Display) -> Self {
        Self::Transport(e.to_string())
    }

    pub fn decode(e: impl Display) -> Self {
        Self::Decode(e.to_string())
    }

    pub fn field(entry: &str, reason: impl Display) -> Self {
        Self::FieldExtraction {
            entry: entry.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_write(entry: &str, reason: impl Display) -> Self {
        Self::SinkWrite {
            entry: entry.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::FieldExtraction { .. } => "field_extraction",
            Self::SinkWrite { .. } => "sink_write",
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
