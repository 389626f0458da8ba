// src/ingest/types.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Sentinel used for rule value/tag when ingesting a rehydration job.
pub const REHYDRATION: &str = "rehydration";

/// One EDC data collector stream and its continuation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub name: String,
    /// Server-supplied continuation URL; empty until the first successful fetch.
    #[serde(default)]
    pub cursor: String,
}

impl Stream {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(IngestError::config("stream id must not be empty"));
        }
        Ok(Self {
            id,
            name: name.into().trim().to_string(),
            cursor: String::new(),
        })
    }

    pub fn is_first_request(&self) -> bool {
        self.cursor.is_empty()
    }

    /// Name for log lines; falls back to the id for unnamed streams.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Wire format requested from the activities endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Xml,
    Json,
}

impl ResponseFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchingRule {
    pub value: String,
    pub tag: String,
}

/// Point geometry exactly as the payload orders it: `coordinates[0]` is treated as
/// latitude and `coordinates[1]` as longitude.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn from_coordinates(coords: &[f64]) -> Option<Self> {
        match coords {
            [first, second, ..] => Some(Self {
                latitude: *first,
                longitude: *second,
            }),
            _ => None,
        }
    }
}

/// One activity record inside a poll response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entry {
    /// Remote identifier, e.g. `tag:search.twitter.com,2005:198308769506136064`.
    pub id: String,
    pub posted_time: String,
    pub body: String,
    pub rules: Vec<MatchingRule>,
    pub geo: Option<GeoPoint>,
    /// Verbatim payload of this entry as it appeared in the response.
    pub raw: String,
}

/// One decoded poll response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDocument {
    pub publisher: Option<String>,
    pub endpoint: Option<String>,
    pub cursor: Option<String>,
    pub entries: Vec<Entry>,
}

/// What a sink receives: the entry plus the response-level context it came from.
#[derive(Debug, Clone, Copy)]
pub struct ActivityRecord<'a> {
    pub stream_id: &'a str,
    pub publisher: Option<&'a str>,
    pub format: ResponseFormat,
    pub entry: &'a Entry,
}

/// Row shape of the `activities` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredActivity {
    pub native_id: i64,
    /// NULL when the payload carries no parseable time.
    pub posted_time: Option<NaiveDateTime>,
    pub content: String,
    pub body: String,
    pub rule_value: String,
    pub rule_tag: String,
    pub publisher: String,
    pub job_uuid: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl StoredActivity {
    pub fn key(&self) -> (i64, &str) {
        (self.native_id, self.publisher.as_str())
    }
}
