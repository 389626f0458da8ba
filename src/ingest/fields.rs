// src/ingest/fields.rs
//! Field derivation for the `activities` table.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::ingest::types::{ActivityRecord, MatchingRule, StoredActivity, REHYDRATION};

pub const POSTED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Numeric id from the last `:`-separated segment,
/// e.g. `tag:search.twitter.com,2005:198308769506136064` → `198308769506136064`.
pub fn native_id(remote_id: &str) -> Result<i64> {
    let tail = remote_id.rsplit(':').next().unwrap_or_default().trim();
    tail.parse::<i64>().map_err(|_| {
        IngestError::field(remote_id, format!("no numeric trailing segment ('{tail}')"))
    })
}

/// Posted time normalized to UTC. Accepts RFC 3339, RFC 2822 and an already
/// normalized `YYYY-MM-DD HH:MM:SS`.
pub fn posted_time(entry_id: &str, ts: &str) -> Result<NaiveDateTime> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts).or_else(|_| DateTime::parse_from_rfc2822(ts)) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(ts, POSTED_TIME_FORMAT)
        .map_err(|_| IngestError::field(entry_id, format!("unparseable posted time '{ts}'")))
}

pub fn format_posted_time(t: &NaiveDateTime) -> String {
    t.format(POSTED_TIME_FORMAT).to_string()
}

/// `(rule_value, rule_tag)`; several rules are joined with `", "`.
pub fn rule_columns(rules: &[MatchingRule], rehydration: bool) -> (String, String) {
    if rehydration {
        return (REHYDRATION.to_string(), REHYDRATION.to_string());
    }
    let values: Vec<&str> = rules.iter().map(|r| r.value.as_str()).collect();
    let tags: Vec<&str> = rules
        .iter()
        .map(|r| r.tag.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    (values.join(", "), tags.join(", "))
}

/// Settings the database sink applies to every row.
#[derive(Debug, Clone, Default)]
pub struct RowDefaults {
    pub publisher: String,
    pub job_uuid: Option<String>,
    pub rehydration: bool,
}

impl StoredActivity {
    pub fn from_record(record: &ActivityRecord<'_>, defaults: &RowDefaults) -> Result<Self> {
        let entry = record.entry;
        let native_id = native_id(&entry.id)?;
        let posted_time = match posted_time(&entry.id, &entry.posted_time) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(target: "sink", error = %e, "storing NULL posted_time");
                None
            }
        };
        let (rule_value, rule_tag) = rule_columns(&entry.rules, defaults.rehydration);
        let geo = entry.geo.unwrap_or_default();
        let now = Utc::now().naive_utc();

        Ok(Self {
            native_id,
            posted_time,
            content: entry.raw.clone(),
            body: entry.body.clone(),
            rule_value,
            rule_tag,
            publisher: record
                .publisher
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.publisher.as_str())
                .to_string(),
            job_uuid: defaults.job_uuid.clone(),
            latitude: geo.latitude,
            longitude: geo.longitude,
            created_at: now,
            updated_at: now,
        })
    }
}
