// src/ingest/providers/json.rs
//! Decoder for responses requested in the publisher's original JSON format.
//!
//! Accepts either `{"publisher":..,"refreshURL":..,"results":[activity, ..]}` or a
//! bare array of activities.

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{IngestError, Result};
use crate::ingest::types::{Entry, GeoPoint, MatchingRule, RawDocument};

#[derive(Debug, Deserialize)]
struct JsonDoc<'a> {
    publisher: Option<String>,
    endpoint: Option<String>,
    #[serde(rename = "refreshURL", alias = "refresh_url")]
    refresh_url: Option<String>,
    #[serde(borrow, default)]
    results: Vec<&'a RawValue>,
}

/// Activity fields are read as loose JSON values: a null or mistyped field only
/// leaves that field empty, so the record is judged later by the sink.
#[derive(Debug, Default, Deserialize)]
struct JsonActivity {
    #[serde(default)]
    id: Value,
    #[serde(rename = "postedTime", alias = "created", default)]
    posted_time: Value,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    gnip: Value,
    #[serde(default)]
    geo: Value,
}

/// Strings as-is, numbers rendered, anything else empty.
fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn rules(gnip: &Value) -> Vec<MatchingRule> {
    let Some(list) = gnip.get("matching_rules").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter(|r| r.is_object())
        .map(|r| MatchingRule {
            value: r.get("value").map(text).unwrap_or_default(),
            tag: r.get("tag").map(text).unwrap_or_default(),
        })
        .collect()
}

fn point_from_geo(geo: &Value) -> Option<GeoPoint> {
    if geo.get("type").and_then(Value::as_str) != Some("Point") {
        return None;
    }
    let coords: Vec<f64> = geo
        .get("coordinates")?
        .as_array()?
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    GeoPoint::from_coordinates(&coords)
}

/// Decode a single activity object; `raw` is kept verbatim on the entry.
/// Only a payload that is not a JSON object is an error.
pub fn decode_activity(raw: &str) -> Result<Entry> {
    let a: JsonActivity = serde_json::from_str(raw).map_err(IngestError::decode)?;
    Ok(Entry {
        id: text(&a.id).trim().to_string(),
        posted_time: text(&a.posted_time).trim().to_string(),
        body: text(&a.body),
        rules: rules(&a.gnip),
        geo: point_from_geo(&a.geo),
        raw: raw.to_string(),
    })
}

pub fn decode(body: &str) -> Result<RawDocument> {
    let trimmed = body.trim_start();
    let (mut doc, items) = if trimmed.starts_with('[') {
        let items: Vec<&RawValue> = serde_json::from_str(trimmed).map_err(IngestError::decode)?;
        (RawDocument::default(), items)
    } else {
        let d: JsonDoc<'_> = serde_json::from_str(trimmed).map_err(IngestError::decode)?;
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        (
            RawDocument {
                publisher: non_empty(d.publisher),
                endpoint: non_empty(d.endpoint),
                cursor: non_empty(d.refresh_url),
                entries: Vec::new(),
            },
            d.results,
        )
    };

    doc.entries.reserve(items.len());
    for item in items {
        let entry = decode_activity(item.get()).unwrap_or_else(|e| {
            tracing::debug!(target: "ingest", error = %e, "activity is not an object");
            Entry {
                raw: item.get().to_string(),
                ..Default::default()
            }
        });
        doc.entries.push(entry);
    }
    Ok(doc)
}
