// src/ingest/discovery.rs
//! One-shot probe for active data collector streams.
//!
//! Used only when no streams are configured. Candidate ids `1..=limit` are probed
//! through their `api_help` page; anything that does not say "not found" is
//! registered under the page title.

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingest::types::Stream;
use crate::transport::{Params, Transport};

pub fn api_help_url(host: &str, id: u32) -> String {
    format!("https://{host}/data_collectors/{id}/api_help")
}

/// Page `<title>` with entities decoded and runs of non-word characters
/// collapsed to a single space.
pub fn stream_name_from_page(html: &str) -> Option<String> {
    static RE_TITLE: OnceCell<Regex> = OnceCell::new();
    static RE_NON_WORD: OnceCell<Regex> = OnceCell::new();
    let re_title = RE_TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
    let re_non_word = RE_NON_WORD.get_or_init(|| Regex::new(r"\W+").unwrap());

    let raw = re_title.captures(html)?.get(1)?.as_str();
    let decoded = html_escape::decode_html_entities(raw);
    let name = re_non_word.replace_all(&decoded, " ").trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn is_absent(body: &str) -> bool {
    body.to_lowercase().contains("not found")
}

/// Probe exactly `limit` candidates in order and return the streams found.
/// Stops early, keeping what was found so far, once `cancel` fires.
pub async fn discover_streams(
    transport: &dyn Transport,
    host: &str,
    limit: u32,
    cancel: &CancellationToken,
) -> Vec<Stream> {
    info!(target: "discovery", host, limit, "probing for active streams");
    let mut found = Vec::new();

    for id in 1..=limit {
        let url = api_help_url(host, id);
        let params = Params::new();
        let probe = tokio::select! {
            _ = cancel.cancelled() => {
                info!(target: "discovery", stream = id, "discovery cancelled");
                break;
            }
            r = transport.get(&url, &params) => r,
        };
        let rsp = match probe {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "discovery", stream = id, error = %e, "probe failed, treating as absent");
                continue;
            }
        };
        if is_absent(&rsp.body) {
            debug!(target: "discovery", stream = id, status = rsp.status, "not found");
            continue;
        }
        let name = stream_name_from_page(&rsp.body).unwrap_or_default();
        match Stream::new(id.to_string(), name) {
            Ok(stream) => {
                info!(target: "discovery", stream = %stream.id, name = %stream.name, "found stream");
                counter!("edc_discovered_streams_total").increment(1);
                found.push(stream);
            }
            Err(e) => warn!(target: "discovery", stream = id, error = %e, "skipping candidate"),
        }
    }

    info!(target: "discovery", found = found.len(), "discovery finished");
    found
}
