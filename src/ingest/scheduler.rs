// src/ingest/scheduler.rs
//! Polling engine: FETCH_ALL → SLEEP → FETCH_ALL … until cancelled.
//!
//! Each stream is polled to completion before the next one starts. A stream whose
//! fetch or decode fails is skipped for the round with its cursor untouched; the
//! other streams are unaffected.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{EdcConfig, PollConfig};
use crate::error::{IngestError, Result};
use crate::ingest::registry::{CursorFile, StreamRegistry};
use crate::ingest::sink::Sink;
use crate::ingest::types::{ResponseFormat, Stream};
use crate::ingest::{discovery, ensure_metrics_described, extract, providers, ExtractSummary};
use crate::transport::{query_param, Params, Transport};

/// First-request URL for a stream without a cursor.
pub fn first_request_url(host: &str, stream_id: &str, format: ResponseFormat) -> String {
    format!(
        "https://{host}/data_collectors/{stream_id}/activities.{}",
        format.extension()
    )
}

/// Where to send the next request: the stored cursor verbatim, else the first-request URL.
pub fn request_target(host: &str, stream: &Stream, format: ResponseFormat) -> String {
    if stream.is_first_request() {
        first_request_url(host, &stream.id, format)
    } else {
        stream.cursor.clone()
    }
}

/// `since_date` lifted out of the target (the API wants it as an explicit
/// parameter even inside a continuation URL) plus the capped `max`.
pub fn request_params(target: &str, max: Option<u32>) -> Params {
    let mut params = Params::new();
    if let Some(since) = query_param(target, "since_date") {
        params.insert("since_date".to_string(), since);
    }
    if let Some(m) = max {
        params.insert("max".to_string(), m.to_string());
    }
    params
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub streams: usize,
    pub failed: usize,
    pub entries: usize,
    pub stored: usize,
    pub skipped: usize,
}

/// Engine context: configuration, registry, transport and sink in one place.
pub struct Engine {
    host: String,
    poll: PollConfig,
    registry: StreamRegistry,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn Sink>,
}

impl Engine {
    pub fn new(
        host: impl Into<String>,
        poll: PollConfig,
        registry: StreamRegistry,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            host: host.into(),
            poll,
            registry,
            transport,
            sink,
        }
    }

    /// Load configured streams, or discover them when none are configured and a
    /// search limit is set. Discovery honours `cancel`.
    pub async fn from_config(
        cfg: &EdcConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn Sink>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let discovery_fallback = cfg.streams.is_empty() && cfg.poll.stream_search_limit > 0;
        let mut registry = StreamRegistry::new(discovery_fallback);
        if let Some(path) = &cfg.poll.cursor_state {
            registry = registry.with_cursor_file(CursorFile::new(path));
        }

        let streams = if discovery_fallback {
            discovery::discover_streams(
                transport.as_ref(),
                &cfg.account.host,
                cfg.poll.stream_search_limit,
                cancel,
            )
            .await
        } else {
            cfg.streams.clone()
        };
        registry.load(streams)?;

        Ok(Self::new(
            cfg.account.host.clone(),
            cfg.poll.clone(),
            registry,
            transport,
            sink,
        ))
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.poll_interval)
    }

    /// Fetch, decode, advance the cursor and sink one stream's new activities.
    pub async fn poll_stream(&mut self, stream: &Stream) -> Result<ExtractSummary> {
        let format = self.poll.format;
        let target = request_target(&self.host, stream, format);
        let params = request_params(&target, self.poll.max_param());
        tracing::debug!(
            target: "ingest",
            stream = %stream.id,
            url = %target,
            first_request = stream.is_first_request(),
            "requesting activities"
        );

        let t0 = Instant::now();
        let rsp = self.transport.get(&target, &params).await?;
        histogram!("edc_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        if !rsp.is_success() {
            return Err(IngestError::transport(format!("HTTP {} from {target}", rsp.status)));
        }

        let doc = providers::decode(format, &rsp.body)?;
        if let Some(cursor) = doc.cursor.as_deref() {
            self.registry.update_cursor(&stream.id, cursor).await;
        }

        tracing::info!(target: "ingest", stream = %stream.id, name = stream.label(), "processing data");
        Ok(extract(&stream.id, &doc, format, self.sink.as_ref()).await)
    }

    /// One FETCH_ALL pass. Cancellation is checked before each stream.
    pub async fn run_round(&mut self, cancel: &CancellationToken) -> RoundSummary {
        ensure_metrics_described();
        let mut summary = RoundSummary::default();
        let streams: Vec<Stream> = self.registry.all().to_vec();

        for stream in &streams {
            if cancel.is_cancelled() {
                break;
            }
            summary.streams += 1;
            match self.poll_stream(stream).await {
                Ok(s) => {
                    summary.entries += s.entries;
                    summary.stored += s.stored;
                    summary.skipped += s.skipped;
                }
                Err(e) => {
                    summary.failed += 1;
                    counter!("edc_stream_errors_total", "kind" => e.kind()).increment(1);
                    tracing::warn!(
                        target: "ingest",
                        stream = %stream.id,
                        name = stream.label(),
                        error = %e,
                        "stream skipped this round"
                    );
                }
            }
        }

        counter!("edc_rounds_total").increment(1);
        gauge!("edc_last_round_ts").set(chrono::Utc::now().timestamp() as f64);
        summary
    }

    /// Poll until `cancel` fires; the sleep between rounds is interruptible.
    pub async fn run(&mut self, cancel: CancellationToken) {
        if self.registry.is_empty() {
            tracing::warn!(target: "ingest", "no streams registered; rounds will be empty");
        }
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let round = self.run_round(&cancel).await;
            tracing::info!(
                target: "ingest",
                streams = round.streams,
                failed = round.failed,
                entries = round.entries,
                stored = round.stored,
                skipped = round.skipped,
                "round finished"
            );

            let interval = self.poll_interval();
            tracing::info!(target: "ingest", secs = interval.as_secs(), "sleeping");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!(target: "ingest", "polling stopped");
    }
}

/// Run the engine on its own task until `cancel` fires.
pub fn spawn(mut engine: Engine, cancel: CancellationToken) -> JoinHandle<Engine> {
    tokio::spawn(async move {
        engine.run(cancel).await;
        engine
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_is_canonical() {
        let s = Stream::new("12", "x").unwrap();
        assert_eq!(
            request_target("acme.gnip.com", &s, ResponseFormat::Xml),
            "https://acme.gnip.com/data_collectors/12/activities.xml"
        );
        assert_eq!(
            first_request_url("acme.gnip.com", "12", ResponseFormat::Json),
            "https://acme.gnip.com/data_collectors/12/activities.json"
        );
    }

    #[test]
    fn continuation_is_verbatim_with_since_date() {
        let mut s = Stream::new("12", "x").unwrap();
        s.cursor =
            "https://acme.gnip.com/data_collectors/12/activities.xml?since_date=20130321000000"
                .to_string();
        let target = request_target("other.host", &s, ResponseFormat::Xml);
        assert_eq!(target, s.cursor);

        let params = request_params(&target, Some(500));
        assert_eq!(params.get("since_date").map(String::as_str), Some("20130321000000"));
        assert_eq!(params.get("max").map(String::as_str), Some("500"));

        let params = request_params("https://h/a.xml", None);
        assert!(params.is_empty());
    }
}
