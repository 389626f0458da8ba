// src/ingest/mod.rs
pub mod discovery;
pub mod fields;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod types;

use crate::ingest::sink::Sink;
use crate::ingest::types::{ActivityRecord, RawDocument, ResponseFormat};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// Progress marker cadence while walking a document.
pub const PROGRESS_EVERY: usize = 50;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("edc_rounds_total", "Completed polling rounds.");
        describe_counter!("edc_entries_total", "Entries decoded from poll responses.");
        describe_counter!("edc_entries_stored_total", "Entries written to the sink.");
        describe_counter!(
            "edc_stream_errors_total",
            "Stream fetches skipped due to transport or decode errors."
        );
        describe_counter!(
            "edc_sink_errors_total",
            "Entries skipped due to field extraction or sink write errors."
        );
        describe_counter!(
            "edc_discovered_streams_total",
            "Streams registered by discovery."
        );
        describe_histogram!("edc_fetch_ms", "Activities request time in milliseconds.");
        describe_gauge!("edc_last_round_ts", "Unix ts when the last polling round finished.");
    });
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub entries: usize,
    pub stored: usize,
    pub skipped: usize,
}

/// Walk the document's entries in order and hand each one to the sink.
/// A failing entry is logged and skipped; its siblings are still written.
pub async fn extract(
    stream_id: &str,
    doc: &RawDocument,
    format: ResponseFormat,
    sink: &dyn Sink,
) -> ExtractSummary {
    ensure_metrics_described();
    let mut summary = ExtractSummary::default();

    for entry in &doc.entries {
        summary.entries += 1;
        if summary.entries % PROGRESS_EVERY == 0 {
            tracing::debug!(target: "ingest", stream = stream_id, processed = summary.entries, "progress");
        }

        let record = ActivityRecord {
            stream_id,
            publisher: doc.publisher.as_deref(),
            format,
            entry,
        };
        match sink.write(&record).await {
            Ok(()) => summary.stored += 1,
            Err(e) => {
                summary.skipped += 1;
                counter!("edc_sink_errors_total", "kind" => e.kind()).increment(1);
                tracing::warn!(
                    target: "ingest",
                    stream = stream_id,
                    entry = %entry.id,
                    sink = sink.name(),
                    error = %e,
                    "entry skipped"
                );
            }
        }
    }

    counter!("edc_entries_total").increment(summary.entries as u64);
    counter!("edc_entries_stored_total").increment(summary.stored as u64);
    tracing::info!(
        target: "ingest",
        stream = stream_id,
        entries = summary.entries,
        stored = summary.stored,
        skipped = summary.skipped,
        "retrieved activities"
    );
    summary
}
