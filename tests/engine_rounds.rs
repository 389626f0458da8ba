// tests/engine_rounds.rs
use std::sync::Arc;
use std::time::Duration;

use edc_poller::config::{PollConfig, StorageMode};
use edc_poller::ingest::fields::RowDefaults;
use edc_poller::ingest::registry::StreamRegistry;
use edc_poller::ingest::scheduler::first_request_url;
use edc_poller::ingest::sink::{DatabaseSink, MemoryStore};
use edc_poller::ingest::types::{ResponseFormat, Stream};
use edc_poller::transport::MockTransport;
use edc_poller::Engine;
use tokio_util::sync::CancellationToken;

const HOST: &str = "acme.gnip.com";

fn poll_config() -> PollConfig {
    PollConfig {
        poll_interval: 3600,
        poll_max: 100,
        storage: StorageMode::File {
            out_box: "unused".into(),
        },
        format: ResponseFormat::Xml,
        stream_search_limit: 0,
        cursor_state: None,
    }
}

fn doc(stream: &str, cursor: Option<&str>, native_ids: &[u64]) -> String {
    let refresh = cursor
        .map(|c| format!(r#" refreshURL="{}""#, c.replace('&', "&amp;")))
        .unwrap_or_default();
    let entries: String = native_ids
        .iter()
        .map(|n| {
            format!(
                "<entry><id>tag:search.twitter.com,2005:{n}</id><created>2012-05-04T10:11:12Z</created>\
                 <object><content>from stream {stream}</content></object></entry>"
            )
        })
        .collect();
    format!(r#"<results publisher="twitter"{refresh}>{entries}</results>"#)
}

fn registry(ids: &[&str]) -> StreamRegistry {
    let mut r = StreamRegistry::new(false);
    r.load(ids.iter().map(|id| Stream::new(*id, format!("Stream {id}")).unwrap()).collect())
        .unwrap();
    r
}

fn engine(transport: Arc<MockTransport>, store: Arc<MemoryStore>, ids: &[&str]) -> Engine {
    let sink = Arc::new(DatabaseSink::new(store, RowDefaults::default()));
    Engine::new(HOST, poll_config(), registry(ids), transport, sink)
}

#[tokio::test]
async fn failing_stream_does_not_affect_siblings() {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());

    let a_next = "https://acme.gnip.com/data_collectors/1/activities.xml?since_date=20130321000000";
    let c_next = "https://acme.gnip.com/data_collectors/3/activities.xml?since_date=20130321000100";
    transport.respond(&first_request_url(HOST, "1", ResponseFormat::Xml), 200, doc("A", Some(a_next), &[101, 102]));
    transport.fail(&first_request_url(HOST, "2", ResponseFormat::Xml), "connection reset");
    transport.respond(&first_request_url(HOST, "3", ResponseFormat::Xml), 200, doc("C", Some(c_next), &[301]));

    let mut engine = engine(transport.clone(), store.clone(), &["1", "2", "3"]);
    let round = engine.run_round(&CancellationToken::new()).await;

    assert_eq!(round.streams, 3);
    assert_eq!(round.failed, 1);
    assert_eq!(round.stored, 3);

    let reg = engine.registry();
    assert_eq!(reg.get("1").unwrap().cursor, a_next);
    assert!(reg.get("2").unwrap().cursor.is_empty());
    assert_eq!(reg.get("3").unwrap().cursor, c_next);

    let bodies: Vec<String> = store.rows().into_iter().map(|r| r.body).collect();
    assert_eq!(bodies.len(), 3);
    assert!(bodies.iter().all(|b| b != "from stream B"));
}

#[tokio::test]
async fn non_2xx_and_bad_bodies_skip_the_stream() {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    transport.respond(&first_request_url(HOST, "1", ResponseFormat::Xml), 503, "busy");
    transport.respond(&first_request_url(HOST, "2", ResponseFormat::Xml), 200, "<results><entry>");

    let mut engine = engine(transport, store.clone(), &["1", "2"]);
    let round = engine.run_round(&CancellationToken::new()).await;

    assert_eq!(round.failed, 2);
    assert!(store.is_empty());
    assert!(engine.registry().all().iter().all(|s| s.cursor.is_empty()));
}

#[tokio::test]
async fn second_round_uses_cursor_and_keeps_it_when_absent() {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    let first = first_request_url(HOST, "1", ResponseFormat::Xml);
    let next = "https://acme.gnip.com/data_collectors/1/activities.xml?since_date=20130321000000";

    transport.respond(&first, 200, doc("A", Some(next), &[1]));
    // The continuation answers without a refreshURL.
    transport.respond(next, 200, doc("A", None, &[2]));

    let mut engine = engine(transport.clone(), store.clone(), &["1"]);
    let cancel = CancellationToken::new();
    engine.run_round(&cancel).await;
    engine.run_round(&cancel).await;
    engine.run_round(&cancel).await;

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].0, first);
    assert_eq!(calls[0].1.get("max").map(String::as_str), Some("100"));
    assert!(calls[0].1.get("since_date").is_none());

    for (url, params) in &calls[1..] {
        assert_eq!(url, next);
        assert_eq!(params.get("since_date").map(String::as_str), Some("20130321000000"));
    }
    assert_eq!(engine.registry().get("1").unwrap().cursor, next);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn cancelled_round_polls_nothing() {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(transport.clone(), store, &["1", "2"]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let round = engine.run_round(&cancel).await;
    assert_eq!(round.streams, 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn run_stops_during_sleep() {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    transport.respond(&first_request_url(HOST, "1", ResponseFormat::Xml), 200, doc("A", None, &[1]));

    let engine = engine(transport.clone(), store.clone(), &["1"]);
    let cancel = CancellationToken::new();
    let handle = edc_poller::ingest::scheduler::spawn(engine, cancel.clone());

    // First round completes, then the engine sleeps for an hour.
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let engine = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine should stop promptly")
        .expect("engine task");

    assert_eq!(transport.calls().len(), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(engine.registry().len(), 1);
}

#[tokio::test]
async fn bad_json_activity_only_skips_that_record() {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(MemoryStore::new());
    let first = first_request_url(HOST, "1", ResponseFormat::Json);
    let next = "https://acme.gnip.com/data_collectors/1/activities.json?since_date=2";
    let page = format!(
        r#"{{"publisher":"twitter","refreshURL":"{next}","results":[
            {{"id":"tag:search.twitter.com,2005:1","postedTime":"2012-05-04T10:11:12.000Z","body":"ok"}},
            {{"id":"tag:search.twitter.com,2005:2","postedTime":null,"gnip":{{"matching_rules":null}}}},
            {{"id":"tag:search.twitter.com,2005:nope"}}]}}"#
    );
    transport.respond(&first, 200, page);

    let sink = Arc::new(DatabaseSink::new(store.clone(), RowDefaults::default()));
    let poll = PollConfig {
        format: ResponseFormat::Json,
        ..poll_config()
    };
    let mut engine = Engine::new(HOST, poll, registry(&["1"]), transport, sink);
    let round = engine.run_round(&CancellationToken::new()).await;

    assert_eq!(round.failed, 0);
    assert_eq!(round.entries, 3);
    assert_eq!(round.stored, 2);
    assert_eq!(round.skipped, 1);
    assert_eq!(engine.registry().get("1").unwrap().cursor, next);
    assert!(store.get(1, "twitter").is_some());
    assert!(store.get(2, "twitter").unwrap().posted_time.is_none());
}
