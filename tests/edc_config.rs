// tests/edc_config.rs
use std::io::Write;

use edc_poller::config::edc::{ENV_PASSWORD, DEFAULT_CONFIG_PATH};
use edc_poller::config::{EdcConfig, StorageMode};
use edc_poller::ingest::types::ResponseFormat;
use edc_poller::IngestError;
use serial_test::serial;

const CFG: &str = r#"
[account]
machine_name = "acme"
user_name = "collector@example.com"
password = "ENV"

[edc]
storage = "database"
poll_interval = 120
poll_max = 500
format = "json"
cursor_state = "state/cursors.json"

[database]
host = "db.internal"
user_name = "edc"
password = "pw"
schema = "edc"
publisher = "Facebook"
job_uuid = "3f2a"

[[streams]]
ID = 4
Name = "Search"

[metrics]
listen = "127.0.0.1:9109"
"#;

fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[test]
#[serial]
fn loads_full_file_with_env_password() {
    std::env::set_var(ENV_PASSWORD, "from-env");
    let file = write_tmp(CFG);

    let cfg = EdcConfig::load_from_file(file.path()).unwrap();
    std::env::remove_var(ENV_PASSWORD);

    assert_eq!(cfg.account.host, "acme.gnip.com");
    assert_eq!(cfg.account.password, "from-env");
    assert_eq!(cfg.poll.poll_interval, 120);
    assert_eq!(cfg.poll.max_param(), Some(500));
    assert_eq!(cfg.poll.format, ResponseFormat::Json);
    assert_eq!(
        cfg.poll.cursor_state.as_deref(),
        Some(std::path::Path::new("state/cursors.json"))
    );
    assert_eq!(cfg.streams.len(), 1);
    assert_eq!(cfg.streams[0].id, "4");
    assert_eq!(cfg.streams[0].name, "Search");
    assert_eq!(cfg.metrics_listen.map(|a| a.port()), Some(9109));

    match &cfg.poll.storage {
        StorageMode::Database(db) => {
            assert_eq!(db.host, "db.internal");
            assert_eq!(db.port, 5432);
            assert_eq!(db.schema.as_deref(), Some("edc"));
            assert_eq!(db.publisher, "Facebook");
            assert_eq!(db.job_uuid.as_deref(), Some("3f2a"));
        }
        other => panic!("expected database storage, got {other:?}"),
    }
}

#[test]
#[serial]
fn env_password_must_be_set() {
    std::env::remove_var(ENV_PASSWORD);
    let err = EdcConfig::from_toml_str(CFG).unwrap_err();
    assert!(matches!(err, IngestError::Configuration(_)));
    assert!(err.to_string().contains(ENV_PASSWORD));
}

#[test]
fn secrets_are_not_printed() {
    let cfg = EdcConfig::from_toml_str(&CFG.replace("\"ENV\"", "\"hunter2\"")).unwrap();
    let dbg = format!("{cfg:?}");
    assert!(!dbg.contains("hunter2"));
    assert!(!dbg.contains("\"pw\""));
}

#[test]
fn missing_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EdcConfig::load_from_file(dir.path().join(DEFAULT_CONFIG_PATH)).unwrap_err();
    assert!(matches!(err, IngestError::Configuration(_)));
}
