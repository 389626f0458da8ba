// src/config/edc.rs
//! TOML configuration for the poller: account, polling, storage, static streams.

use base64::Engine as _;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::{IngestError, Result};
use crate::ingest::types::{ResponseFormat, Stream};

pub const DEFAULT_CONFIG_PATH: &str = "./edc_config.toml";
pub const ENV_CONFIG_PATH: &str = "EDC_CONFIG_PATH";
pub const ENV_PASSWORD: &str = "EDC_PASSWORD";
pub const ENV_DB_PASSWORD: &str = "EDC_DB_PASSWORD";

/// Upper bound the activities API accepts for `max`.
pub const API_MAX_CEILING: u32 = 10_000;

fn default_poll_interval() -> u64 {
    60
}
fn default_search_limit() -> u32 {
    20
}
fn default_publisher() -> String {
    "Twitter".to_string()
}
fn default_db_port() -> u16 {
    5432
}

// --- raw file layout ---

#[derive(Debug, Deserialize)]
struct RawConfig {
    account: RawAccount,
    edc: RawEdc,
    database: Option<RawDatabase>,
    #[serde(default)]
    streams: Vec<RawStream>,
    metrics: Option<RawMetrics>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    machine_name: Option<String>,
    host: Option<String>,
    user_name: String,
    password_encoded: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEdc {
    storage: String,
    out_box: Option<PathBuf>,
    #[serde(default = "default_poll_interval")]
    poll_interval: u64,
    #[serde(default)]
    poll_max: i64,
    #[serde(default)]
    format: ResponseFormat,
    #[serde(default = "default_search_limit")]
    stream_search_limit: u32,
    cursor_state: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    host: Option<String>,
    #[serde(default = "default_db_port")]
    port: u16,
    user_name: Option<String>,
    password: Option<String>,
    schema: Option<String>,
    #[serde(default = "default_publisher")]
    publisher: String,
    job_uuid: Option<String>,
    #[serde(default)]
    rehydration: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStreamId {
    Num(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawStream {
    #[serde(alias = "ID")]
    id: RawStreamId,
    #[serde(default, alias = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMetrics {
    listen: Option<SocketAddr>,
}

// --- validated config ---

#[derive(Clone)]
pub struct AccountConfig {
    pub host: String,
    pub user_name: String,
    /// Decoded secret used for basic auth.
    pub password: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("host", &self.host)
            .field("user_name", &self.user_name)
            .field("password_len", &self.password.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    /// Full connection string; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    /// Used when a response carries no `publisher` attribute.
    pub publisher: String,
    pub job_uuid: Option<String>,
    pub rehydration: bool,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url_set", &self.url.is_some())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("schema", &self.schema)
            .field("publisher", &self.publisher)
            .field("job_uuid", &self.job_uuid)
            .field("rehydration", &self.rehydration)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum StorageMode {
    File { out_box: PathBuf },
    Database(DatabaseConfig),
}

impl StorageMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Database(_) => "database",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Seconds between rounds, always > 0.
    pub poll_interval: u64,
    /// Records per request; <= 0 means unbounded.
    pub poll_max: i64,
    pub storage: StorageMode,
    pub format: ResponseFormat,
    pub stream_search_limit: u32,
    pub cursor_state: Option<PathBuf>,
}

impl PollConfig {
    /// Value for the `max` request parameter, capped at the API ceiling.
    pub fn max_param(&self) -> Option<u32> {
        if self.poll_max <= 0 {
            return None;
        }
        Some(u32::try_from(self.poll_max).map_or(API_MAX_CEILING, |m| m.min(API_MAX_CEILING)))
    }
}

#[derive(Debug, Clone)]
pub struct EdcConfig {
    pub account: AccountConfig,
    pub poll: PollConfig,
    /// Statically configured streams; empty means "discover".
    pub streams: Vec<Stream>,
    pub metrics_listen: Option<SocketAddr>,
}

impl EdcConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!("reading config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(s).map_err(|e| IngestError::config(format!("parsing config: {e}")))?;

        let account = account_from_raw(raw.account)?;
        let storage = storage_from_raw(&raw.edc, raw.database)?;

        if raw.edc.poll_interval == 0 {
            return Err(IngestError::config("edc.poll_interval must be > 0"));
        }

        let mut streams = Vec::with_capacity(raw.streams.len());
        for s in raw.streams {
            let id = match s.id {
                RawStreamId::Num(n) => n.to_string(),
                RawStreamId::Text(t) => t,
            };
            let stream = Stream::new(id, s.name)?;
            if streams.iter().any(|known: &Stream| known.id == stream.id) {
                return Err(IngestError::config(format!(
                    "streams: id '{}' is listed more than once",
                    stream.id
                )));
            }
            streams.push(stream);
        }

        Ok(Self {
            account,
            poll: PollConfig {
                poll_interval: raw.edc.poll_interval,
                poll_max: raw.edc.poll_max,
                storage,
                format: raw.edc.format,
                stream_search_limit: raw.edc.stream_search_limit,
                cursor_state: raw.edc.cursor_state,
            },
            streams,
            metrics_listen: raw.metrics.and_then(|m| m.listen),
        })
    }
}

fn account_from_raw(raw: RawAccount) -> Result<AccountConfig> {
    let host = match (raw.host, raw.machine_name) {
        (Some(h), _) if !h.trim().is_empty() => h,
        (_, Some(m)) if !m.trim().is_empty() => format!("{}.gnip.com", m.trim()),
        _ => return Err(IngestError::config("account.host or account.machine_name is required")),
    };
    let host = host
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string();

    let password = match (raw.password_encoded, raw.password) {
        (Some(enc), _) => decode_password(&enc)?,
        (None, Some(p)) if p.trim().eq_ignore_ascii_case("env") => env::var(ENV_PASSWORD)
            .map_err(|_| IngestError::config(format!("missing {ENV_PASSWORD} env var")))?,
        (None, Some(p)) => p,
        (None, None) => {
            return Err(IngestError::config(
                "account.password_encoded or account.password is required",
            ))
        }
    };

    Ok(AccountConfig {
        host,
        user_name: raw.user_name,
        password,
    })
}

/// Decode a base64 secret. Line breaks are tolerated (as emitted by many encoders).
pub fn decode_password(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| IngestError::config(format!("password_encoded is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| IngestError::config("password_encoded does not decode to UTF-8"))
}

fn storage_from_raw(edc: &RawEdc, db: Option<RawDatabase>) -> Result<StorageMode> {
    match edc.storage.trim().to_ascii_lowercase().as_str() {
        "file" | "files" => {
            let out_box = edc
                .out_box
                .clone()
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| IngestError::config("edc.out_box is required for file storage"))?;
            Ok(StorageMode::File { out_box })
        }
        "database" | "db" => {
            let db = db.ok_or_else(|| {
                IngestError::config("[database] section is required for database storage")
            })?;
            if db.url.is_none() && db.schema.is_none() {
                return Err(IngestError::config(
                    "database.url or database.schema is required for database storage",
                ));
            }
            let password = match db.password {
                Some(p) if p.trim().eq_ignore_ascii_case("env") => Some(env::var(ENV_DB_PASSWORD)
                    .map_err(|_| IngestError::config(format!("missing {ENV_DB_PASSWORD} env var")))?),
                other => other,
            };
            Ok(StorageMode::Database(DatabaseConfig {
                url: db.url,
                host: db.host.unwrap_or_else(|| "127.0.0.1".to_string()),
                port: db.port,
                user_name: db.user_name,
                password,
                schema: db.schema,
                publisher: db.publisher,
                job_uuid: db.job_uuid.filter(|u| !u.trim().is_empty()),
                rehydration: db.rehydration,
            }))
        }
        other => Err(IngestError::config(format!(
            "unsupported edc.storage '{other}' (expected file|database)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_CFG: &str = r#"
[account]
machine_name = "acme"
user_name = "me@example.com"
password_encoded = "c2VjcmV0"

[edc]
storage = "files"
out_box = "./out"
poll_interval = 30
poll_max = 50000

[[streams]]
ID = 1
Name = "Keywords"

[[streams]]
id = "abc"
"#;

    #[test]
    fn parses_file_mode_and_streams() {
        let cfg = EdcConfig::from_toml_str(FILE_CFG).unwrap();
        assert_eq!(cfg.account.host, "acme.gnip.com");
        assert_eq!(cfg.account.password, "secret");
        assert_eq!(cfg.poll.poll_interval, 30);
        assert_eq!(cfg.poll.max_param(), Some(API_MAX_CEILING));
        assert_eq!(cfg.poll.format, ResponseFormat::Xml);
        assert!(matches!(cfg.poll.storage, StorageMode::File { .. }));
        let ids: Vec<_> = cfg.streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "abc"]);
        assert!(cfg.streams.iter().all(|s| s.cursor.is_empty()));
    }

    #[test]
    fn max_param_is_none_when_unbounded() {
        let mut cfg = EdcConfig::from_toml_str(FILE_CFG).unwrap();
        cfg.poll.poll_max = 0;
        assert_eq!(cfg.poll.max_param(), None);
        cfg.poll.poll_max = -5;
        assert_eq!(cfg.poll.max_param(), None);
        cfg.poll.poll_max = 250;
        assert_eq!(cfg.poll.max_param(), Some(250));
    }

    #[test]
    fn rejects_missing_required_settings() {
        let no_outbox = FILE_CFG.replace("out_box = \"./out\"\n", "");
        assert!(matches!(
            EdcConfig::from_toml_str(&no_outbox),
            Err(IngestError::Configuration(_))
        ));

        let zero_interval = FILE_CFG.replace("poll_interval = 30", "poll_interval = 0");
        assert!(EdcConfig::from_toml_str(&zero_interval).is_err());

        let db_without_section = FILE_CFG.replace("storage = \"files\"", "storage = \"database\"");
        assert!(EdcConfig::from_toml_str(&db_without_section).is_err());

        let bad_mode = FILE_CFG.replace("storage = \"files\"", "storage = \"s3\"");
        assert!(EdcConfig::from_toml_str(&bad_mode).is_err());

        let same_id_twice = format!("{FILE_CFG}\n[[streams]]\nid = \"1\"\nname = \"again\"\n");
        assert!(matches!(
            EdcConfig::from_toml_str(&same_id_twice),
            Err(IngestError::Configuration(_))
        ));
    }

    #[test]
    fn database_mode_defaults() {
        let s = r#"
[account]
host = "https://acme.example.com/"
user_name = "u"
password = "plain"

[edc]
storage = "database"
format = "json"

[database]
url = "postgres://u:p@localhost/edc"
"#;
        let cfg = EdcConfig::from_toml_str(s).unwrap();
        assert_eq!(cfg.account.host, "acme.example.com");
        assert_eq!(cfg.account.password, "plain");
        assert_eq!(cfg.poll.format, ResponseFormat::Json);
        assert!(cfg.streams.is_empty());
        match cfg.poll.storage {
            StorageMode::Database(db) => {
                assert_eq!(db.publisher, "Twitter");
                assert!(!db.rehydration);
                assert!(db.job_uuid.is_none());
            }
            other => panic!("unexpected storage {other:?}"),
        }
    }
}
