// src/ingest/registry.rs
//! Tracked streams and their continuation cursors.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::ingest::types::Stream;

/// Cursors keyed by stream id, persisted as a JSON object.
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty map; an unreadable one is logged and ignored.
    pub fn load(&self) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cursor state unreadable, starting fresh");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "cursor state malformed, starting fresh");
            BTreeMap::new()
        })
    }

    /// Write via a sibling temp file and rename so a crash never leaves half a file.
    pub async fn save(&self, cursors: &BTreeMap<String, String>) -> std::io::Result<()> {
        let data = serde_json::to_string_pretty(cursors)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Vec<Stream>,
    discovery_fallback: bool,
    cursor_file: Option<CursorFile>,
}

impl StreamRegistry {
    /// `discovery_fallback` allows loading an empty set (discovery found nothing yet).
    pub fn new(discovery_fallback: bool) -> Self {
        Self {
            streams: Vec::new(),
            discovery_fallback,
            cursor_file: None,
        }
    }

    pub fn with_cursor_file(mut self, file: CursorFile) -> Self {
        self.cursor_file = Some(file);
        self
    }

    /// Replace the tracked streams, restoring persisted cursors when configured.
    pub fn load(&mut self, mut streams: Vec<Stream>) -> Result<()> {
        if streams.is_empty() && !self.discovery_fallback {
            return Err(IngestError::config(
                "no streams configured and stream discovery is disabled",
            ));
        }
        let duplicate = {
            let mut seen = BTreeSet::new();
            streams
                .iter()
                .find(|s| !seen.insert(s.id.as_str()))
                .map(|s| s.id.clone())
        };
        if let Some(id) = duplicate {
            return Err(IngestError::config(format!(
                "stream id '{id}' is configured more than once"
            )));
        }
        if let Some(file) = &self.cursor_file {
            let saved = file.load();
            let mut restored = 0usize;
            for s in streams.iter_mut() {
                if let Some(c) = saved.get(&s.id).filter(|c| !c.is_empty()) {
                    s.cursor = c.clone();
                    restored += 1;
                }
            }
            if restored > 0 {
                info!(path = %file.path().display(), restored, "restored stream cursors");
            }
        }
        self.streams = streams;
        Ok(())
    }

    /// Streams in configuration (or discovery) order.
    pub fn all(&self) -> &[Stream] {
        &self.streams
    }

    pub fn get(&self, stream_id: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == stream_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Set a stream's cursor. Returns false for an unknown id.
    pub async fn update_cursor(&mut self, stream_id: &str, cursor: &str) -> bool {
        let Some(stream) = self.streams.iter_mut().find(|s| s.id == stream_id) else {
            return false;
        };
        if stream.cursor == cursor {
            return true;
        }
        stream.cursor = cursor.to_string();
        self.persist().await;
        true
    }

    async fn persist(&self) {
        let Some(file) = &self.cursor_file else {
            return;
        };
        let cursors: BTreeMap<String, String> = self
            .streams
            .iter()
            .filter(|s| !s.cursor.is_empty())
            .map(|s| (s.id.clone(), s.cursor.clone()))
            .collect();
        if let Err(e) = file.save(&cursors).await {
            warn!(path = %file.path().display(), error = %e, "failed to persist stream cursors");
        }
    }
}
