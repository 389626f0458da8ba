// src/ingest/sink/file.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};
use crate::ingest::sink::Sink;
use crate::ingest::types::{ActivityRecord, ResponseFormat};

/// Writes each entry's verbatim payload to `<out_box>/<id>.<ext>`. Last write wins.
#[derive(Debug, Clone)]
pub struct FileSink {
    out_box: PathBuf,
}

impl FileSink {
    /// Creates `out_box` if it does not exist yet.
    pub fn new(out_box: impl AsRef<Path>) -> Result<Self> {
        let out_box = out_box.as_ref().to_path_buf();
        std::fs::create_dir_all(&out_box).map_err(|e| {
            IngestError::config(format!("creating out_box {}: {e}", out_box.display()))
        })?;
        Ok(Self { out_box })
    }

    pub fn out_box(&self) -> &Path {
        &self.out_box
    }

    /// Target path for an entry id. The id is used as-is except for characters the
    /// platform cannot hold in a single file name, which become `_`.
    pub fn path_for(&self, entry_id: &str, format: ResponseFormat) -> Option<PathBuf> {
        let name: String = entry_id
            .trim()
            .chars()
            .map(|c| if is_reserved(c) { '_' } else { c })
            .collect();
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(self.out_box.join(format!("{name}.{}", format.extension())))
    }
}

#[cfg(unix)]
fn is_reserved(c: char) -> bool {
    c == '/' || c == '\0'
}

#[cfg(not(unix))]
fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&self, record: &ActivityRecord<'_>) -> Result<()> {
        let entry = record.entry;
        let path = self
            .path_for(&entry.id, record.format)
            .ok_or_else(|| IngestError::field(&entry.id, "entry has no usable id for a file name"))?;
        tokio::fs::write(&path, entry.raw.as_bytes())
            .await
            .map_err(|e| IngestError::sink_write(&entry.id, format!("{}: {e}", path.display())))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
