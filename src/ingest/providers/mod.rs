// src/ingest/providers/mod.rs
pub mod json;
pub mod xml;

use crate::error::Result;
use crate::ingest::types::{RawDocument, ResponseFormat};

/// Decode a response body in the configured wire format.
pub fn decode(format: ResponseFormat, body: &str) -> Result<RawDocument> {
    match format {
        ResponseFormat::Xml => xml::decode(body),
        ResponseFormat::Json => json::decode(body),
    }
}
