// src/ingest/providers/xml.rs
//! Decoder for normalized Activity Streams (Atom) responses.
//!
//! The response root is `<results publisher=".." endpoint=".." refreshURL="..">` with
//! zero or more `<entry>` children. Each entry is kept verbatim (`Entry::raw`) next to
//! the handful of fields promoted to table columns.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{IngestError, Result};
use crate::ingest::types::{Entry, GeoPoint, MatchingRule, RawDocument};

const TIME_ELEMENTS: [&str; 3] = ["created", "postedTime", "published"];

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart<'_>, wanted: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(IngestError::decode)?;
        if attr.key.local_name().as_ref() == wanted {
            let v = attr.unescape_value().map_err(IngestError::decode)?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

fn read_results_attrs(e: &BytesStart<'_>, doc: &mut RawDocument) -> Result<()> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    doc.publisher = non_empty(attr_value(e, b"publisher")?);
    doc.endpoint = non_empty(attr_value(e, b"endpoint")?);
    doc.cursor = non_empty(attr_value(e, b"refreshURL")?);
    Ok(())
}

/// Fields collected while the reader is inside one `<entry>`.
struct EntryBuilder {
    /// Depth of the `<entry>` element in the element stack.
    depth: usize,
    /// Byte offset of the `<` opening the entry.
    start: usize,
    id: String,
    posted: String,
    in_posted: bool,
    object_content: String,
    content: String,
    rules: Vec<MatchingRule>,
    point: String,
}

impl EntryBuilder {
    fn new(depth: usize, start: usize) -> Self {
        Self {
            depth,
            start,
            id: String::new(),
            posted: String::new(),
            in_posted: false,
            object_content: String::new(),
            content: String::new(),
            rules: Vec::new(),
            point: String::new(),
        }
    }

    /// `rel` is the element path starting at `entry`, including the opened element.
    fn open(&mut self, rel: &[&str], e: &BytesStart<'_>) -> Result<()> {
        match rel {
            ["entry", t] if TIME_ELEMENTS.contains(t) => {
                self.in_posted = self.posted.is_empty();
            }
            ["entry", "matching_rules", "matching_rule"] => {
                self.rules.push(MatchingRule {
                    value: String::new(),
                    tag: attr_value(e, b"tag")?.unwrap_or_default(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, rel: &[&str]) {
        if let ["entry", t] = rel {
            if TIME_ELEMENTS.contains(t) {
                self.in_posted = false;
            }
        }
    }

    fn text(&mut self, rel: &[&str], text: &str) {
        match rel {
            ["entry", "id"] => self.id.push_str(text),
            ["entry", t] if TIME_ELEMENTS.contains(t) && self.in_posted => {
                self.posted.push_str(text)
            }
            ["entry", "object", "content"] => self.object_content.push_str(text),
            ["entry", "content"] => self.content.push_str(text),
            ["entry", "matching_rules", "matching_rule"] => {
                if let Some(rule) = self.rules.last_mut() {
                    rule.value.push_str(text);
                }
            }
            ["entry", "point"] | ["entry", "where", "point"] => self.point.push_str(text),
            _ => {}
        }
    }

    fn finish(self, raw: &str) -> Entry {
        let coords: Vec<f64> = self
            .point
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        let body = if self.object_content.trim().is_empty() {
            self.content
        } else {
            self.object_content
        };
        Entry {
            id: self.id.trim().to_string(),
            posted_time: self.posted.trim().to_string(),
            body: body.trim().to_string(),
            rules: self
                .rules
                .into_iter()
                .map(|r| MatchingRule {
                    value: r.value.trim().to_string(),
                    tag: r.tag.trim().to_string(),
                })
                .collect(),
            geo: GeoPoint::from_coordinates(&coords),
            raw: raw.trim().to_string(),
        }
    }
}

pub fn decode(body: &str) -> Result<RawDocument> {
    let mut reader = Reader::from_str(body);
    let mut doc = RawDocument::default();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut saw_root = false;

    loop {
        let pos = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| IngestError::decode(format!("xml near byte {pos}: {e}")))?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                if !saw_root {
                    saw_root = true;
                    expect_results_root(&name)?;
                    read_results_attrs(&e, &mut doc)?;
                }
                path.push(name);
                if current.is_none() && path.last().map(String::as_str) == Some("entry") {
                    current = Some(EntryBuilder::new(path.len() - 1, pos));
                } else if let Some(b) = current.as_mut() {
                    let rel: Vec<&str> = path[b.depth..].iter().map(String::as_str).collect();
                    b.open(&rel, &e)?;
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if !saw_root {
                    saw_root = true;
                    expect_results_root(&name)?;
                    read_results_attrs(&e, &mut doc)?;
                } else if let Some(b) = current.as_mut() {
                    let mut rel: Vec<&str> = path[b.depth..].iter().map(String::as_str).collect();
                    rel.push(name.as_str());
                    b.open(&rel, &e)?;
                    b.close(&rel);
                }
            }
            Event::Text(t) => {
                if let Some(b) = current.as_mut() {
                    let text = t.unescape().map_err(IngestError::decode)?;
                    let rel: Vec<&str> = path[b.depth..].iter().map(String::as_str).collect();
                    b.text(&rel, &text);
                }
            }
            Event::CData(c) => {
                if let Some(b) = current.as_mut() {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    let rel: Vec<&str> = path[b.depth..].iter().map(String::as_str).collect();
                    b.text(&rel, &text);
                }
            }
            Event::End(_) => {
                let closes_entry = matches!(&current, Some(b) if path.len() == b.depth + 1);
                if closes_entry {
                    if let Some(b) = current.take() {
                        let end = reader.buffer_position() as usize;
                        let raw = body.get(b.start..end).unwrap_or_default();
                        doc.entries.push(b.finish(raw));
                    }
                } else if let Some(b) = current.as_mut() {
                    let rel: Vec<&str> = path[b.depth..].iter().map(String::as_str).collect();
                    b.close(&rel);
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(IngestError::decode("empty xml document"));
    }
    if let Some(open) = path.last() {
        return Err(IngestError::decode(format!(
            "truncated xml document, <{open}> never closed"
        )));
    }
    Ok(doc)
}

fn expect_results_root(name: &str) -> Result<()> {
    if name == "results" {
        Ok(())
    } else {
        Err(IngestError::decode(format!(
            "unexpected root element <{name}>, expected <results>"
        )))
    }
}
