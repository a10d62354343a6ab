//! CSL-JSON reader.
//!
//! A CSL-JSON bibliography is an array of items keyed by `id`. Items are
//! mapped onto the same [`CitationRecord`] shape the BibTeX scanner produces
//! so the rest of the crate never has to care which format a file used.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::{CitationRecord, EntryType, ParseOutput, ParseWarning, WarningKind};

/// `"id": "..."` or `"id": 42` as it appears in the raw text; used to recover line numbers.
static ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""id"\s*:\s*("(?:[^"\\]|\\.)*"|-?[0-9][0-9.eE+\-]*)"#).expect("Invalid id regex")
});

fn entry_type(csl_type: Option<&str>) -> EntryType {
    match csl_type {
        Some("article-journal" | "article-magazine" | "article-newspaper" | "article") => {
            EntryType::Article
        }
        Some("book") => EntryType::Book,
        Some("chapter") => EntryType::InCollection,
        Some("paper-conference") => EntryType::InProceedings,
        Some("report") => EntryType::Report,
        Some("thesis") => EntryType::Thesis,
        Some("webpage" | "post" | "post-weblog") => EntryType::Online,
        Some("manuscript") => EntryType::Unpublished,
        Some("patent") => EntryType::Patent,
        Some("periodical") => EntryType::Periodical,
        _ => EntryType::Unknown,
    }
}

/// Renders one CSL name object.
fn name(value: &Value) -> Option<String> {
    if let Some(literal) = value.get("literal").and_then(Value::as_str) {
        return Some(literal.to_string());
    }

    let family = value.get("family").and_then(Value::as_str);
    let given = value.get("given").and_then(Value::as_str);
    match (family, given) {
        (Some(family), Some(given)) => Some(format!("{family}, {given}")),
        (Some(family), None) => Some(family.to_string()),
        (None, Some(given)) => Some(given.to_string()),
        (None, None) => None,
    }
}

fn names(value: &Value) -> Option<String> {
    let rendered: Vec<_> = value.as_array()?.iter().filter_map(name).collect();
    (!rendered.is_empty()).then(|| rendered.join(" and "))
}

fn year(value: &Value) -> Option<String> {
    let first = value.get("date-parts")?.get(0)?.get(0)?;
    match first {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn record(item: &Map<String, Value>, key: &str, line: u32) -> CitationRecord {
    let csl_type = item.get("type").and_then(Value::as_str);
    let mut record = CitationRecord::new(key, entry_type(csl_type), line);

    for (field, value) in item {
        match field.as_str() {
            "id" | "type" => {}
            "author" | "editor" | "translator" => {
                if let Some(rendered) = names(value) {
                    record.set_field(field, rendered);
                }
            }
            "container-title" => {
                if let Some(text) = scalar(value) {
                    record.set_field("journal", text);
                }
            }
            "issued" => {
                if let Some(text) = year(value) {
                    record.set_field("year", text);
                }
            }
            _ => {
                if let Some(text) = scalar(value) {
                    record.set_field(field, text);
                }
            }
        }
    }

    record
}

/// Zero-based line of each `"id"` member, in document order.
///
/// Ids are decoded the same way item ids are, so escapes and numbers compare
/// equal to the key they produce.
fn id_lines(text: &str) -> Vec<(String, u32)> {
    let mut lines = Vec::new();
    let mut line = 0u32;
    let mut offset = 0;

    for captures in ID_REGEX.captures_iter(text) {
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        line += text[offset..whole.start()].matches('\n').count() as u32;
        offset = whole.start();

        let decoded = serde_json::from_str::<Value>(id.as_str()).ok();
        if let Some(id) = decoded.as_ref().and_then(scalar) {
            lines.push((id, line));
        }
    }

    lines
}

pub(super) fn parse(text: &str) -> ParseOutput {
    let mut output = ParseOutput::default();

    let items = match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            output.warnings.push(ParseWarning {
                line: 0,
                kind: WarningKind::Malformed("expected a JSON array of CSL items".to_string()),
                excerpt: String::new(),
            });
            return output;
        }
        Err(err) => {
            output.warnings.push(ParseWarning {
                line: err.line().saturating_sub(1) as u32,
                kind: WarningKind::Malformed(err.to_string()),
                excerpt: String::new(),
            });
            return output;
        }
    };

    let positions = id_lines(text);
    let mut next = 0;

    for item in &items {
        let Some(item) = item.as_object() else {
            continue;
        };

        let key = item.get("id").and_then(scalar).filter(|id| !id.is_empty());
        let Some(key) = key else {
            output.warnings.push(ParseWarning {
                line: 0,
                kind: WarningKind::MissingId,
                excerpt: item
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
            continue;
        };

        // Ids appear in the same order as the items; skip ahead to ours,
        // but leave the cursor alone when it is not found.
        let found = positions[next..].iter().position(|(id, _)| *id == key);
        let line = match found {
            Some(offset) => {
                next += offset + 1;
                positions[next - 1].1
            }
            None => 0,
        };

        output.records.push(record(item, &key, line));
    }

    output
}
