//! BibTeX block scanner.
//!
//! Scanning happens in two passes over the text:
//!
//! 1. [`find_markers`] walks the text once, recording every `@word{` marker
//!    together with its line number. Lines are counted as the walk advances.
//! 2. Each marker whose word is a known [`EntryType`] owns the span up to the
//!    next marker (or end of text). [`scan_entry`] runs a small state machine
//!    over that span to pull out the key and the fields.
//!
//! Markers with unknown words (`@comment`, `@string`, ...) produce nothing,
//! but still end the span of the entry before them.

use itertools::Itertools;

use super::{CitationRecord, EntryType, ParseOutput, ParseWarning, WarningKind};

/// Longest excerpt quoted in a warning, in characters.
const EXCERPT_LEN: usize = 80;

/// An `@word{` marker in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker<'a> {
    /// Byte offset of the `@`.
    start: usize,
    name: &'a str,
    /// Byte offset just past the `{`.
    body_start: usize,
    /// Zero-based line of the `@`.
    line: u32,
}

fn find_markers(text: &str) -> Vec<Marker<'_>> {
    let bytes = text.as_bytes();
    let mut markers = Vec::new();
    let mut line = 0u32;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'@' => match marker_at(bytes, i) {
                Some((name_end, body_start)) => {
                    markers.push(Marker {
                        start: i,
                        name: &text[i + 1..name_end],
                        body_start,
                        line,
                    });
                    // `@article\n{` is legal; keep the count right.
                    line += bytes[name_end..body_start]
                        .iter()
                        .filter(|b| **b == b'\n')
                        .count() as u32;
                    i = body_start;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    markers
}

/// Matches `@word\s*{` at `at`. Returns the end of the word and the offset past the brace.
fn marker_at(bytes: &[u8], at: usize) -> Option<(usize, usize)> {
    let name_start = at + 1;
    let name_end = name_start
        + bytes[name_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
    if name_end == name_start {
        return None;
    }

    let brace = name_end
        + bytes[name_end..]
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();

    (bytes.get(brace) == Some(&b'{')).then_some((name_end, brace + 1))
}

/// Scanner states inside one entry body (the text after `@type{`).
///
/// Offsets are byte offsets into the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading the cite key; `start` is set once the first key character is seen.
    InEntryKey { start: Option<usize> },
    /// Between `,` separators, waiting for a field name or the closing brace.
    BetweenFields,
    InFieldName { start: usize },
    /// A field name was read; waiting for `=`.
    AfterFieldName,
    /// `=` was read; waiting for the value delimiter.
    BeforeValue,
    InBraceValue { start: usize, depth: usize },
    InQuoteValue { start: usize },
    InBareValue { start: usize },
    /// A value ended; waiting for `,` or the closing brace.
    AfterValue,
    Closed,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ScannedEntry {
    key: String,
    fields: Vec<(String, String)>,
}

impl ScannedEntry {
    fn store(&mut self, name: Option<String>, value: &str) {
        if let Some(name) = name {
            self.fields.push((name, value.to_string()));
        }
    }
}

fn is_field_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!$&*+-./:;<>?[]^_`|".contains(c)
}

/// Runs the entry state machine over `body`.
///
/// Stops at the brace closing the entry or at the end of `body`. A value
/// still open at the end of `body` is discarded.
fn scan_entry(body: &str) -> ScannedEntry {
    let mut entry = ScannedEntry::default();
    let mut state = State::InEntryKey { start: None };
    let mut field: Option<String> = None;
    let mut prev: Option<char> = None;

    for (i, c) in body.char_indices() {
        let escaped = prev == Some('\\');

        state = match state {
            State::InEntryKey { start: None } => match c {
                ',' => State::BetweenFields,
                '}' => State::Closed,
                c if c.is_whitespace() => state,
                _ => State::InEntryKey { start: Some(i) },
            },
            State::InEntryKey { start: Some(start) } => match c {
                ',' | '}' => {
                    entry.key = body[start..i].to_string();
                    if c == '}' {
                        State::Closed
                    } else {
                        State::BetweenFields
                    }
                }
                c if c.is_whitespace() => {
                    entry.key = body[start..i].to_string();
                    State::BetweenFields
                }
                _ => state,
            },
            State::BetweenFields => match c {
                '}' => State::Closed,
                c if is_field_name_char(c) => State::InFieldName { start: i },
                _ => state,
            },
            State::InFieldName { start } if !is_field_name_char(c) => {
                field = Some(body[start..i].to_lowercase());
                match c {
                    '=' => State::BeforeValue,
                    '}' => State::Closed,
                    ',' => State::BetweenFields,
                    _ => State::AfterFieldName,
                }
            }
            State::InFieldName { .. } => state,
            State::AfterFieldName => match c {
                '=' => State::BeforeValue,
                '}' => State::Closed,
                c if c.is_whitespace() => state,
                c if is_field_name_char(c) => State::InFieldName { start: i },
                _ => State::BetweenFields,
            },
            State::BeforeValue => match c {
                '{' => State::InBraceValue {
                    start: i + 1,
                    depth: 1,
                },
                '"' => State::InQuoteValue { start: i + 1 },
                '}' => State::Closed,
                ',' => State::BetweenFields,
                c if c.is_whitespace() => state,
                _ => State::InBareValue { start: i },
            },
            State::InBraceValue { start, depth } => match c {
                '{' if !escaped => State::InBraceValue {
                    start,
                    depth: depth + 1,
                },
                '}' if !escaped && depth == 1 => {
                    entry.store(field.take(), &body[start..i]);
                    State::AfterValue
                }
                '}' if !escaped => State::InBraceValue {
                    start,
                    depth: depth - 1,
                },
                _ => state,
            },
            State::InQuoteValue { start } => match c {
                '"' if !escaped => {
                    entry.store(field.take(), &body[start..i]);
                    State::AfterValue
                }
                _ => state,
            },
            State::InBareValue { start } => match c {
                ',' | '}' => {
                    entry.store(field.take(), body[start..i].trim_end());
                    if c == '}' {
                        State::Closed
                    } else {
                        State::BetweenFields
                    }
                }
                c if c.is_whitespace() => {
                    entry.store(field.take(), &body[start..i]);
                    State::AfterValue
                }
                _ => state,
            },
            State::AfterValue => match c {
                ',' => State::BetweenFields,
                '}' => State::Closed,
                _ => state,
            },
            State::Closed => break,
        };

        prev = Some(c);
    }

    match state {
        State::InEntryKey { start: Some(start) } => entry.key = body[start..].trim_end().to_string(),
        State::InBareValue { start } => entry.store(field.take(), body[start..].trim_end()),
        _ => {}
    }

    entry
}

fn excerpt(span: &str) -> String {
    let collapsed = span.split_whitespace().join(" ");
    if collapsed.chars().count() > EXCERPT_LEN {
        format!("{}...", collapsed.chars().take(EXCERPT_LEN).collect::<String>())
    } else {
        collapsed
    }
}

pub(super) fn scan(text: &str) -> ParseOutput {
    let markers = find_markers(text);
    let mut output = ParseOutput::default();

    for (index, marker) in markers.iter().enumerate() {
        let end = markers
            .get(index + 1)
            .map_or(text.len(), |next| next.start);

        let Some(entry_type) = EntryType::from_name(marker.name) else {
            continue;
        };

        let entry = scan_entry(&text[marker.body_start..end]);
        if entry.key.is_empty() {
            output.warnings.push(ParseWarning {
                line: marker.line,
                kind: WarningKind::MissingKey,
                excerpt: excerpt(&text[marker.start..end]),
            });
            continue;
        }

        let mut record = CitationRecord::new(entry.key, entry_type, marker.line);
        for (name, value) in entry.fields {
            record.set_field(&name, value);
        }
        output.records.push(record);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_record(text: &str) -> CitationRecord {
        let output = scan(text);
        assert!(output.warnings.is_empty(), "{:?}", output.warnings);
        assert_eq!(output.records.len(), 1, "{:?}", output.records);
        output.records.into_iter().next().unwrap()
    }

    #[test]
    fn test_brace_and_quote_values() {
        let record = only_record(
            r#"@article{doe2020,
  author = {Doe, Jane},
  title = "A Study",
  journal={Journal of Things}
}"#,
        );

        assert_eq!(record.key, "doe2020");
        assert_eq!(record.entry_type, EntryType::Article);
        assert_eq!(record.author(), Some("Doe, Jane"));
        assert_eq!(record.title(), Some("A Study"));
        assert_eq!(record.journal(), Some("Journal of Things"));
        assert_eq!(record.fields.len(), 3);
    }

    #[test]
    fn test_layout_does_not_matter() {
        let compact = only_record(r#"@book{k,title={T},author="A"}"#);
        let spread = only_record("@book\n{\n  k ,\n\n  title\n =\n {T} ,\n  author = \"A\"\n}");

        assert_eq!(compact.key, spread.key);
        assert_eq!(compact.fields, spread.fields);
    }

    #[test]
    fn test_nested_braces_keep_inner_pairs() {
        let record = only_record("@misc{k, note = {a {nested} b}}");
        assert_eq!(record.field("note"), Some("a {nested} b"));
    }

    #[test]
    fn test_escaped_braces_do_not_change_depth() {
        let record = only_record(r"@misc{k, note = {open \{ only}, year = {2001}}");
        assert_eq!(record.field("note"), Some(r"open \{ only"));
        assert_eq!(record.field("year"), Some("2001"));
    }

    #[test]
    fn test_escaped_quote_inside_quoted_value() {
        let record = only_record(r#"@misc{k, title = "say \"hi\" twice"}"#);
        assert_eq!(record.title(), Some(r#"say \"hi\" twice"#));
    }

    #[test]
    fn test_bare_values() {
        let record = only_record("@misc{k, year = 2020, month = jan}");
        assert_eq!(record.field("year"), Some("2020"));
        assert_eq!(record.field("month"), Some("jan"));
    }

    #[test]
    fn test_field_names_are_lower_cased_and_last_wins() {
        let record = only_record("@misc{k, TITLE = {First}, Title = {Second}}");
        assert_eq!(record.title(), Some("Second"));
        assert_eq!(record.fields.len(), 1);
    }

    #[test]
    fn test_empty_key_is_dropped_with_warning() {
        let output = scan("@article{, title={X}}");
        assert!(output.records.is_empty());
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].kind, WarningKind::MissingKey);
        assert_eq!(output.warnings[0].line, 0);
    }

    #[test]
    fn test_unknown_markers_are_skipped() {
        let output = scan(
            "@comment{ignore this, title = {Nope}}\n@string{jgr = {J. Geophys. Res.}}\n@book{b1, title={B}}",
        );

        assert!(output.warnings.is_empty());
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].key, "b1");
        assert_eq!(output.records[0].title(), Some("B"));
        assert_eq!(output.records[0].position.line, 2);
    }

    #[test]
    fn test_unknown_marker_ends_previous_span() {
        let output = scan("@article{a, title = {A}\n@comment{x}\n}");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].title(), Some("A"));
    }

    #[test]
    fn test_prose_around_entries_is_ignored() {
        let output = scan(
            "This file was exported by a tool.\nmail me at someone@example.org\n\n@misc{m, title={M}}\ntrailing words",
        );
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].key, "m");
        assert_eq!(output.records[0].position.line, 3);
    }

    #[test]
    fn test_line_numbers_follow_document() {
        let text = "@article{one,\n  title = {One\n  spans lines}\n}\n\n@book{two, title={Two}}\n% comment\n@misc\n{three}\n";
        let output = scan(text);

        let lines: Vec<_> = output
            .records
            .iter()
            .map(|record| (record.key.as_str(), record.position.line))
            .collect();
        assert_eq!(lines, vec![("one", 0), ("two", 5), ("three", 7)]);
    }

    #[test]
    fn test_unbalanced_braces_stop_at_span_end() {
        let output = scan("@article{a, year = {1999}, title = {oops\n@book{b, title={B}}");

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].key, "a");
        assert_eq!(output.records[0].field("year"), Some("1999"));
        assert_eq!(output.records[0].title(), None);
        assert_eq!(output.records[1].title(), Some("B"));
    }

    #[test]
    fn test_unterminated_entry_at_end_of_text() {
        let output = scan("@article{a, title = {never closed");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].key, "a");
        assert!(output.records[0].fields.is_empty());
    }

    #[test]
    fn test_key_only_entry() {
        let record = only_record("@misc{lonely}");
        assert_eq!(record.key, "lonely");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_unicode_values() {
        let record = only_record("@book{gödel31, author = {Kurt Gödel}, title = {Über formal unentscheidbare Sätze}}");
        assert_eq!(record.key, "gödel31");
        assert_eq!(record.author(), Some("Kurt Gödel"));
        assert_eq!(record.title(), Some("Über formal unentscheidbare Sätze"));
    }

    #[test]
    fn test_document_order() {
        let output = scan("@misc{c}\n@misc{a}\n@misc{b}");
        let keys: Vec<_> = output.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_warning_excerpt_is_single_line() {
        let output = scan("@article{,\n  title = {X}\n}");
        assert_eq!(output.warnings[0].excerpt, "@article{, title = {X} }");
    }
}
