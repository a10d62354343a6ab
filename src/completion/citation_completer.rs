//! Citation Completer
//!
//! Offers bibliography records after an `@`.
//!
//! ## Trigger Patterns
//! - `@` at the start of a line or after a space, `;`, `[` or `-`
//! - `[@doe`, `[see @doe; @ro`, `-@doe`
//!
//! The text between the `@` and the cursor is the query; the chosen key
//! replaces it.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use ropey::Rope;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, Position, Range,
    TextEdit,
};

use crate::bib::CitationRecord;
use crate::config::{CitationLabel, Settings, ViewType};
use crate::index::BibliographyIndex;

use super::{matcher, Completable, Completer, Context};

static CITATION_TRIGGER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[ ;\[-])@(?<query>[^\]\s;@]*)$").expect("Invalid citation trigger regex")
});

/// An `@` being typed, with the range the inserted key should replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationContext {
    pub query: String,
    /// From just after the `@` to the cursor.
    pub range: Range,
}

/// Looks at the last whitespace-separated token before `position`.
pub fn citation_context(text: &Rope, position: Position) -> Option<CitationContext> {
    let line = text.get_line(position.line as usize)?;
    let before: String = line.chars().take(position.character as usize).collect();
    let cursor = before.chars().count() as u32;

    let token = before.rsplit(char::is_whitespace).next()?;
    let query = CITATION_TRIGGER.captures(token)?.name("query")?.as_str();

    let start = cursor - query.chars().count() as u32;
    Some(CitationContext {
        query: query.to_string(),
        range: Range {
            start: Position {
                line: position.line,
                character: start,
            },
            end: Position {
                line: position.line,
                character: cursor,
            },
        },
    })
}

/// Key, author, title and journal; what clients filter citation items on.
pub fn filter_text(record: &CitationRecord) -> String {
    std::iter::once(record.key.as_str())
        .chain(record.author())
        .chain(record.title())
        .chain(record.journal())
        .join(" ")
}

fn label(record: &CitationRecord, mode: CitationLabel) -> String {
    let shown = match mode {
        CitationLabel::Key => None,
        CitationLabel::Title => record.title(),
        CitationLabel::Authors => record.author(),
    };
    shown.unwrap_or(&record.key).to_string()
}

fn detail(record: &CitationRecord, fields: &[String]) -> Option<String> {
    let values = fields
        .iter()
        .filter_map(|field| record.field(&field.to_lowercase()))
        .join(" · ");
    (!values.is_empty()).then_some(values)
}

pub struct CitationCompleter<'a> {
    citation: CitationContext,
    index: &'a BibliographyIndex,
    settings: &'a Settings,
}

impl<'a> Completer<'a> for CitationCompleter<'a> {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        // The browser view answers with a picker instead of a list.
        if context.settings.view_type == ViewType::Browser {
            return None;
        }

        let citation = citation_context(
            context.text,
            Position {
                line: line as u32,
                character: character as u32,
            },
        )?;

        Some(Self {
            citation,
            index: context.index,
            settings: context.settings,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        matcher::rank(&self.citation.query, self.index.all_records(), |record| {
            filter_text(record)
        })
        .into_iter()
        .enumerate()
        .map(|(rank, record)| CitationCompletion { record, rank })
        .collect()
    }

    type FilterParams = &'a CitationRecord;

    fn completion_filter_text(&self, record: Self::FilterParams) -> String {
        filter_text(record)
    }
}

struct CitationCompletion<'a> {
    record: &'a CitationRecord,
    rank: usize,
}

impl<'a> Completable<'a, CitationCompleter<'a>> for CitationCompletion<'a> {
    fn completions(&self, completer: &CitationCompleter<'a>) -> Option<CompletionItem> {
        let record = self.record;
        let settings = completer.settings;

        let detail = match settings.citation_label {
            CitationLabel::Key => detail(record, &settings.completion_detail_fields),
            // label already shows the interesting part
            CitationLabel::Title | CitationLabel::Authors => None,
        };

        Some(CompletionItem {
            label: label(record, settings.citation_label),
            kind: Some(CompletionItemKind::REFERENCE),
            detail,
            documentation: Some(Documentation::String(record.documentation("\n"))),
            filter_text: Some(completer.completion_filter_text(record)),
            sort_text: Some(format!("{:05}", self.rank)),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: completer.citation.range,
                new_text: record.key.clone(),
            })),
            ..Default::default()
        })
    }
}
