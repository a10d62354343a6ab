//! Crossref Completer
//!
//! Offers the pandoc-crossref targets of the current document
//! (`@fig:…`, `@tbl:…`, `@eq:…`, `@sec:…`, `@lst:…`) in the same `@`
//! context as citations.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, Position, TextEdit,
};

use crate::crossref::{self, CrossrefTarget};

use super::{citation_context, matcher, CitationContext, Completable, Completer, Context};

pub struct CrossrefCompleter {
    citation: CitationContext,
    targets: Vec<CrossrefTarget>,
}

impl<'a> Completer<'a> for CrossrefCompleter {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        let citation = citation_context(
            context.text,
            Position {
                line: line as u32,
                character: character as u32,
            },
        )?;

        Some(Self {
            citation,
            targets: crossref::targets(context.text),
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        matcher::rank(
            &self.citation.query,
            self.targets.clone(),
            |target| filter_text(target),
        )
    }

    type FilterParams = &'a CrossrefTarget;

    fn completion_filter_text(&self, target: Self::FilterParams) -> String {
        filter_text(target)
    }
}

fn filter_text(target: &CrossrefTarget) -> String {
    format!("{} {}", target.reference(), target.caption)
}

impl<'a> Completable<'a, CrossrefCompleter> for CrossrefTarget {
    fn completions(&self, completer: &CrossrefCompleter) -> Option<CompletionItem> {
        let reference = self.reference();
        Some(CompletionItem {
            label: reference.clone(),
            kind: Some(CompletionItemKind::CONSTANT),
            documentation: Some(Documentation::String(self.caption.clone())),
            filter_text: Some(filter_text(self)),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: completer.citation.range,
                new_text: reference,
            })),
            ..Default::default()
        })
    }
}
