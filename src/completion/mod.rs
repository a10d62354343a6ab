use ropey::Rope;
use tower_lsp::lsp_types::{CompletionItem, CompletionList, CompletionResponse, Position};

use crate::{config::Settings, index::BibliographyIndex};

use self::citation_completer::CitationCompleter;
use self::crossref_completer::CrossrefCompleter;

pub use self::citation_completer::{citation_context, filter_text, CitationContext};

mod citation_completer;
mod crossref_completer;
pub(crate) mod matcher;

/// Most items a single completer returns.
const MAX_ITEMS: usize = 200;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    index: &'a BibliographyIndex,
    text: &'a Rope,
    settings: &'a Settings,
}

pub trait Completer<'a>: Sized {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>;

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized;

    type FilterParams;
    /// Completers like nvim-cmp filter on their own, so hand them the text to filter on
    fn completion_filter_text(&self, params: Self::FilterParams) -> String;
}

pub trait Completable<'a, T: Completer<'a>>: Sized {
    fn completions(&self, completer: &T) -> Option<CompletionItem>;
}

/// Completion items for the cursor in `text`: citations from `index`
/// followed by cross-reference targets from `text` itself.
pub fn get_completions(
    index: &BibliographyIndex,
    text: &Rope,
    position: Position,
    settings: &Settings,
) -> Option<CompletionResponse> {
    let completion_context = Context {
        index,
        text,
        settings,
    };

    let citations =
        run_completer::<CitationCompleter>(completion_context, position.line, position.character);
    let crossrefs =
        run_completer::<CrossrefCompleter>(completion_context, position.line, position.character);

    if citations.is_none() && crossrefs.is_none() {
        return None;
    }

    Some(CompletionResponse::List(CompletionList {
        is_incomplete: true,
        items: citations
            .into_iter()
            .flatten()
            .chain(crossrefs.into_iter().flatten())
            .collect(),
    }))
}

fn run_completer<'a, T: Completer<'a>>(
    context: Context<'a>,
    line: u32,
    character: u32,
) -> Option<Vec<CompletionItem>> {
    let completer = T::construct(context, line as usize, character as usize)?;
    let completions = completer.completions();

    Some(
        completions
            .into_iter()
            .take(MAX_ITEMS)
            .filter_map(|completable| completable.completions(&completer))
            .collect(),
    )
}
