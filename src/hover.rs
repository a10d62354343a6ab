//! Hover provider for citations.
//!
//! Hovering over `@key` shows every field of the matching record:
//!
//! ```text
//! author: Doe, Jane
//! title: A Study of Things
//! year: 2020
//! ```
//!
//! Hover can be disabled via [`Settings::hover`]:
//!
//! ```json
//! { "hover": false }
//! ```

use ropey::Rope;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::{config::Settings, document::cite_key_at, index::BibliographyIndex};

/// Markdown hard line break.
const LINE_BREAK: &str = "  \n";

/// Generate hover content for the cite key at `position`.
///
/// Returns `None` if hover is disabled, the cursor is not on a cite key, or
/// no record has that key.
pub fn hover(
    index: &BibliographyIndex,
    text: &Rope,
    position: Position,
    settings: &Settings,
) -> Option<Hover> {
    if !settings.hover {
        return None;
    }

    let cited = cite_key_at(text, position)?;
    let (_, record) = index.find_by_key(&cited.key)?;

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: record.documentation(LINE_BREAK),
        }),
        range: Some(cited.range),
    })
}
