//! Workspace commands and the citation browser.
//!
//! | Command | Result |
//! |---------|--------|
//! | `citer.browse` | every record as a [`PickItem`] |
//! | `citer.listDuplicateKeys` | duplicated keys with their definitions |

use serde::Serialize;
use tower_lsp::lsp_types::{Location, MessageActionItem, Range, Url};

use crate::bib::CitationRecord;
use crate::completion::{filter_text, matcher};
use crate::{diagnostics, index::BibliographyIndex};

pub const BROWSE: &str = "citer.browse";
pub const LIST_DUPLICATE_KEYS: &str = "citer.listDuplicateKeys";

/// Every command the server registers.
pub const COMMANDS: [&str; 2] = [BROWSE, LIST_DUPLICATE_KEYS];

/// One row of the citation browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickItem {
    /// Title, or empty.
    pub label: String,
    /// The cite key.
    pub description: String,
    pub detail: String,
}

/// Most buttons the browser dialog offers at once.
pub const BROWSER_LIMIT: usize = 20;

fn pick_item(record: &CitationRecord) -> PickItem {
    let publication = record
        .journal()
        .or_else(|| record.publisher())
        .unwrap_or("Unknown");

    PickItem {
        label: record.title().unwrap_or_default().to_string(),
        description: record.key.clone(),
        detail: format!(
            "Authors: {}, publication: {publication}",
            record.author().unwrap_or("Unknown")
        ),
    }
}

pub fn browse(index: &BibliographyIndex) -> Vec<PickItem> {
    index.all_records().into_iter().map(pick_item).collect()
}

/// Records matching the typed `query`, best first, at most `limit` of them.
pub fn browse_matching(index: &BibliographyIndex, query: &str, limit: usize) -> Vec<PickItem> {
    matcher::rank(query, index.all_records(), |record| filter_text(record))
        .into_iter()
        .take(limit)
        .map(pick_item)
        .collect()
}

/// Button labels for picking among `items` in a message request.
pub fn pick_actions(items: &[PickItem]) -> Vec<MessageActionItem> {
    items
        .iter()
        .map(|item| MessageActionItem {
            title: pick_title(item),
            properties: Default::default(),
        })
        .collect()
}

fn pick_title(item: &PickItem) -> String {
    if item.label.is_empty() {
        item.description.clone()
    } else {
        format!("{}: {}", item.description, item.label)
    }
}

/// The key of the item whose button was chosen.
pub fn chosen_key<'a>(items: &'a [PickItem], action: &MessageActionItem) -> Option<&'a str> {
    items
        .iter()
        .find(|item| pick_title(item) == action.title)
        .map(|item| item.description.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKey {
    pub key: String,
    pub location: Location,
}

pub fn list_duplicate_keys(index: &BibliographyIndex) -> Vec<DuplicateKey> {
    diagnostics::duplicate_definitions(index)
        .into_iter()
        .filter_map(|(path, record)| {
            Some(DuplicateKey {
                key: record.key.clone(),
                location: Location {
                    uri: Url::from_file_path(path).ok()?,
                    range: Range {
                        start: record.position,
                        end: record.position,
                    },
                },
            })
        })
        .collect()
}
