//! Open documents and the cite keys inside them.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range};

/// Language ids the server answers for.
pub const LANGUAGE_IDS: [&str; 4] = ["markdown", "rmd", "pweave_md", "quarto"];

/// Extensions recognized when the client sends some other language id.
pub const EXTENSIONS: [&str; 5] = ["md", "markdown", "rmd", "qmd", "pmd"];

/// `@key`, where the key may contain `:.#$%&-+?<>~/` between word runs.
static CITE_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(?<key>[\w\p{L}\p{M}]+(?:[:.#$%&\-+?<>~/][\w\p{L}\p{M}]+)*)")
        .expect("Invalid cite key regex")
});

/// Text of an open document as last synced by the client.
#[derive(Debug, Clone)]
pub struct Document {
    pub rope: Rope,
    pub language_id: Option<String>,
}

impl Document {
    pub fn new(text: &str, language_id: Option<String>) -> Document {
        Document {
            rope: Rope::from_str(text),
            language_id,
        }
    }
}

pub fn is_recognized(language_id: Option<&str>, path: &Path) -> bool {
    if language_id.is_some_and(|id| LANGUAGE_IDS.contains(&id)) {
        return true;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiteKeyAt {
    pub key: String,
    /// The key including its `@`.
    pub range: Range,
}

/// The cite key whose `@key` text contains `position`, if any.
///
/// The position right after the last character still counts.
pub fn cite_key_at(text: &Rope, position: Position) -> Option<CiteKeyAt> {
    let line = text.get_line(position.line as usize)?.to_string();
    let cursor = position.character as usize;

    CITE_KEY_REGEX.captures_iter(&line).find_map(|captures| {
        let whole = captures.get(0)?;
        let key = captures.name("key")?;
        let start = line[..whole.start()].chars().count();
        let end = start + whole.as_str().chars().count();

        (start..=end).contains(&cursor).then(|| CiteKeyAt {
            key: key.as_str().to_string(),
            range: Range {
                start: Position::new(position.line, start as u32),
                end: Position::new(position.line, end as u32),
            },
        })
    })
}
