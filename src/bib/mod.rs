//! Bibliography record parsing.
//!
//! Turns the text of a bibliography file into an ordered list of
//! [`CitationRecord`]s. Nothing in here touches the filesystem; callers read
//! the file and hand the text over.
//!
//! Two formats are understood:
//!
//! | Extension | Reader |
//! |-----------|--------|
//! | `.json` | CSL-JSON array ([`csl`]) |
//! | anything else | BibTeX-style `@type{key, field = value}` blocks ([`scanner`]) |
//!
//! Only the subset of BibTeX needed to recover a key and flat field values is
//! supported. `@string` macros and `#` concatenation are ignored.

mod csl;
mod error;
mod scanner;

pub use error::BibError;

use std::{fmt, path::Path};

use indexmap::IndexMap;
use serde::Serialize;
use tower_lsp::lsp_types::Position;

/// Structural entry type of a bibliography record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Article,
    Book,
    BookInBook,
    Booklet,
    Collection,
    Conference,
    InBook,
    InCollection,
    InProceedings,
    InReference,
    Manual,
    MastersThesis,
    Misc,
    MvBook,
    MvCollection,
    MvProceedings,
    MvReference,
    Online,
    Patent,
    Periodical,
    PhdThesis,
    Proceedings,
    Reference,
    Report,
    Set,
    SuppBook,
    SuppCollection,
    SuppPeriodical,
    TechReport,
    Thesis,
    Unpublished,
    /// Only produced for CSL types without a BibTeX counterpart.
    Unknown,
}

impl EntryType {
    /// Every entry type recognized in `@type{` markers.
    pub const KNOWN: [EntryType; 31] = [
        EntryType::Article,
        EntryType::Book,
        EntryType::BookInBook,
        EntryType::Booklet,
        EntryType::Collection,
        EntryType::Conference,
        EntryType::InBook,
        EntryType::InCollection,
        EntryType::InProceedings,
        EntryType::InReference,
        EntryType::Manual,
        EntryType::MastersThesis,
        EntryType::Misc,
        EntryType::MvBook,
        EntryType::MvCollection,
        EntryType::MvProceedings,
        EntryType::MvReference,
        EntryType::Online,
        EntryType::Patent,
        EntryType::Periodical,
        EntryType::PhdThesis,
        EntryType::Proceedings,
        EntryType::Reference,
        EntryType::Report,
        EntryType::Set,
        EntryType::SuppBook,
        EntryType::SuppCollection,
        EntryType::SuppPeriodical,
        EntryType::TechReport,
        EntryType::Thesis,
        EntryType::Unpublished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Article => "article",
            EntryType::Book => "book",
            EntryType::BookInBook => "bookinbook",
            EntryType::Booklet => "booklet",
            EntryType::Collection => "collection",
            EntryType::Conference => "conference",
            EntryType::InBook => "inbook",
            EntryType::InCollection => "incollection",
            EntryType::InProceedings => "inproceedings",
            EntryType::InReference => "inreference",
            EntryType::Manual => "manual",
            EntryType::MastersThesis => "mastersthesis",
            EntryType::Misc => "misc",
            EntryType::MvBook => "mvbook",
            EntryType::MvCollection => "mvcollection",
            EntryType::MvProceedings => "mvproceedings",
            EntryType::MvReference => "mvreference",
            EntryType::Online => "online",
            EntryType::Patent => "patent",
            EntryType::Periodical => "periodical",
            EntryType::PhdThesis => "phdthesis",
            EntryType::Proceedings => "proceedings",
            EntryType::Reference => "reference",
            EntryType::Report => "report",
            EntryType::Set => "set",
            EntryType::SuppBook => "suppbook",
            EntryType::SuppCollection => "suppcollection",
            EntryType::SuppPeriodical => "suppperiodical",
            EntryType::TechReport => "techreport",
            EntryType::Thesis => "thesis",
            EntryType::Unpublished => "unpublished",
            EntryType::Unknown => "unknown",
        }
    }

    /// Looks up a marker name (`article` in `@Article{`), ignoring case.
    ///
    /// Returns `None` for names outside the vocabulary, including `comment`,
    /// `string` and `preamble`.
    pub fn from_name(name: &str) -> Option<EntryType> {
        EntryType::KNOWN
            .iter()
            .find(|entry_type| entry_type.as_str().eq_ignore_ascii_case(name))
            .copied()
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bibliographic entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Lower-cased field names in first-seen order; a repeated field keeps the last value.
    pub fields: IndexMap<String, String>,
    /// Where the entry starts in its source file.
    #[serde(skip)]
    pub position: Position,
}

impl CitationRecord {
    pub fn new(key: impl Into<String>, entry_type: EntryType, line: u32) -> CitationRecord {
        CitationRecord {
            key: key.into(),
            entry_type,
            fields: IndexMap::new(),
            position: Position { line, character: 0 },
        }
    }

    /// Stores a field under its lower-cased name.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_lowercase(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }

    pub fn author(&self) -> Option<&str> {
        self.field("author")
    }

    pub fn journal(&self) -> Option<&str> {
        self.field("journal")
    }

    pub fn publisher(&self) -> Option<&str> {
        self.field("publisher")
    }

    /// Every field as `name: value`, joined by `separator`.
    pub fn documentation(&self, separator: &str) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// An `@type{` block with an empty key.
    MissingKey,
    /// A CSL item without an `id`.
    MissingId,
    /// The whole document could not be decoded.
    Malformed(String),
}

/// A problem found while parsing that did not stop the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// Zero-based line of the offending entry.
    pub line: u32,
    pub kind: WarningKind,
    /// A short, single-line rendition of the offending text.
    pub excerpt: String,
}

impl ParseWarning {
    /// Renders the warning for a log line, naming the file it came from.
    pub fn describe(&self, path: &Path) -> String {
        let line = self.line + 1;
        match &self.kind {
            WarningKind::MissingKey => format!(
                "entry at {}:{line} has no cite key: {}",
                path.display(),
                self.excerpt
            ),
            WarningKind::MissingId => format!(
                "CSL item at {}:{line} has no id: {}",
                path.display(),
                self.excerpt
            ),
            WarningKind::Malformed(reason) => {
                format!("could not read {}: {reason}", path.display())
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    pub records: Vec<CitationRecord>,
    pub warnings: Vec<ParseWarning>,
}

/// Parses BibTeX-style text. Records come back in document order.
pub fn parse(text: &str) -> ParseOutput {
    scanner::scan(text)
}

/// Records parsed from one file, with warnings already rendered against its path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedSource {
    pub records: Vec<CitationRecord>,
    pub warnings: Vec<String>,
}

/// Parses the contents of `path`, choosing the reader by file extension.
pub fn parse_source(path: &Path, text: &str) -> ParsedSource {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let output = if is_json {
        csl::parse(text)
    } else {
        scanner::scan(text)
    };

    ParsedSource {
        records: output.records,
        warnings: output
            .warnings
            .iter()
            .map(|warning| warning.describe(path))
            .collect(),
    }
}

/// Reads and parses a bibliography file from disk.
pub fn read_source(path: &Path) -> Result<ParsedSource, BibError> {
    let text = std::fs::read_to_string(path).map_err(|source| BibError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_source(path, &text))
}
