//! pandoc-crossref targets in the open document.
//!
//! A target is an image-style element carrying a `#kind:label` attribute:
//!
//! ```markdown
//! ![Population by year](plot.png){#fig:population width=80%}
//! ```
//!
//! which can be cited as `@fig:population`.

use once_cell::sync::Lazy;
use regex::Regex;
use ropey::Rope;

static TARGET_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"!\[(?<caption>.+?)\]\((?<source>.+?)\)\{[^}]*#(?<kind>fig|tbl|eq|sec|lst):(?<label>\w+)[^}]*\}",
    )
    .expect("Invalid crossref regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossrefTarget {
    /// `fig`, `tbl`, `eq`, `sec` or `lst`.
    pub kind: String,
    pub label: String,
    pub caption: String,
    /// Zero-based line of the element.
    pub line: u32,
}

impl CrossrefTarget {
    /// The text that follows `@` when citing this target.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.kind, self.label)
    }
}

/// Every target in `text`, in document order.
pub fn targets(text: &Rope) -> Vec<CrossrefTarget> {
    text.lines()
        .enumerate()
        .flat_map(|(line, slice)| {
            let line_text = slice.to_string();
            TARGET_REGEX
                .captures_iter(&line_text)
                .filter_map(|captures| {
                    Some(CrossrefTarget {
                        kind: captures.name("kind")?.as_str().to_string(),
                        label: captures.name("label")?.as_str().to_string(),
                        caption: captures.name("caption")?.as_str().to_string(),
                        line: line as u32,
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
