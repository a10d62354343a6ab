use ropey::Rope;
use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::{document::cite_key_at, index::BibliographyIndex};

/// Location of the bibliography entry cited at `cursor_position`.
pub fn goto_definition(
    index: &BibliographyIndex,
    text: &Rope,
    cursor_position: Position,
) -> Option<Location> {
    let cited = cite_key_at(text, cursor_position)?;
    let (path, record) = index.find_by_key(&cited.key)?;

    Some(Location {
        uri: Url::from_file_path(path).ok()?,
        range: Range {
            start: record.position,
            end: record.position,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bib;
    use crate::test_utils::{create_test_workspace_dir, write_file, SAMPLE_BIB};

    /// Test: Go-to-definition jumps to the line of the entry's `@` marker.
    #[test]
    fn test_goto_definition_points_at_entry() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut index = BibliographyIndex::new();
        index.set_records(&refs, bib::read_source(&refs).unwrap().records);

        let text = Rope::from_str("# Intro\n\nSee [@poe1845].");
        let location = goto_definition(&index, &text, Position::new(2, 8)).unwrap();

        assert_eq!(location.uri, Url::from_file_path(&refs).unwrap());
        assert_eq!(location.range.start, Position::new(11, 0));
    }

    /// Test: Plain text and unknown keys have no definition.
    #[test]
    fn test_goto_definition_misses() {
        let mut index = BibliographyIndex::new();
        index.set_records(
            std::path::Path::new("/proj/refs.bib"),
            bib::parse(SAMPLE_BIB).records,
        );

        let text = Rope::from_str("Plain words and @unknown.");
        assert!(goto_definition(&index, &text, Position::new(0, 2)).is_none());
        assert!(goto_definition(&index, &text, Position::new(0, 18)).is_none());
    }
}
