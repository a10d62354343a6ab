use std::path::Path;

use itertools::Itertools;

use crate::{bib::CitationRecord, index::BibliographyIndex};

/// Keys defined more than once across every indexed file, sorted.
pub fn duplicate_keys(index: &BibliographyIndex) -> Vec<String> {
    index.duplicate_keys()
}

/// Every definition of a duplicated key, grouped by key.
pub fn duplicate_definitions(index: &BibliographyIndex) -> Vec<(&Path, &CitationRecord)> {
    let duplicates = duplicate_keys(index);

    index
        .select_records(None)
        .into_iter()
        .filter(|(_, record)| duplicates.contains(&record.key))
        .sorted_by(|(_, a), (_, b)| a.key.cmp(&b.key))
        .collect()
}

/// `Duplicate key(s): a, b`
pub fn format_duplicate_keys(keys: &[String]) -> String {
    format!("Duplicate key(s): {}", keys.join(", "))
}

/// The user-facing message for the current index, if any key is duplicated.
pub fn duplicate_keys_message(index: &BibliographyIndex) -> Option<String> {
    let keys = duplicate_keys(index);
    (!keys.is_empty()).then(|| format_duplicate_keys(&keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bib::EntryType;

    fn record(key: &str, line: u32) -> CitationRecord {
        CitationRecord::new(key, EntryType::Misc, line)
    }

    #[test]
    fn test_duplicates_over_a_b_a() {
        let mut index = BibliographyIndex::new();
        index.set_records(
            Path::new("/refs.bib"),
            vec![record("a", 0), record("b", 1), record("a", 2)],
        );

        assert_eq!(duplicate_keys(&index), vec!["a".to_string()]);
        assert_eq!(
            duplicate_keys_message(&index).as_deref(),
            Some("Duplicate key(s): a")
        );

        let lines: Vec<_> = duplicate_definitions(&index)
            .iter()
            .map(|(_, record)| record.position.line)
            .collect();
        assert_eq!(lines, vec![0, 2]);
    }

    #[test]
    fn test_no_duplicates_no_message() {
        let mut index = BibliographyIndex::new();
        index.set_records(Path::new("/refs.bib"), vec![record("a", 0)]);

        assert!(duplicate_keys_message(&index).is_none());
        assert!(duplicate_definitions(&index).is_empty());
    }

    #[test]
    fn test_message_lists_keys_in_order() {
        let keys = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(format_duplicate_keys(&keys), "Duplicate key(s): alpha, beta");
    }
}
