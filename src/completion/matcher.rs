use itertools::Itertools;
use nucleo_matcher::{
    pattern::{CaseMatching, Normalization, Pattern},
    Matcher, Utf32Str,
};

/// Orders `items` by how well `haystack(item)` fuzzy-matches `query`, best first.
///
/// Items that do not match are dropped. An empty query returns `items` as given.
pub fn rank<T>(query: &str, items: Vec<T>, haystack: impl Fn(&T) -> String) -> Vec<T> {
    if query.is_empty() {
        return items;
    }

    let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
    let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
    let mut buf = Vec::new();

    items
        .into_iter()
        .filter_map(|item| {
            let text = haystack(&item);
            let score = pattern.score(Utf32Str::new(&text, &mut buf), &mut matcher)?;
            Some((score, item))
        })
        // stable, so equal scores keep index order
        .sorted_by(|(a, _), (b, _)| Ord::cmp(b, a))
        .map(|(_score, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words() -> Vec<&'static str> {
        vec!["roe2019 Collected Works", "doe2020 A Study", "poe1845 The Raven"]
    }

    #[test]
    fn test_empty_query_keeps_order() {
        assert_eq!(rank("", words(), |w| w.to_string()), words());
    }

    #[test]
    fn test_best_match_first_and_misses_dropped() {
        let ranked = rank("raven", words(), |w| w.to_string());
        assert_eq!(ranked, vec!["poe1845 The Raven"]);

        let ranked = rank("doe", words(), |w| w.to_string());
        assert_eq!(ranked.first(), Some(&"doe2020 A Study"));
    }
}
