//! Matched-term reconstruction from FTS `offsets()` output.

use std::collections::BTreeSet;

/// One match location: four integers of an `offsets()` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEntry {
    pub column: usize,
    pub term: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
}

impl OffsetEntry {
    fn end(&self) -> Option<usize> {
        self.byte_offset.checked_add(self.byte_length)
    }

    /// True when `next` is the following query term, one separator byte later.
    fn is_followed_by(&self, next: &OffsetEntry) -> bool {
        self.column == next.column
            && self.term.checked_add(1) == Some(next.term)
            && self.end().and_then(|end| end.checked_add(1)) == Some(next.byte_offset)
    }
}

/// Parse whitespace-separated integers in groups of four.
///
/// Parsing stops at the first non-numeric value; an incomplete trailing group
/// is ignored.
pub fn parse_offsets(payload: &str) -> Vec<OffsetEntry> {
    let values: Vec<usize> = payload
        .split_whitespace()
        .map_while(|piece| piece.parse::<usize>().ok())
        .collect();

    values
        .chunks_exact(4)
        .map(|chunk| OffsetEntry {
            column: chunk[0],
            term: chunk[1],
            byte_offset: chunk[2],
            byte_length: chunk[3],
        })
        .collect()
}

/// Recover the matched terms of one document.
///
/// `columns` holds the document's field texts in table column order. Adjacent
/// matches of consecutive query terms are joined into one phrase. The result
/// is lower-cased, de-duplicated and sorted in reverse order.
pub fn matched_terms(offsets: &str, columns: &[&str]) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut previous: Option<OffsetEntry> = None;

    for entry in parse_offsets(offsets) {
        let fragment = columns.get(entry.column).and_then(|text| {
            let end = entry.end()?;
            text.get(entry.byte_offset..end)
        });
        let Some(fragment) = fragment else {
            previous = None;
            continue;
        };
        let fragment = fragment.to_lowercase();

        let continues = previous.is_some_and(|p| p.is_followed_by(&entry));
        match terms.last_mut() {
            Some(last) if continues => {
                last.push(' ');
                last.push_str(&fragment);
            }
            _ => terms.push(fragment),
        }
        previous = Some(entry);
    }

    let unique: BTreeSet<String> = terms.into_iter().collect();
    unique.into_iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offsets() {
        let entries = parse_offsets("0 1 15 6 2 0 3 4 9");
        assert_eq!(
            entries,
            vec![
                OffsetEntry {
                    column: 0,
                    term: 1,
                    byte_offset: 15,
                    byte_length: 6
                },
                OffsetEntry {
                    column: 2,
                    term: 0,
                    byte_offset: 3,
                    byte_length: 4
                },
            ]
        );
        assert!(parse_offsets("").is_empty());
        assert!(parse_offsets("0 1 x 4").is_empty());
    }

    #[test]
    fn test_single_terms_reverse_sorted() {
        let text = "If wishes were fishes, we'd have a fish fry.";
        let terms = matched_terms("0 0 15 6 0 0 35 4", &[text]);
        assert_eq!(terms, vec!["fishes", "fish"]);
    }

    #[test]
    fn test_phrase_is_joined() {
        let text = "The Quick brown fox";
        let terms = matched_terms("0 0 4 5 0 1 10 5", &[text]);
        assert_eq!(terms, vec!["quick brown"]);
    }

    #[test]
    fn test_not_joined_across_columns_or_gaps() {
        let columns = ["quick", "xxxxx brown"];
        assert_eq!(
            matched_terms("0 0 0 5 1 1 6 5", &columns),
            vec!["quick", "brown"]
        );
        let text = "quick  brown";
        assert_eq!(
            matched_terms("0 0 0 5 0 1 7 5", &[text]),
            vec!["quick", "brown"]
        );
    }

    #[test]
    fn test_duplicates_removed() {
        let title = "Fish";
        let body = "one fish two fish";
        let terms = matched_terms("0 0 0 4 1 0 4 4 1 0 13 4", &[title, body]);
        assert_eq!(terms, vec!["fish"]);
    }

    #[test]
    fn test_out_of_range_entries_skipped() {
        let terms = matched_terms("0 0 2 40 3 0 0 1 0 0 0 2", &["hello"]);
        assert_eq!(terms, vec!["he"]);
    }
}
