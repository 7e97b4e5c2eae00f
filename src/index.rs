//! Inverted index from normalized form to occurrence locations.
//!
//! Stopwords are dropped while the index is built, so they can never be
//! looked up and can never contribute a shared form to the matcher.

use crate::models::Text;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// One occurrence of a form: unit position within the text and token
/// position within the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Occurrence {
    pub unit: u32,
    pub position: u32,
}

/// All positions of one form inside one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPostings {
    pub unit: u32,
    pub positions: Vec<u32>, // Ascending, never empty
}

/// Form -> occurrences, grouped per unit. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<UnitPostings>>,
    indexed_units: usize,
    entry_count: usize,
}

impl InvertedIndex {
    /// Index every non-stopword token of `text` in a single pass.
    #[tracing::instrument(skip_all, fields(document = %text.document, units = text.unit_count()))]
    pub fn build(text: &Text, stopwords: &BTreeSet<String>) -> Self {
        let mut postings: HashMap<String, Vec<UnitPostings>> = HashMap::new();
        let mut indexed_units = 0;
        let mut entry_count = 0;

        for unit in text.units() {
            let mut unit_has_entries = false;

            for (position, form) in unit.forms().enumerate() {
                if stopwords.contains(form) {
                    continue;
                }
                let position = position as u32;
                let lists = postings.entry(form.to_string()).or_default();

                // Units are visited in order, so the current unit is always last
                match lists.last_mut() {
                    Some(last) if last.unit == unit.index() => last.positions.push(position),
                    _ => lists.push(UnitPostings {
                        unit: unit.index(),
                        positions: vec![position],
                    }),
                }
                entry_count += 1;
                unit_has_entries = true;
            }

            if unit_has_entries {
                indexed_units += 1;
            }
        }

        debug!(
            forms = postings.len(),
            entries = entry_count,
            indexed_units,
            "built inverted index"
        );

        InvertedIndex {
            postings,
            indexed_units,
            entry_count,
        }
    }

    /// Every (unit, position) occurrence of `form`, in text order.
    /// Empty for stopwords and for forms absent from the text.
    pub fn occurrences<'a>(&'a self, form: &str) -> impl Iterator<Item = Occurrence> + 'a {
        self.unit_postings(form).iter().flat_map(|p| {
            p.positions.iter().map(move |&position| Occurrence {
                unit: p.unit,
                position,
            })
        })
    }

    /// Occurrences of `form` grouped per unit.
    pub fn unit_postings(&self, form: &str) -> &[UnitPostings] {
        self.postings.get(form).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, form: &str) -> bool {
        self.postings.contains_key(form)
    }

    /// Indexed forms in arbitrary order.
    pub fn forms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    /// Forms indexed in both `self` and `other`, sorted lexicographically.
    pub fn shared_forms<'a>(&'a self, other: &InvertedIndex) -> Vec<&'a str> {
        let mut shared: Vec<&str> = self.forms().filter(|f| other.contains(f)).collect();
        shared.sort_unstable();
        shared
    }

    pub fn distinct_forms(&self) -> usize {
        self.postings.len()
    }

    /// Units with at least one non-stopword token.
    pub fn indexed_units(&self) -> usize {
        self.indexed_units
    }

    /// Total number of (unit, position) entries.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopwords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn create_test_text() -> Text {
        Text::from_forms(
            "t",
            &[
                ("1", &["the", "swift", "fox", "the", "fox"]),
                ("2", &["the", "a"]),
                ("3", &["fox", "runs"]),
            ],
        )
    }

    #[test]
    fn test_occurrences_in_text_order() {
        let index = InvertedIndex::build(&create_test_text(), &stopwords(&["the", "a"]));
        let occurrences: Vec<Occurrence> = index.occurrences("fox").collect();
        assert_eq!(
            occurrences,
            vec![
                Occurrence { unit: 0, position: 2 },
                Occurrence { unit: 0, position: 4 },
                Occurrence { unit: 2, position: 0 },
            ]
        );
    }

    #[test]
    fn test_postings_grouped_per_unit() {
        let index = InvertedIndex::build(&create_test_text(), &stopwords(&["the", "a"]));
        let postings = index.unit_postings("fox");
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].positions, vec![2, 4]);
        assert_eq!(postings[1].unit, 2);
    }

    #[test]
    fn test_stopwords_never_indexed() {
        let index = InvertedIndex::build(&create_test_text(), &stopwords(&["the", "a"]));
        assert!(!index.contains("the"));
        assert!(!index.contains("a"));
        assert_eq!(index.occurrences("the").count(), 0);
        assert_eq!(index.distinct_forms(), 3);
    }

    #[test]
    fn test_stopword_only_unit_not_counted() {
        let index = InvertedIndex::build(&create_test_text(), &stopwords(&["the", "a"]));
        assert_eq!(index.indexed_units(), 2);
        assert_eq!(index.entry_count(), 5);
    }

    #[test]
    fn test_missing_form_is_empty() {
        let index = InvertedIndex::build(&create_test_text(), &BTreeSet::new());
        assert!(index.unit_postings("wolf").is_empty());
        assert_eq!(index.occurrences("wolf").count(), 0);
    }

    #[test]
    fn test_empty_text() {
        let index = InvertedIndex::build(&Text::new("empty"), &BTreeSet::new());
        assert_eq!(index.distinct_forms(), 0);
        assert_eq!(index.indexed_units(), 0);
    }

    #[test]
    fn test_shared_forms_sorted() {
        let a = Text::from_forms("a", &[("1", &["zeta", "alpha", "mu", "only_a"])]);
        let b = Text::from_forms("b", &[("1", &["mu", "zeta", "alpha", "only_b"])]);
        let index_a = InvertedIndex::build(&a, &BTreeSet::new());
        let index_b = InvertedIndex::build(&b, &BTreeSet::new());
        assert_eq!(index_a.shared_forms(&index_b), vec!["alpha", "mu", "zeta"]);
        assert_eq!(index_b.shared_forms(&index_a), vec!["alpha", "mu", "zeta"]);
    }
}
