//! Token frequency tables and rarity weights.
//!
//! A table tallies every token occurrence in its scope (one text, or a
//! reference corpus assembled from several texts). Stopwords are counted
//! too: they are part of the scope's token total even though they never
//! contribute index entries.

use crate::models::{Text, Unit};
use std::collections::HashMap;

/// Occurrence counts of normalized forms within one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    counts: HashMap<String, u64>,
    total_tokens: u64,
}

impl FrequencyTable {
    /// Tally every token of every unit.
    pub fn build<'a, I>(units: I) -> Self
    where
        I: IntoIterator<Item = &'a Unit>,
    {
        let mut table = FrequencyTable::default();
        for unit in units {
            for form in unit.forms() {
                table.add(form, 1);
            }
        }
        table
    }

    /// Table for a single text (per-text scope).
    pub fn from_text(text: &Text) -> Self {
        Self::build(text.units())
    }

    /// Reference corpus table over several texts.
    pub fn from_texts<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a Text>,
    {
        let mut table = FrequencyTable::default();
        for text in texts {
            table.merge(&Self::from_text(text));
        }
        table
    }

    /// Build from precomputed counts, e.g. corpus statistics from elsewhere.
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut table = FrequencyTable::default();
        for (form, count) in counts {
            let form: String = form.into();
            table.add(&form, count);
        }
        table
    }

    fn add(&mut self, form: &str, count: u64) {
        if count == 0 {
            return;
        }
        match self.counts.get_mut(form) {
            Some(existing) => *existing += count,
            None => {
                self.counts.insert(form.to_string(), count);
            }
        }
        self.total_tokens += count;
    }

    /// Fold another table's counts into this one.
    pub fn merge(&mut self, other: &FrequencyTable) {
        for (form, &count) in &other.counts {
            self.add(form, count);
        }
    }

    /// Occurrence count; 0 for forms never seen in this scope.
    pub fn count(&self, form: &str) -> u64 {
        self.counts.get(form).copied().unwrap_or(0)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn distinct_forms(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }

    /// `ln(total / max(count, floor))`, clamped at zero.
    ///
    /// Unseen forms fall back to `floor`. The clamp keeps forms at least as
    /// frequent as the whole scope (and floors above the scope size) from
    /// producing negative weights.
    pub fn rarity_weight(&self, form: &str, floor: f64) -> f64 {
        if self.total_tokens == 0 {
            return 0.0;
        }
        let denominator = (self.count(form) as f64).max(floor);
        (self.total_tokens as f64 / denominator).ln().max(0.0)
    }

    /// `total / max(count, floor)`: the inverse relative frequency.
    pub fn inverse_frequency(&self, form: &str, floor: f64) -> f64 {
        if self.total_tokens == 0 {
            return 0.0;
        }
        self.total_tokens as f64 / (self.count(form) as f64).max(floor)
    }

    /// The `n` most frequent forms, ties broken by form, suitable as a stoplist.
    pub fn most_frequent(&self, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(&String, &u64)> = self.counts.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(n)
            .map(|(form, &count)| (form.clone(), count))
            .collect()
    }

    /// Forms with their counts, sorted by form.
    pub fn sorted_counts(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> =
            self.counts.iter().map(|(f, &c)| (f.as_str(), c)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_text() -> Text {
        Text::from_forms(
            "t",
            &[
                ("1", &["arma", "virum", "cano", "arma"]),
                ("2", &["troiae", "qui", "primus", "ab", "oris"]),
                ("3", &["arma", "qui"]),
            ],
        )
    }

    #[test]
    fn test_build_counts_all_tokens() {
        let table = FrequencyTable::from_text(&create_test_text());
        assert_eq!(table.total_tokens(), 11);
        assert_eq!(table.count("arma"), 3);
        assert_eq!(table.count("qui"), 2);
        assert_eq!(table.count("cano"), 1);
        assert_eq!(table.count("absent"), 0);
        assert_eq!(table.distinct_forms(), 8);
    }

    #[test]
    fn test_rarity_weight_decreases_with_frequency() {
        let table = FrequencyTable::from_text(&create_test_text());
        let rare = table.rarity_weight("cano", 1.0);
        let common = table.rarity_weight("arma", 1.0);
        assert!(rare > common);
        assert!((rare - (11.0f64).ln()).abs() < 1e-12);
        assert!((common - (11.0f64 / 3.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_rarity_weight_unseen_form_uses_floor() {
        let table = FrequencyTable::from_text(&create_test_text());
        assert!((table.rarity_weight("absent", 1.0) - (11.0f64).ln()).abs() < 1e-12);
        assert!((table.rarity_weight("absent", 2.0) - (5.5f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_rarity_weight_never_negative() {
        let table = FrequencyTable::from_counts([("a", 4u64)]);
        assert_eq!(table.rarity_weight("a", 1.0), 0.0);
        assert_eq!(table.rarity_weight("b", 100.0), 0.0);
    }

    #[test]
    fn test_empty_table_weights_are_zero() {
        let table = FrequencyTable::default();
        assert!(table.is_empty());
        assert_eq!(table.rarity_weight("x", 1.0), 0.0);
        assert_eq!(table.inverse_frequency("x", 1.0), 0.0);
    }

    #[test]
    fn test_merge_sums_counts_and_totals() {
        let mut a = FrequencyTable::from_counts([("x", 2u64), ("y", 1)]);
        let b = FrequencyTable::from_counts([("x", 1u64), ("z", 5)]);
        a.merge(&b);
        assert_eq!(a.count("x"), 3);
        assert_eq!(a.count("z"), 5);
        assert_eq!(a.total_tokens(), 9);
    }

    #[test]
    fn test_from_texts_matches_merge() {
        let t1 = Text::from_forms("a", &[("1", &["x", "y"])]);
        let t2 = Text::from_forms("b", &[("1", &["x", "z", "z"])]);
        let table = FrequencyTable::from_texts([&t1, &t2]);
        assert_eq!(table.count("x"), 2);
        assert_eq!(table.count("z"), 2);
        assert_eq!(table.total_tokens(), 5);
    }

    #[test]
    fn test_most_frequent_breaks_ties_by_form() {
        let table = FrequencyTable::from_counts([("et", 5u64), ("in", 5), ("non", 3), ("rex", 1)]);
        let top = table.most_frequent(3);
        assert_eq!(
            top,
            vec![
                ("et".to_string(), 5),
                ("in".to_string(), 5),
                ("non".to_string(), 3)
            ]
        );
        assert_eq!(table.most_frequent(10).len(), 4);
    }

    #[test]
    fn test_inverse_frequency() {
        let table = FrequencyTable::from_text(&create_test_text());
        assert!((table.inverse_frequency("arma", 1.0) - 11.0 / 3.0).abs() < 1e-12);
    }
}
