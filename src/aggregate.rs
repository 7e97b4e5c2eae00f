//! Deduplication, ranking and summarising of scored matches.
//!
//! The ranking is total and deterministic: score descending, then the first
//! unit's position, the second unit's position, and finally the document
//! identifiers (which only matter when several text pairs are merged).

use crate::models::{
    MatchError, MatchRecord, MatchResultSet, MatchSummary, ScoredMatch, Text, UnitRef,
};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Attach citations to a scored match. The unit positions must come from
/// indexes built over `text_a` and `text_b`.
pub fn to_record(
    scored: ScoredMatch,
    text_a: &Text,
    text_b: &Text,
) -> Result<MatchRecord, MatchError> {
    Ok(MatchRecord {
        id: 0,
        unit_a: unit_ref(text_a, scored.unit_a)?,
        unit_b: unit_ref(text_b, scored.unit_b)?,
        score: scored.score,
        shared_tokens: scored.shared_tokens,
    })
}

fn unit_ref(text: &Text, index: u32) -> Result<UnitRef, MatchError> {
    text.unit(index)
        .map(UnitRef::from_unit)
        .ok_or_else(|| MatchError::UnknownUnit {
            document: text.document.clone(),
            index,
        })
}

/// Ranking order of two records.
pub fn ranking_order(a: &MatchRecord, b: &MatchRecord) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.unit_a.index.cmp(&b.unit_a.index))
        .then_with(|| a.unit_b.index.cmp(&b.unit_b.index))
        .then_with(|| a.unit_a.document.cmp(&b.unit_a.document))
        .then_with(|| a.unit_b.document.cmp(&b.unit_b.document))
}

/// Unordered identity of a unit pair.
fn pair_key(record: &MatchRecord) -> (&UnitRef, &UnitRef) {
    let a = &record.unit_a;
    let b = &record.unit_b;
    if (&a.document, a.index) <= (&b.document, b.index) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Rank records, drop repeated unit pairs (keeping the best-ranked one),
/// truncate to `top_n` and number the survivors.
#[tracing::instrument(skip_all, fields(records = records.len()))]
pub fn aggregate(mut records: Vec<MatchRecord>, top_n: Option<usize>) -> MatchResultSet {
    records.sort_by(ranking_order);

    let before = records.len();
    let mut seen: HashSet<(String, u32, String, u32)> = HashSet::with_capacity(records.len());
    records.retain(|record| {
        let (x, y) = pair_key(record);
        seen.insert((x.document.clone(), x.index, y.document.clone(), y.index))
    });
    let duplicates = before - records.len();

    if let Some(n) = top_n {
        records.truncate(n);
    }

    for (rank, record) in records.iter_mut().enumerate() {
        record.id = rank as u64;
    }

    debug!(duplicates, kept = records.len(), "aggregated matches");

    MatchResultSet::from_ranked(records)
}

/// Merge several already-aggregated result sets into one ranking.
pub fn merge_result_sets<I>(sets: I, top_n: Option<usize>) -> MatchResultSet
where
    I: IntoIterator<Item = MatchResultSet>,
{
    let records: Vec<MatchRecord> = sets
        .into_iter()
        .flat_map(|set| set.records().to_vec())
        .collect();
    aggregate(records, top_n)
}

/// Counts, coverage and score statistics of a result set for one text pair.
pub fn summarize(matches: &MatchResultSet, text_a: &Text, text_b: &Text) -> MatchSummary {
    let units_a: HashSet<u32> = matches.iter().map(|m| m.unit_a.index).collect();
    let units_b: HashSet<u32> = matches.iter().map(|m| m.unit_b.index).collect();

    let coverage = |matched: usize, text: &Text| {
        if text.unit_count() == 0 {
            0.0
        } else {
            matched as f64 / text.unit_count() as f64
        }
    };

    let scores: Vec<f64> = matches.iter().map(|m| m.score).collect();

    MatchSummary {
        match_count: matches.len(),
        units_a_matched: units_a.len(),
        units_b_matched: units_b.len(),
        coverage_a: coverage(units_a.len(), text_a),
        coverage_b: coverage(units_b.len(), text_b),
        avg_score: if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        },
        max_score: scores.iter().copied().reduce(f64::max).unwrap_or(0.0),
    }
}
