//! Candidate discovery by inverted-index intersection.
//!
//! Instead of comparing every unit of A with every unit of B, only the
//! forms present in both indexes are visited. For each shared form the
//! per-unit posting lists of both sides are crossed, and the form is
//! recorded as evidence for every resulting unit pair. Pairs with at least
//! `min_shared` distinct forms become candidates.
//!
//! Shared forms are split into chunks processed on the rayon pool; each
//! chunk fills its own evidence map and the maps are merged afterwards, so
//! no locking is needed. A form lives in exactly one chunk, which keeps
//! every (unit pair, form) entry unique.

use crate::index::{InvertedIndex, UnitPostings};
use crate::models::{CandidateMatch, SharedForm};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::debug;

type Evidence = HashMap<(u32, u32), Vec<SharedForm>>;

/// Find unit pairs (one from each text) sharing at least `min_shared`
/// distinct indexed forms.
///
/// Candidates are returned sorted by (unit_a, unit_b) and each candidate's
/// shared forms are sorted by form.
#[tracing::instrument(skip_all, fields(min_shared = min_shared))]
pub fn find_candidates(
    index_a: &InvertedIndex,
    index_b: &InvertedIndex,
    min_shared: usize,
) -> Vec<CandidateMatch> {
    let shared = index_a.shared_forms(index_b);
    debug!(shared_forms = shared.len(), "intersected index keys");

    let evidence = accumulate(&shared, |form, evidence| {
        let postings_b = index_b.unit_postings(form);
        for pa in index_a.unit_postings(form) {
            for pb in postings_b {
                record(evidence, form, pa, pb);
            }
        }
    });

    collect_candidates(evidence, min_shared)
}

/// Find pairs of distinct units within one text sharing at least
/// `min_shared` distinct forms. Every pair has `unit_a < unit_b`.
#[tracing::instrument(skip_all, fields(min_shared = min_shared))]
pub fn find_self_candidates(index: &InvertedIndex, min_shared: usize) -> Vec<CandidateMatch> {
    let mut forms: Vec<&str> = index.forms().collect();
    forms.sort_unstable();
    debug!(forms = forms.len(), "self matching over indexed forms");

    let evidence = accumulate(&forms, |form, evidence| {
        let postings = index.unit_postings(form);
        for (i, pa) in postings.iter().enumerate() {
            for pb in &postings[i + 1..] {
                record(evidence, form, pa, pb);
            }
        }
    });

    collect_candidates(evidence, min_shared)
}

/// Run `visit` over every form on the rayon pool and merge the per-chunk
/// evidence maps.
fn accumulate<F>(forms: &[&str], visit: F) -> Evidence
where
    F: Fn(&str, &mut Evidence) + Sync,
{
    if forms.is_empty() {
        return Evidence::new();
    }

    let chunk_size = chunk_size(forms.len());

    forms
        .par_chunks(chunk_size)
        .map(|chunk| {
            let mut evidence = Evidence::new();
            for form in chunk {
                visit(*form, &mut evidence);
            }
            evidence
        })
        .reduce(Evidence::new, merge_evidence)
}

fn chunk_size(form_count: usize) -> usize {
    let target_chunks = rayon::current_num_threads().max(1) * 4;
    form_count.div_ceil(target_chunks).max(1)
}

#[inline]
fn record(evidence: &mut Evidence, form: &str, pa: &UnitPostings, pb: &UnitPostings) {
    evidence
        .entry((pa.unit, pb.unit))
        .or_default()
        .push(SharedForm {
            form: form.to_string(),
            positions_a: pa.positions.clone(),
            positions_b: pb.positions.clone(),
        });
}

/// Fold the smaller map into the larger one.
fn merge_evidence(a: Evidence, b: Evidence) -> Evidence {
    let (mut into, from) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for (key, forms) in from {
        into.entry(key).or_default().extend(forms);
    }
    into
}

fn collect_candidates(evidence: Evidence, min_shared: usize) -> Vec<CandidateMatch> {
    let pairs_seen = evidence.len();

    let mut candidates: Vec<CandidateMatch> = evidence
        .into_iter()
        .filter(|(_, forms)| forms.len() >= min_shared)
        .map(|((unit_a, unit_b), mut shared)| {
            shared.sort_unstable_by(|x, y| x.form.cmp(&y.form));
            CandidateMatch {
                unit_a,
                unit_b,
                shared,
            }
        })
        .collect();

    candidates.sort_unstable_by_key(|c| (c.unit_a, c.unit_b));

    debug!(
        pairs_seen,
        candidates = candidates.len(),
        "filtered unit pairs by shared form count"
    );

    candidates
}

/// Fraction of all unit pairs that never needed to be looked at.
pub fn filtering_rate(units_a: usize, units_b: usize, candidates: usize) -> f64 {
    let total_pairs = units_a as f64 * units_b as f64;
    if total_pairs == 0.0 {
        return 0.0;
    }
    1.0 - candidates as f64 / total_pairs
}
