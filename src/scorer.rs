//! Scoring of candidate matches.
//!
//! Every mode walks the shared forms in lexicographic order (the order the
//! matcher hands them over in) and combines the two sides' weights with
//! commutative operations only, so scores are bit-for-bit reproducible and
//! identical whichever text is passed as A.

use crate::frequency::FrequencyTable;
use crate::models::{
    CandidateMatch, DistanceBasis, MatchParams, ScoredMatch, ScoringMode, SharedForm,
    SharedToken, WeightCombination,
};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::debug;

/// Frequency tables and parameters for one scoring run.
///
/// Under reference-corpus scope both tables are the same reference table.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub freq_a: &'a FrequencyTable,
    pub freq_b: &'a FrequencyTable,
    pub params: &'a MatchParams,
}

/// Combine the two per-side weights of one shared form.
#[inline]
pub fn combine_weights(a: f64, b: f64, rule: WeightCombination) -> f64 {
    match rule {
        WeightCombination::HarmonicMean => {
            let sum = a + b;
            if sum > 0.0 {
                2.0 * a * b / sum
            } else {
                0.0
            }
        }
        WeightCombination::Mean => (a + b) / 2.0,
        WeightCombination::Sum => a + b,
    }
}

/// End-to-end span of a set of positions: max - min + 1 (0 when empty).
pub fn position_span<'a, I>(positions: I) -> u32
where
    I: IntoIterator<Item = &'a u32>,
{
    let mut bounds: Option<(u32, u32)> = None;
    for &p in positions {
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(p), hi.max(p)),
            None => (p, p),
        });
    }
    bounds.map(|(lo, hi)| hi - lo + 1).unwrap_or(0)
}

/// Score one candidate under the configured mode.
///
/// Returns `None` only in tesserae mode, when a side has no measurable
/// distance, when the summed distance exceeds `max_distance`, or when the
/// inverse frequency sum is zero (an empty frequency scope).
pub fn score_candidate(candidate: &CandidateMatch, ctx: &ScoringContext) -> Option<ScoredMatch> {
    match ctx.params.scoring_mode {
        ScoringMode::Frequency => Some(score_by_rarity(candidate, ctx, false)),
        ScoringMode::Distance => Some(score_by_rarity(candidate, ctx, true)),
        ScoringMode::Tesserae => score_tesserae(candidate, ctx),
    }
}

fn score_by_rarity(candidate: &CandidateMatch, ctx: &ScoringContext, by_distance: bool) -> ScoredMatch {
    let floor = ctx.params.rarity_floor;
    let rule = ctx.params.weight_combination;

    let mut rarity_sum = 0.0;
    let mut shared_tokens = Vec::with_capacity(candidate.shared.len());

    for shared in &candidate.shared {
        let weight_a = ctx.freq_a.rarity_weight(&shared.form, floor);
        let weight_b = ctx.freq_b.rarity_weight(&shared.form, floor);
        let contribution = combine_weights(weight_a, weight_b, rule);
        rarity_sum += contribution;
        shared_tokens.push(breakdown(shared, weight_a, weight_b, contribution));
    }

    if !by_distance {
        return ScoredMatch {
            unit_a: candidate.unit_a,
            unit_b: candidate.unit_b,
            score: rarity_sum,
            distance_a: 0,
            distance_b: 0,
            shared_tokens,
        };
    }

    let span_a = position_span(candidate.shared.iter().flat_map(|s| &s.positions_a));
    let span_b = position_span(candidate.shared.iter().flat_map(|s| &s.positions_b));
    let mean_span = (span_a + span_b) as f64 / 2.0;

    ScoredMatch {
        unit_a: candidate.unit_a,
        unit_b: candidate.unit_b,
        score: if mean_span > 0.0 { rarity_sum / mean_span } else { 0.0 },
        distance_a: span_a,
        distance_b: span_b,
        shared_tokens,
    }
}

fn score_tesserae(candidate: &CandidateMatch, ctx: &ScoringContext) -> Option<ScoredMatch> {
    let params = ctx.params;
    let floor = params.rarity_floor;

    let mut inverse_sum = 0.0;
    let mut shared_tokens = Vec::with_capacity(candidate.shared.len());
    let mut matched_a: Vec<(u32, f64)> = Vec::new();
    let mut matched_b: Vec<(u32, f64)> = Vec::new();

    for shared in &candidate.shared {
        let inverse_a = ctx.freq_a.inverse_frequency(&shared.form, floor);
        let inverse_b = ctx.freq_b.inverse_frequency(&shared.form, floor);

        // Every matched position contributes its word's inverse frequency
        let contribution = inverse_a * shared.positions_a.len() as f64
            + inverse_b * shared.positions_b.len() as f64;
        inverse_sum += contribution;

        matched_a.extend(shared.positions_a.iter().map(|&p| (p, inverse_a)));
        matched_b.extend(shared.positions_b.iter().map(|&p| (p, inverse_b)));
        shared_tokens.push(breakdown(shared, inverse_a, inverse_b, contribution));
    }

    let distinct_forms = candidate.shared.len();
    let distance_a = tesserae_distance(&mut matched_a, distinct_forms, params.distance_basis);
    let distance_b = tesserae_distance(&mut matched_b, distinct_forms, params.distance_basis);

    if distance_a == 0 || distance_b == 0 {
        // Fewer than two matching words on one side
        return None;
    }
    let distance = distance_a + distance_b;
    if let Some(max) = params.max_distance {
        if distance as usize > max {
            return None;
        }
    }
    if inverse_sum <= 0.0 {
        return None;
    }

    Some(ScoredMatch {
        unit_a: candidate.unit_a,
        unit_b: candidate.unit_b,
        score: inverse_sum.ln() - (distance as f64).ln(),
        distance_a,
        distance_b,
        shared_tokens,
    })
}

/// Distance within one unit. Inclusive of both words: adjacent words are 2
/// apart, one intervening word makes 3. Zero means "not measurable".
///
/// `matched` holds (position, inverse frequency) for every matched position.
pub fn tesserae_distance(matched: &mut [(u32, f64)], distinct_forms: usize, basis: DistanceBasis) -> u32 {
    if distinct_forms < 2 || matched.len() < 2 {
        return 0;
    }
    if matched.len() == 2 {
        return trivial_distance(matched[0].0, matched[1].0);
    }

    match basis {
        DistanceBasis::Span => {
            let span = position_span(matched.iter().map(|(p, _)| p));
            if span > 1 {
                span
            } else {
                0
            }
        }
        DistanceBasis::Frequency => {
            // Rarest first; equal rarity keeps text order
            matched.sort_by_key(|&(p, _)| p);
            matched.sort_by(|x, y| y.1.total_cmp(&x.1));
            let first = matched[0].0;
            matched
                .iter()
                .map(|&(p, _)| p)
                .find(|&p| p != first)
                .map(|end| end.abs_diff(first) + 1)
                .unwrap_or(0)
        }
    }
}

#[inline]
fn trivial_distance(p0: u32, p1: u32) -> u32 {
    if p0 == p1 {
        0
    } else {
        p0.abs_diff(p1) + 1
    }
}

fn breakdown(shared: &SharedForm, weight_a: f64, weight_b: f64, contribution: f64) -> SharedToken {
    SharedToken {
        form: shared.form.clone(),
        weight_a,
        weight_b,
        pos_a: shared.positions_a.first().copied().unwrap_or(0),
        pos_b: shared.positions_b.first().copied().unwrap_or(0),
        contribution,
    }
}

/// Score all candidates in parallel, keeping candidate order, then apply
/// `min_score`.
#[tracing::instrument(skip_all, fields(candidates = candidates.len()))]
pub fn score_candidates(
    candidates: &[CandidateMatch],
    ctx: &ScoringContext,
    progress: Option<&ProgressBar>,
) -> Vec<ScoredMatch> {
    let scored: Vec<ScoredMatch> = candidates
        .par_iter()
        .filter_map(|candidate| {
            let result = score_candidate(candidate, ctx);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .collect();

    let scored_count = scored.len();
    let kept: Vec<ScoredMatch> = match ctx.params.min_score {
        Some(min) => scored.into_iter().filter(|m| m.score >= min).collect(),
        None => scored,
    };

    debug!(
        scored = scored_count,
        kept = kept.len(),
        dropped_by_mode = candidates.len() - scored_count,
        "scored candidates"
    );

    kept
}
