//! Criterion benchmarks for indexing, candidate discovery and scoring.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use intertext_match::compare::compare_texts;
use intertext_match::frequency::FrequencyTable;
use intertext_match::index::InvertedIndex;
use intertext_match::matcher::find_candidates;
use intertext_match::models::{MatchParams, ScoringMode, Text, Token};
use intertext_match::scorer::{score_candidates, ScoringContext};
use std::collections::BTreeSet;

/// Deterministic text where form `w{k}` gets rarer as k grows.
fn generate_text(document: &str, units: usize, unit_size: usize, offset: usize) -> Text {
    let mut text = Text::new(document);
    for u in 0..units {
        let tokens = (0..unit_size)
            .map(|t| {
                let k = (u * 31 + t * 17 + offset) % 997;
                Token::new(format!("w{}", k * k % 1500))
            })
            .collect();
        text.push_unit(format!("{}.{}", document, u), tokens);
    }
    text
}

fn bench_indexing(c: &mut Criterion) {
    let stopwords = BTreeSet::new();
    let mut group = c.benchmark_group("index_build");

    for units in [500, 2000, 8000] {
        let text = generate_text("A", units, 8, 0);
        group.bench_with_input(BenchmarkId::new("units", units), &units, |b, _| {
            b.iter(|| InvertedIndex::build(black_box(&text), &stopwords))
        });
    }

    group.finish();
}

fn bench_candidates(c: &mut Criterion) {
    let stopwords = BTreeSet::new();
    let mut group = c.benchmark_group("find_candidates");

    for units in [500, 2000] {
        let a = generate_text("A", units, 8, 0);
        let b = generate_text("B", units, 8, 7);
        let index_a = InvertedIndex::build(&a, &stopwords);
        let index_b = InvertedIndex::build(&b, &stopwords);

        for min_shared in [2, 3] {
            group.bench_with_input(
                BenchmarkId::new(format!("min_shared_{}", min_shared), units),
                &units,
                |bench, _| {
                    bench.iter(|| find_candidates(black_box(&index_a), black_box(&index_b), min_shared))
                },
            );
        }
    }

    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let stopwords = BTreeSet::new();
    let a = generate_text("A", 2000, 8, 0);
    let b = generate_text("B", 2000, 8, 7);
    let candidates = find_candidates(
        &InvertedIndex::build(&a, &stopwords),
        &InvertedIndex::build(&b, &stopwords),
        2,
    );
    let freq_a = FrequencyTable::from_text(&a);
    let freq_b = FrequencyTable::from_text(&b);

    let mut group = c.benchmark_group("score_candidates");

    for mode in [ScoringMode::Frequency, ScoringMode::Distance, ScoringMode::Tesserae] {
        let params = MatchParams {
            scoring_mode: mode,
            ..Default::default()
        };
        let ctx = ScoringContext {
            freq_a: &freq_a,
            freq_b: &freq_b,
            params: &params,
        };
        group.bench_function(mode.to_string(), |bench| {
            bench.iter(|| score_candidates(black_box(&candidates), &ctx, None))
        });
    }

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let a = generate_text("A", 2000, 8, 0);
    let b = generate_text("B", 2000, 8, 7);
    let params = MatchParams {
        top_n: Some(100),
        ..Default::default()
    };

    c.bench_function("compare_texts_2000_units", |bench| {
        bench.iter(|| compare_texts(black_box(&a), black_box(&b), &params, None, false))
    });
}

criterion_group!(
    benches,
    bench_indexing,
    bench_candidates,
    bench_scoring,
    bench_end_to_end
);
criterion_main!(benches);
