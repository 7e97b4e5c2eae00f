//! Matching run orchestration.
//!
//! A run validates its parameters, prepares each text (frequency table and
//! inverted index), finds candidates, scores them and aggregates the result.
//! Everything a run needs is built inside the run and passed down
//! explicitly; nothing survives between runs.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::info;

use crate::aggregate::{aggregate, summarize, to_record};
use crate::frequency::FrequencyTable;
use crate::index::InvertedIndex;
use crate::matcher::{filtering_rate, find_candidates, find_self_candidates};
use crate::models::*;
use crate::scorer::{score_candidates, ScoringContext};

/// A text together with the per-run structures built from it.
#[derive(Debug)]
pub struct PreparedText<'a> {
    pub text: &'a Text,
    pub frequencies: FrequencyTable,
    pub index: InvertedIndex,
}

impl<'a> PreparedText<'a> {
    /// Build the frequency table and the stopword-filtered index.
    pub fn prepare(text: &'a Text, params: &MatchParams) -> Self {
        PreparedText {
            text,
            frequencies: FrequencyTable::from_text(text),
            index: InvertedIndex::build(text, &params.stopwords),
        }
    }

    pub fn summary(&self) -> TextSummary {
        TextSummary {
            document: self.text.document.clone(),
            unit_count: self.text.unit_count(),
            token_count: self.text.token_count(),
            indexed_forms: self.index.distinct_forms(),
        }
    }
}

/// Fail before any indexing work if the run cannot be honored.
fn check_run(params: &MatchParams, reference: Option<&FrequencyTable>) -> Result<(), MatchError> {
    params.validate()?;
    if params.frequency_scope == FrequencyScope::ReferenceCorpus && reference.is_none() {
        return Err(MatchError::MissingReferenceFrequencies);
    }
    Ok(())
}

/// Matches are identified by (document, unit), so two texts of one run
/// must not share a document id.
fn check_distinct_documents<'a, I>(texts: I) -> Result<(), MatchError>
where
    I: IntoIterator<Item = &'a Text>,
{
    let mut seen = HashSet::new();
    for text in texts {
        if !seen.insert(text.document.as_str()) {
            return Err(MatchError::invalid(
                "document",
                Stage::Configuration,
                format!(
                    "{:?} is used by more than one text; use a self match for one text",
                    text.document
                ),
            ));
        }
    }
    Ok(())
}

/// Pick the tables rarity weights are read from.
fn scoring_tables<'a>(
    a: &'a PreparedText,
    b: &'a PreparedText,
    params: &MatchParams,
    reference: Option<&'a FrequencyTable>,
) -> (&'a FrequencyTable, &'a FrequencyTable) {
    match (params.frequency_scope, reference) {
        (FrequencyScope::ReferenceCorpus, Some(table)) => (table, table),
        _ => (&a.frequencies, &b.frequencies),
    }
}

fn progress_bar(len: usize, show_progress: bool) -> Option<ProgressBar> {
    if !show_progress || len == 0 {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    Some(pb)
}

/// Score candidates between two prepared texts and attach citations.
fn score_pair(
    a: &PreparedText,
    b: &PreparedText,
    candidates: &[CandidateMatch],
    params: &MatchParams,
    reference: Option<&FrequencyTable>,
    show_progress: bool,
) -> Result<Vec<MatchRecord>, MatchError> {
    let (freq_a, freq_b) = scoring_tables(a, b, params, reference);
    let ctx = ScoringContext {
        freq_a,
        freq_b,
        params,
    };

    let progress = progress_bar(candidates.len(), show_progress);
    let scored = score_candidates(candidates, &ctx, progress.as_ref());
    if let Some(pb) = progress {
        pb.finish_with_message("Done");
    }

    scored
        .into_iter()
        .map(|m| to_record(m, a.text, b.text))
        .collect()
}

/// Match two texts and rank the parallels found between them.
#[tracing::instrument(skip_all, fields(text_a = %text_a.document, text_b = %text_b.document))]
pub fn compare_texts(
    text_a: &Text,
    text_b: &Text,
    params: &MatchParams,
    reference: Option<&FrequencyTable>,
    show_progress: bool,
) -> Result<MatchResult, MatchError> {
    check_run(params, reference)?;
    check_distinct_documents([text_a, text_b])?;

    // INDEXED
    let (prepared_a, prepared_b) = rayon::join(
        || PreparedText::prepare(text_a, params),
        || PreparedText::prepare(text_b, params),
    );
    info!(
        units_a = text_a.unit_count(),
        units_b = text_b.unit_count(),
        forms_a = prepared_a.index.distinct_forms(),
        forms_b = prepared_b.index.distinct_forms(),
        "indexed texts"
    );

    // MATCHED
    let candidates = find_candidates(&prepared_a.index, &prepared_b.index, params.min_shared);
    info!(
        candidates = candidates.len(),
        filtered = %format!(
            "{:.1}%",
            100.0 * filtering_rate(text_a.unit_count(), text_b.unit_count(), candidates.len())
        ),
        "found candidate unit pairs"
    );

    // SCORED
    let records = score_pair(
        &prepared_a,
        &prepared_b,
        &candidates,
        params,
        reference,
        show_progress,
    )?;

    // DONE
    let matches = aggregate(records, params.top_n);
    info!(matches = matches.len(), "ranked matches");

    Ok(MatchResult {
        version: env!("CARGO_PKG_VERSION").to_string(),
        parameters: params.clone(),
        text_a: prepared_a.summary(),
        text_b: prepared_b.summary(),
        summary: summarize(&matches, text_a, text_b),
        matches,
    })
}

/// Match a text against itself: every unit with every later unit.
#[tracing::instrument(skip_all, fields(text = %text.document))]
pub fn compare_text_with_itself(
    text: &Text,
    params: &MatchParams,
    reference: Option<&FrequencyTable>,
    show_progress: bool,
) -> Result<MatchResult, MatchError> {
    check_run(params, reference)?;

    let prepared = PreparedText::prepare(text, params);
    info!(
        units = text.unit_count(),
        forms = prepared.index.distinct_forms(),
        "indexed text"
    );

    let candidates = find_self_candidates(&prepared.index, params.min_shared);
    info!(candidates = candidates.len(), "found candidate unit pairs");

    let records = score_pair(
        &prepared,
        &prepared,
        &candidates,
        params,
        reference,
        show_progress,
    )?;

    let matches = aggregate(records, params.top_n);
    info!(matches = matches.len(), "ranked matches");

    let summary = prepared.summary();
    Ok(MatchResult {
        version: env!("CARGO_PKG_VERSION").to_string(),
        parameters: params.clone(),
        text_a: summary.clone(),
        text_b: summary,
        summary: summarize(&matches, text, text),
        matches,
    })
}

/// Match every unordered pair of distinct texts and merge the results into
/// one ranking. `top_n` applies to the merged ranking.
#[tracing::instrument(skip_all, fields(texts = texts.len()))]
pub fn compare_corpus(
    texts: &[Text],
    params: &MatchParams,
    reference: Option<&FrequencyTable>,
    show_progress: bool,
) -> Result<CorpusMatchResult, MatchError> {
    check_run(params, reference)?;
    check_distinct_documents(texts)?;

    let prepared: Vec<PreparedText> = texts
        .par_iter()
        .map(|text| PreparedText::prepare(text, params))
        .collect();

    let mut records = Vec::new();
    let mut pair_count = 0;

    for i in 0..prepared.len() {
        for j in (i + 1)..prepared.len() {
            let a = &prepared[i];
            let b = &prepared[j];
            let candidates = find_candidates(&a.index, &b.index, params.min_shared);
            info!(
                text_a = %a.text.document,
                text_b = %b.text.document,
                candidates = candidates.len(),
                "matched text pair"
            );
            records.extend(score_pair(a, b, &candidates, params, reference, show_progress)?);
            pair_count += 1;
        }
    }

    let matches = aggregate(records, params.top_n);
    info!(pairs = pair_count, matches = matches.len(), "ranked corpus matches");

    Ok(CorpusMatchResult {
        version: env!("CARGO_PKG_VERSION").to_string(),
        parameters: params.clone(),
        texts: prepared.iter().map(PreparedText::summary).collect(),
        pair_count,
        matches,
    })
}

/// Build a stoplist of the `n` most frequent forms over `texts`, or over
/// `reference` when one is given.
pub fn build_stoplist(texts: &[Text], reference: Option<&FrequencyTable>, n: usize) -> Vec<String> {
    let table = match reference {
        Some(table) => table.clone(),
        None => FrequencyTable::from_texts(texts),
    };
    table.most_frequent(n).into_iter().map(|(form, _)| form).collect()
}
