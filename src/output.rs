//! Output formatting for match results (JSON, CSV, console).

use crate::frequency::FrequencyTable;
use crate::models::{CorpusMatchResult, MatchRecord, MatchResult, MatchResultSet, Text, UnitRef};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write any result (pair or corpus) as pretty JSON.
pub fn write_json<T: Serialize, W: Write>(result: &T, writer: &mut W) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(result)?;
    writer.write_all(json.as_bytes())?;
    writeln!(writer)?;
    Ok(())
}

pub fn write_json_file<T: Serialize>(result: &T, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_json(result, &mut file)
}

/// Write a frequency table as a JSON object of form -> count, sorted by form.
/// This is the format reference tables are read back from.
pub fn write_frequency_json<W: Write>(
    table: &FrequencyTable,
    writer: &mut W,
) -> Result<(), OutputError> {
    let counts: BTreeMap<&str, u64> = table.sorted_counts().into_iter().collect();
    write_json(&counts, writer)
}

pub fn write_frequency_json_file(table: &FrequencyTable, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_frequency_json(table, &mut file)
}

/// Quote a CSV field when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write matches as CSV, one row per match. Shared forms are joined by `|`.
pub fn write_csv<W: Write>(matches: &MatchResultSet, writer: &mut W) -> Result<(), OutputError> {
    writeln!(
        writer,
        "id,document_a,locus_a,unit_a,document_b,locus_b,unit_b,score,shared_count,shared_forms"
    )?;

    for m in matches {
        let forms: Vec<&str> = m.shared_tokens.iter().map(|t| t.form.as_str()).collect();
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{}",
            m.id,
            csv_field(&m.unit_a.document),
            csv_field(&m.unit_a.locus),
            m.unit_a.index,
            csv_field(&m.unit_b.document),
            csv_field(&m.unit_b.locus),
            m.unit_b.index,
            m.score,
            m.shared_tokens.len(),
            csv_field(&forms.join("|")),
        )?;
    }

    Ok(())
}

pub fn write_csv_file(matches: &MatchResultSet, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_csv(matches, &mut file)
}

/// Write a summary report to stdout.
pub fn print_summary(result: &MatchResult) {
    let params = &result.parameters;
    println!("\n=== Match Summary ===");
    println!("Version: {}", result.version);
    println!();
    println!(
        "Text A: {} ({} units, {} tokens, {} indexed forms)",
        result.text_a.document,
        result.text_a.unit_count,
        result.text_a.token_count,
        result.text_a.indexed_forms
    );
    println!(
        "Text B: {} ({} units, {} tokens, {} indexed forms)",
        result.text_b.document,
        result.text_b.unit_count,
        result.text_b.token_count,
        result.text_b.indexed_forms
    );
    println!();
    println!("Parameters:");
    println!("  Stopwords: {}", params.stopwords.len());
    println!("  Min shared: {}", params.min_shared);
    println!("  Scoring mode: {}", params.scoring_mode);
    println!("  Frequency scope: {}", params.frequency_scope);
    println!("  Weight combination: {}", params.weight_combination);
    println!("  Rarity floor: {}", params.rarity_floor);
    if let Some(n) = params.top_n {
        println!("  Top N: {}", n);
    }
    println!();
    println!("Results:");
    println!("  Matches found: {}", result.summary.match_count);
    println!(
        "  Text A coverage: {:.1}% ({} units)",
        result.summary.coverage_a * 100.0,
        result.summary.units_a_matched
    );
    println!(
        "  Text B coverage: {:.1}% ({} units)",
        result.summary.coverage_b * 100.0,
        result.summary.units_b_matched
    );
    println!("  Average score: {:.3}", result.summary.avg_score);
    println!("  Max score: {:.3}", result.summary.max_score);
}

/// Write a corpus run summary to stdout, one line per document pair.
pub fn print_corpus_summary(result: &CorpusMatchResult) {
    println!("\n=== Corpus Match Summary ===");
    println!("Version: {}", result.version);
    println!("Texts: {}  Pairs compared: {}", result.texts.len(), result.pair_count);
    for text in &result.texts {
        println!(
            "  {} ({} units, {} tokens)",
            text.document, text.unit_count, text.token_count
        );
    }
    println!();
    println!("Matches: {}", result.matches.len());
    for group in result.matches.group_by_document_pair() {
        println!(
            "  {} <-> {}: {} matches",
            group.document_a,
            group.document_b,
            group.matches.len()
        );
    }
}

fn format_unit_ref(unit: &UnitRef) -> String {
    format!("{} {} [#{}]", unit.document, unit.locus, unit.index)
}

/// Format a match as a human-readable string.
pub fn format_match(record: &MatchRecord) -> String {
    let forms: Vec<&str> = record.shared_tokens.iter().map(|t| t.form.as_str()).collect();
    format!(
        "Match {}: score={:.3} shared={}\n\
         \x20 {} ↔ {}\n\
         \x20 Forms: {}",
        record.id,
        record.score,
        record.shared_tokens.len(),
        format_unit_ref(&record.unit_a),
        format_unit_ref(&record.unit_b),
        forms.join(", "),
    )
}

/// Like [`format_match`], with the reconstructed text of both units.
pub fn format_match_with_text(record: &MatchRecord, text_a: &Text, text_b: &Text) -> String {
    let snippet = |text: &Text, index: u32| {
        text.unit(index)
            .map(|u| truncate_text(&u.snippet(), 100))
            .unwrap_or_default()
    };
    format!(
        "{}\n\x20 A: {}\n\x20 B: {}",
        format_match(record),
        snippet(text_a, record.unit_a.index),
        snippet(text_b, record.unit_b.index),
    )
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Print matches in a human-readable format.
pub fn print_matches(matches: &MatchResultSet, limit: Option<usize>) {
    let records = matches.records();
    let to_print = match limit {
        Some(n) => &records[..n.min(records.len())],
        None => records,
    };

    for record in to_print {
        println!("{}", format_match(record));
    }

    if let Some(n) = limit {
        if records.len() > n {
            println!("... and {} more matches", records.len() - n);
        }
    }
}
