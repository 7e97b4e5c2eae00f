//! Intertext Match
//!
//! Index-driven detection of intertextual parallels between tokenized texts.
//! Units (lines, phrases) of two texts are paired when they share enough
//! distinct non-stopword forms, and each pair is scored by the rarity of
//! what it shares.
//!
//! # Example
//!
//! ```
//! use intertext_match::prelude::*;
//!
//! let aeneid = Text::from_forms("verg.aen", &[("1.1", &["arma", "virum", "que", "cano"])]);
//! let pharsalia = Text::from_forms("luc.bc", &[("1.1", &["bella", "per", "arma", "virum"])]);
//!
//! let params = MatchParams::default().with_stopwords(["que", "per"]);
//! let result = compare_texts(&aeneid, &pharsalia, &params, None, false).unwrap();
//!
//! assert_eq!(result.matches.len(), 1);
//! for m in &result.matches {
//!     println!("{} {} <-> {} {}: {:.3}", m.unit_a.document, m.unit_a.locus,
//!              m.unit_b.document, m.unit_b.locus, m.score);
//! }
//! ```
//!
//! # Reference corpus weighting
//!
//! ```no_run
//! use intertext_match::prelude::*;
//! use std::path::Path;
//!
//! let db_path = Path::new("corpus.db");
//! let a = load_text(db_path, "verg.aen").unwrap();
//! let b = load_text(db_path, "luc.bc").unwrap();
//! let reference = load_corpus_frequencies(db_path).unwrap();
//!
//! let params = MatchParams {
//!     frequency_scope: FrequencyScope::ReferenceCorpus,
//!     scoring_mode: ScoringMode::Tesserae,
//!     ..Default::default()
//! };
//! let result = compare_texts(&a, &b, &params, Some(&reference), true).unwrap();
//! print_summary(&result);
//! ```

pub mod aggregate;
pub mod compare;
pub mod db;
pub mod frequency;
pub mod index;
pub mod matcher;
pub mod models;
pub mod output;
pub mod scorer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::aggregate::{aggregate, merge_result_sets, summarize};
    pub use crate::compare::{
        build_stoplist, compare_corpus, compare_text_with_itself, compare_texts, PreparedText,
    };
    pub use crate::db::{
        list_documents, load_corpus_frequencies, load_corpus_stats, load_text, load_texts,
        read_frequency_json, read_stopwords, read_text_json, CorpusStats, DbError,
    };
    pub use crate::frequency::FrequencyTable;
    pub use crate::index::InvertedIndex;
    pub use crate::matcher::{find_candidates, find_self_candidates};
    pub use crate::models::{
        CandidateMatch, Citation, CorpusMatchResult, DistanceBasis, FrequencyScope, MatchError,
        MatchParams, MatchRecord, MatchResult, MatchResultSet, ScoredMatch, ScoringMode,
        SharedToken, Text, Token, Unit, UnitRef, WeightCombination,
    };
    pub use crate::output::{
        format_match, format_match_with_text, print_corpus_summary, print_matches, print_summary,
        write_csv, write_csv_file, write_frequency_json, write_frequency_json_file, write_json,
        write_json_file, OutputError,
    };
    pub use crate::scorer::{score_candidates, ScoringContext};
}

// Re-export commonly used types at the crate root
pub use models::{MatchError, MatchParams, MatchResult, MatchResultSet, Text};
