//! Data structures for the intertext matching pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Input: tokens, units, texts
// ============================================================================

/// A normalized lexical form plus an optional display form.
///
/// Deserializes either from a bare string (the form) or from
/// `{"form": ..., "display": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TokenRepr")]
pub struct Token {
    pub form: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenRepr {
    Bare(String),
    Full {
        form: String,
        #[serde(default)]
        display: Option<String>,
    },
}

impl From<TokenRepr> for Token {
    fn from(repr: TokenRepr) -> Self {
        match repr {
            TokenRepr::Bare(form) => Token {
                form,
                display: None,
            },
            TokenRepr::Full { form, display } => Token { form, display },
        }
    }
}

impl Token {
    pub fn new(form: impl Into<String>) -> Self {
        Token {
            form: form.into(),
            display: None,
        }
    }

    pub fn with_display(form: impl Into<String>, display: impl Into<String>) -> Self {
        Token {
            form: form.into(),
            display: Some(display.into()),
        }
    }

    /// Display form if present, otherwise the normalized form.
    pub fn surface(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.form)
    }
}

/// Where a unit lives: document identifier plus a human-readable locus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub document: String,
    pub locus: String, // e.g. "3.44"
}

/// An atomic matchable span (a line, a phrase...).
///
/// Units are only created by [`Text::push_unit`], so a unit's index is
/// always its position within its text.
#[derive(Debug, Clone)]
pub struct Unit {
    index: u32,
    citation: Citation,
    tokens: Vec<Token>,
}

impl Unit {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn citation(&self) -> &Citation {
        &self.citation
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Iterate over the normalized forms in order.
    pub fn forms(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.form.as_str())
    }

    /// Reconstructed display text of the unit.
    pub fn snippet(&self) -> String {
        self.tokens
            .iter()
            .map(Token::surface)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A text: an ordered sequence of units belonging to one document.
#[derive(Debug, Clone)]
pub struct Text {
    pub document: String,
    units: Vec<Unit>,
}

impl Text {
    pub fn new(document: impl Into<String>) -> Self {
        Text {
            document: document.into(),
            units: Vec::new(),
        }
    }

    /// Append a unit, assigning it the next position. Returns that position.
    pub fn push_unit(&mut self, locus: impl Into<String>, tokens: Vec<Token>) -> u32 {
        let index = self.units.len() as u32;
        self.units.push(Unit {
            index,
            citation: Citation {
                document: self.document.clone(),
                locus: locus.into(),
            },
            tokens,
        });
        index
    }

    /// Build a text from `(locus, forms)` pairs.
    pub fn from_forms(document: impl Into<String>, units: &[(&str, &[&str])]) -> Self {
        let mut text = Text::new(document);
        for (locus, forms) in units {
            text.push_unit(*locus, forms.iter().map(|f| Token::new(*f)).collect());
        }
        text
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, index: u32) -> Option<&Unit> {
        self.units.get(index as usize)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn token_count(&self) -> usize {
        self.units.iter().map(|u| u.tokens.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Which score formula is applied to candidate matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum ScoringMode {
    /// Sum of combined rarity weights of the shared forms
    #[default]
    Frequency,
    /// Rarity sum divided by the mean span of the shared forms in both units
    Distance,
    /// ln(sum of inverse frequencies) - ln(distance), with a distance basis
    Tesserae,
}

/// Where token counts for rarity weights come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum FrequencyScope {
    /// Each text is weighted by its own frequency table
    #[default]
    PerText,
    /// Both texts are weighted by one shared reference table
    ReferenceCorpus,
}

/// How the two per-side weights of a shared form become one contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum WeightCombination {
    /// 2ab / (a + b); equals the common weight when both sides agree
    #[default]
    HarmonicMean,
    /// (a + b) / 2
    Mean,
    /// a + b
    Sum,
}

/// How the per-unit distance is measured in tesserae mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum DistanceBasis {
    /// Distance between the outermost matched positions
    #[default]
    Span,
    /// Distance between the two rarest matched words
    Frequency,
}

macro_rules! kebab_from_str {
    ($ty:ty, $param:literal, $stage:expr, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = MatchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(MatchError::invalid(
                        $param,
                        $stage,
                        format!("unknown value {:?}", other),
                    )),
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = MatchError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                $(if *self == $variant {
                    return f.write_str($name);
                })+
                Ok(())
            }
        }
    };
}

kebab_from_str!(ScoringMode, "scoring_mode", Stage::Scoring, {
    "frequency" => ScoringMode::Frequency,
    "distance" => ScoringMode::Distance,
    "tesserae" => ScoringMode::Tesserae,
});

kebab_from_str!(FrequencyScope, "frequency_scope", Stage::Scoring, {
    "per-text" => FrequencyScope::PerText,
    "reference-corpus" => FrequencyScope::ReferenceCorpus,
});

kebab_from_str!(WeightCombination, "weight_combination", Stage::Scoring, {
    "harmonic-mean" => WeightCombination::HarmonicMean,
    "mean" => WeightCombination::Mean,
    "sum" => WeightCombination::Sum,
});

kebab_from_str!(DistanceBasis, "distance_basis", Stage::Scoring, {
    "span" => DistanceBasis::Span,
    "frequency" => DistanceBasis::Frequency,
});

/// Matching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    pub stopwords: BTreeSet<String>,
    pub min_shared: usize,
    pub scoring_mode: ScoringMode,
    pub frequency_scope: FrequencyScope,
    pub weight_combination: WeightCombination,
    pub rarity_floor: f64,
    pub top_n: Option<usize>,
    // Tesserae-mode parameters
    pub distance_basis: DistanceBasis,
    pub max_distance: Option<usize>,
    // Applied after scoring in every mode
    pub min_score: Option<f64>,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            stopwords: BTreeSet::new(),
            min_shared: 2,
            scoring_mode: ScoringMode::Frequency,
            frequency_scope: FrequencyScope::PerText,
            weight_combination: WeightCombination::HarmonicMean,
            rarity_floor: 1.0,
            top_n: None,
            distance_basis: DistanceBasis::Span,
            max_distance: None,
            min_score: None,
        }
    }
}

impl MatchParams {
    /// Replace the stopword set.
    pub fn with_stopwords<I, S>(mut self, stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords = stopwords.into_iter().map(Into::into).collect();
        self
    }

    /// Parse parameters from a JSON config file body and validate them.
    /// Missing keys take their default values.
    pub fn from_json(json: &str) -> Result<Self, MatchError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| MatchError::invalid("config", Stage::Configuration, e.to_string()))?;

        // Enum values go through FromStr first so the error names the parameter
        if let Some(fields) = value.as_object() {
            check_enum_field::<ScoringMode>(fields, "scoring_mode")?;
            check_enum_field::<FrequencyScope>(fields, "frequency_scope")?;
            check_enum_field::<WeightCombination>(fields, "weight_combination")?;
            check_enum_field::<DistanceBasis>(fields, "distance_basis")?;
        }

        let params: MatchParams = serde_json::from_value(value)
            .map_err(|e| MatchError::invalid("config", Stage::Configuration, e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Reject parameter values that no run could honor. Each error names the
    /// stage that reads the parameter.
    pub fn validate(&self) -> Result<(), MatchError> {
        if let Some(word) = self
            .stopwords
            .iter()
            .find(|w| w.is_empty() || w.trim() != w.as_str())
        {
            return Err(MatchError::invalid(
                "stopwords",
                Stage::Indexing,
                format!("contains {:?}, which can never equal a normalized form", word),
            ));
        }
        if self.min_shared < 1 {
            return Err(MatchError::invalid(
                "min_shared",
                Stage::Matching,
                "must be at least 1",
            ));
        }
        if !self.rarity_floor.is_finite() || self.rarity_floor <= 0.0 {
            return Err(MatchError::invalid(
                "rarity_floor",
                Stage::Scoring,
                format!("must be a positive number, got {}", self.rarity_floor),
            ));
        }
        if self.max_distance == Some(0) {
            return Err(MatchError::invalid(
                "max_distance",
                Stage::Scoring,
                "must be at least 1 when set",
            ));
        }
        if let Some(min) = self.min_score {
            if !min.is_finite() {
                return Err(MatchError::invalid(
                    "min_score",
                    Stage::Scoring,
                    "must be finite",
                ));
            }
        }
        if self.top_n == Some(0) {
            return Err(MatchError::invalid(
                "top_n",
                Stage::Aggregation,
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

fn check_enum_field<T>(
    fields: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<(), MatchError>
where
    T: FromStr<Err = MatchError>,
{
    match fields.get(key).and_then(serde_json::Value::as_str) {
        Some(raw) => raw.parse::<T>().map(|_| ()),
        None => Ok(()),
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Indexing,
    Matching,
    Scoring,
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Indexing => "indexing",
            Stage::Matching => "matching",
            Stage::Scoring => "scoring",
            Stage::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("invalid configuration for {stage}: {parameter} {reason}")]
    InvalidConfiguration {
        parameter: &'static str,
        stage: Stage,
        reason: String,
    },
    #[error("frequency_scope is reference-corpus but no reference frequency table was supplied")]
    MissingReferenceFrequencies,
    #[error("no unit at position {index} in {document}")]
    UnknownUnit { document: String, index: u32 },
}

impl MatchError {
    pub(crate) fn invalid(
        parameter: &'static str,
        stage: Stage,
        reason: impl Into<String>,
    ) -> Self {
        MatchError::InvalidConfiguration {
            parameter,
            stage,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Matching intermediates
// ============================================================================

/// One form shared by a unit pair, with every position it occupies on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedForm {
    pub form: String,
    pub positions_a: Vec<u32>, // Ascending
    pub positions_b: Vec<u32>, // Ascending
}

/// An unscored unit pair sharing at least `min_shared` distinct forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMatch {
    pub unit_a: u32,
    pub unit_b: u32,
    pub shared: Vec<SharedForm>, // Sorted by form
}

impl CandidateMatch {
    pub fn shared_count(&self) -> usize {
        self.shared.len()
    }
}

/// Per-form score breakdown entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedToken {
    pub form: String,
    pub weight_a: f64,
    pub weight_b: f64,
    pub pos_a: u32, // First occurrence in unit A
    pub pos_b: u32, // First occurrence in unit B
    pub contribution: f64,
}

/// A candidate plus its score and breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub unit_a: u32,
    pub unit_b: u32,
    pub score: f64,
    pub distance_a: u32, // Span (distance mode) or tesserae distance; 0 in frequency mode
    pub distance_b: u32,
    pub shared_tokens: Vec<SharedToken>,
}

// ============================================================================
// Results
// ============================================================================

/// Reference to a unit in the output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    pub document: String,
    pub locus: String,
    pub index: u32,
}

impl UnitRef {
    pub fn from_unit(unit: &Unit) -> Self {
        UnitRef {
            document: unit.citation.document.clone(),
            locus: unit.citation.locus.clone(),
            index: unit.index,
        }
    }
}

/// A ranked parallel between two units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: u64, // Rank within the result set, assigned after sorting
    pub unit_a: UnitRef,
    pub unit_b: UnitRef,
    pub score: f64,
    pub shared_tokens: Vec<SharedToken>,
}

/// Final ranked, deduplicated matches. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchResultSet {
    records: Vec<MatchRecord>,
}

impl MatchResultSet {
    /// Wrap already-ranked records. Only the aggregator constructs these.
    pub(crate) fn from_ranked(records: Vec<MatchRecord>) -> Self {
        MatchResultSet { records }
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Group matches by (document A, document B), keeping rank order inside
    /// each group. Groups are ordered by document identifiers.
    pub fn group_by_document_pair(&self) -> Vec<DocumentPairGroup<'_>> {
        let mut groups: BTreeMap<(&str, &str), Vec<&MatchRecord>> = BTreeMap::new();
        for record in &self.records {
            groups
                .entry((record.unit_a.document.as_str(), record.unit_b.document.as_str()))
                .or_default()
                .push(record);
        }
        groups
            .into_iter()
            .map(|((document_a, document_b), matches)| DocumentPairGroup {
                document_a,
                document_b,
                matches,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a MatchResultSet {
    type Item = &'a MatchRecord;
    type IntoIter = std::slice::Iter<'a, MatchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Presentation projection of a result set.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPairGroup<'a> {
    pub document_a: &'a str,
    pub document_b: &'a str,
    pub matches: Vec<&'a MatchRecord>,
}

/// Size information about one input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSummary {
    pub document: String,
    pub unit_count: usize,
    pub token_count: usize,
    pub indexed_forms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_count: usize,
    pub units_a_matched: usize,
    pub units_b_matched: usize,
    pub coverage_a: f64, // Fraction of text A units in at least one match
    pub coverage_b: f64,
    pub avg_score: f64,
    pub max_score: f64,
}

/// Full result of matching one text pair (or one text against itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub version: String,
    pub parameters: MatchParams,
    pub text_a: TextSummary,
    pub text_b: TextSummary,
    pub summary: MatchSummary,
    pub matches: MatchResultSet,
}

/// Result of matching every pair in a set of texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusMatchResult {
    pub version: String,
    pub parameters: MatchParams,
    pub texts: Vec<TextSummary>,
    pub pair_count: usize,
    pub matches: MatchResultSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_deserializes_from_string_or_object() {
        let tokens: Vec<Token> =
            serde_json::from_str(r#"["arma", {"form": "virum", "display": "virumque"}]"#).unwrap();
        assert_eq!(tokens[0], Token::new("arma"));
        assert_eq!(tokens[1], Token::with_display("virum", "virumque"));
        assert_eq!(tokens[1].surface(), "virumque");
    }

    #[test]
    fn test_push_unit_assigns_positions() {
        let mut text = Text::new("aen");
        assert_eq!(text.push_unit("1.1", vec![Token::new("arma")]), 0);
        assert_eq!(text.push_unit("1.2", vec![Token::new("cano")]), 1);
        assert_eq!(text.unit(1).unwrap().citation().locus, "1.2");
        assert_eq!(text.unit(1).unwrap().citation().document, "aen");
        assert_eq!(text.unit(1).unwrap().index(), 1);
        assert_eq!(text.token_count(), 2);
    }

    #[test]
    fn test_default_params_are_valid() {
        assert!(MatchParams::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_min_shared() {
        let params = MatchParams {
            min_shared: 0,
            ..Default::default()
        };
        match params.validate() {
            Err(MatchError::InvalidConfiguration {
                parameter, stage, ..
            }) => {
                assert_eq!(parameter, "min_shared");
                assert_eq!(stage, Stage::Matching);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_bad_floor() {
        for floor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let params = MatchParams {
                rarity_floor: floor,
                ..Default::default()
            };
            assert!(params.validate().is_err(), "floor {} accepted", floor);
        }
    }

    #[test]
    fn test_unknown_scoring_mode_is_invalid_configuration() {
        assert_eq!("distance".parse::<ScoringMode>(), Ok(ScoringMode::Distance));
        assert_eq!(FrequencyScope::ReferenceCorpus.to_string(), "reference-corpus");
        assert!(matches!(
            "cosine".parse::<ScoringMode>(),
            Err(MatchError::InvalidConfiguration {
                parameter: "scoring_mode",
                ..
            })
        ));
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: MatchParams =
            serde_json::from_str(r#"{"min_shared": 3, "scoring_mode": "distance"}"#).unwrap();
        assert_eq!(params.min_shared, 3);
        assert_eq!(params.scoring_mode, ScoringMode::Distance);
        assert_eq!(params.frequency_scope, FrequencyScope::PerText);
        assert_eq!(params.rarity_floor, 1.0);
    }

    #[test]
    fn test_config_with_unknown_enum_value() {
        match MatchParams::from_json(r#"{"scoring_mode": "cosine"}"#) {
            Err(MatchError::InvalidConfiguration {
                parameter, stage, ..
            }) => {
                assert_eq!(parameter, "scoring_mode");
                assert_eq!(stage, Stage::Scoring);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            MatchParams::from_json(r#"{"distance_basis": "words"}"#),
            Err(MatchError::InvalidConfiguration {
                parameter: "distance_basis",
                ..
            })
        ));
    }

    #[test]
    fn test_config_from_json() {
        let params =
            MatchParams::from_json(r#"{"scoring_mode": "Tesserae", "stopwords": ["et"]}"#).unwrap();
        assert_eq!(params.scoring_mode, ScoringMode::Tesserae);
        assert!(params.stopwords.contains("et"));

        // Plain serde goes through the same parser
        let err = serde_json::from_str::<MatchParams>(r#"{"scoring_mode": "cosine"}"#).unwrap_err();
        assert!(err.to_string().contains("scoring_mode"));
    }

    #[test]
    fn test_config_syntax_and_range_errors() {
        assert!(matches!(
            MatchParams::from_json("{min_shared: 2"),
            Err(MatchError::InvalidConfiguration {
                parameter: "config",
                stage: Stage::Configuration,
                ..
            })
        ));
        assert!(matches!(
            MatchParams::from_json(r#"{"top_n": 0}"#),
            Err(MatchError::InvalidConfiguration {
                parameter: "top_n",
                stage: Stage::Aggregation,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_untrimmed_stopword() {
        let params = MatchParams::default().with_stopwords(["et", " que"]);
        assert!(matches!(
            params.validate(),
            Err(MatchError::InvalidConfiguration {
                parameter: "stopwords",
                stage: Stage::Indexing,
                ..
            })
        ));
    }
}
