//! Intertext Match Pipeline
//!
//! Finds and ranks intertextual parallels between pre-tokenized texts read
//! from a SQLite corpus database or from JSON files.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use intertext_match::compare::{build_stoplist, compare_corpus, compare_text_with_itself, compare_texts};
use intertext_match::db::{
    list_documents, load_corpus_stats, load_text, read_frequency_json, read_stopwords,
    read_text_json, DbError,
};
use intertext_match::frequency::FrequencyTable;
use intertext_match::models::{
    DistanceBasis, FrequencyScope, MatchParams, MatchResultSet, ScoringMode, Text, Token,
    WeightCombination,
};
use intertext_match::output::{
    print_corpus_summary, print_matches, print_summary, write_csv_file, write_frequency_json,
    write_frequency_json_file, write_json_file,
};

#[derive(Parser)]
#[command(name = "intertext-match")]
#[command(about = "Index-driven detection of intertextual parallels")]
#[command(version)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for match results
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Full result with parameters and summary
    Json,
    /// One row per match
    Csv,
}

/// Scoring mode (CLI version, mirrors models::ScoringMode)
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliScoringMode {
    /// Sum of combined rarity weights (default)
    Frequency,
    /// Rarity sum divided by the mean span of the shared forms
    Distance,
    /// ln(sum of inverse frequencies) - ln(distance)
    Tesserae,
}

impl From<CliScoringMode> for ScoringMode {
    fn from(mode: CliScoringMode) -> Self {
        match mode {
            CliScoringMode::Frequency => ScoringMode::Frequency,
            CliScoringMode::Distance => ScoringMode::Distance,
            CliScoringMode::Tesserae => ScoringMode::Tesserae,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFrequencyScope {
    /// Each text weighted by its own counts (default)
    PerText,
    /// Both texts weighted by one reference table
    ReferenceCorpus,
}

impl From<CliFrequencyScope> for FrequencyScope {
    fn from(scope: CliFrequencyScope) -> Self {
        match scope {
            CliFrequencyScope::PerText => FrequencyScope::PerText,
            CliFrequencyScope::ReferenceCorpus => FrequencyScope::ReferenceCorpus,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliWeightCombination {
    HarmonicMean,
    Mean,
    Sum,
}

impl From<CliWeightCombination> for WeightCombination {
    fn from(rule: CliWeightCombination) -> Self {
        match rule {
            CliWeightCombination::HarmonicMean => WeightCombination::HarmonicMean,
            CliWeightCombination::Mean => WeightCombination::Mean,
            CliWeightCombination::Sum => WeightCombination::Sum,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliDistanceBasis {
    Span,
    Frequency,
}

impl From<CliDistanceBasis> for DistanceBasis {
    fn from(basis: CliDistanceBasis) -> Self {
        match basis {
            CliDistanceBasis::Span => DistanceBasis::Span,
            CliDistanceBasis::Frequency => DistanceBasis::Frequency,
        }
    }
}

/// Where texts come from and how the reference table is found.
#[derive(Args)]
struct InputArgs {
    /// Path to a corpus database; text arguments are then document ids.
    /// Without it, text arguments are paths to JSON text files.
    #[arg(long)]
    corpus_db: Option<PathBuf>,

    /// Reference frequency table (JSON object of form -> count)
    #[arg(long)]
    reference: Option<PathBuf>,
}

/// Matching parameters. Every value overrides MatchParams::default(), or the
/// file given with --config.
#[derive(Args)]
struct ParamArgs {
    /// JSON file with matching parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated stopwords (replaces any other stopword source)
    #[arg(long, value_delimiter = ',')]
    stopwords: Option<Vec<String>>,

    /// Stoplist file, one form per line
    #[arg(long)]
    stoplist_file: Option<PathBuf>,

    /// Use the N most frequent forms of the compared texts (or of the reference table)
    #[arg(long)]
    stopwords_top: Option<usize>,

    /// Minimum distinct shared forms per unit pair [default: 2]
    #[arg(long)]
    min_shared: Option<usize>,

    /// Scoring mode [default: frequency]
    #[arg(long, value_enum)]
    scoring_mode: Option<CliScoringMode>,

    /// Frequency scope [default: per-text]
    #[arg(long, value_enum)]
    frequency_scope: Option<CliFrequencyScope>,

    /// Per-form weight combination [default: harmonic-mean]
    #[arg(long, value_enum)]
    weight_combination: Option<CliWeightCombination>,

    /// Lower bound for counts in rarity weights [default: 1.0]
    #[arg(long)]
    rarity_floor: Option<f64>,

    /// Keep only the N best matches
    #[arg(long)]
    top_n: Option<usize>,

    /// Distance basis for tesserae scoring [default: span]
    #[arg(long, value_enum)]
    distance_basis: Option<CliDistanceBasis>,

    /// Drop tesserae matches whose summed distance exceeds this
    #[arg(long)]
    max_distance: Option<usize>,

    /// Drop matches scoring below this
    #[arg(long, allow_hyphen_values = true)]
    min_score: Option<f64>,
}

#[derive(Args)]
struct OutputArgs {
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Print first N matches to console
    #[arg(long)]
    show_matches: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Match two texts
    Match {
        /// First text (document id or JSON path)
        #[arg(long)]
        text_a: String,

        /// Second text (document id or JSON path)
        #[arg(long)]
        text_b: String,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        params: ParamArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Match a text against itself
    SelfMatch {
        /// Text (document id or JSON path)
        #[arg(long)]
        text: String,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        params: ParamArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Match every pair of several texts
    Corpus {
        /// Texts (document ids or JSON paths); all documents of --corpus-db when omitted
        #[arg(long, num_args = 1..)]
        texts: Vec<String>,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        params: ParamArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the most frequent forms of some texts
    Stoplist {
        /// Texts (document ids or JSON paths)
        #[arg(long, num_args = 1..)]
        texts: Vec<String>,

        #[command(flatten)]
        input: InputArgs,

        /// Number of forms
        #[arg(long, default_value = "10")]
        size: usize,
    },

    /// Write a reference frequency table built from some texts
    Frequencies {
        /// Texts (document ids or JSON paths); all documents of --corpus-db when omitted
        #[arg(long, num_args = 1..)]
        texts: Vec<String>,

        #[command(flatten)]
        input: InputArgs,

        /// Output file path (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show corpus statistics
    Stats {
        /// Path to corpus.db
        #[arg(long)]
        corpus_db: PathBuf,
    },

    /// Benchmark matching on synthetic texts
    Benchmark {
        /// Number of runs
        #[arg(long, default_value = "10")]
        iterations: usize,

        /// Units per text
        #[arg(long, default_value = "2000")]
        units: usize,

        /// Tokens per unit
        #[arg(long, default_value = "8")]
        unit_size: usize,
    },
}

fn init_tracing(quiet: bool, verbose: u8) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_input(corpus_db: Option<&Path>, source: &str) -> Result<Text, DbError> {
    match corpus_db {
        Some(db) => load_text(db, source),
        None => read_text_json(Path::new(source)),
    }
}

fn load_inputs(input: &InputArgs, sources: &[String]) -> Result<Vec<Text>, DbError> {
    let corpus_db = input.corpus_db.as_deref();
    let sources = match (sources.is_empty(), corpus_db) {
        (true, Some(db)) => list_documents(db)?,
        _ => sources.to_vec(),
    };
    sources.iter().map(|s| load_input(corpus_db, s)).collect()
}

fn load_reference(input: &InputArgs) -> Result<Option<FrequencyTable>, DbError> {
    input.reference.as_deref().map(read_frequency_json).transpose()
}

/// Overlay command-line values onto the config file (or the defaults).
fn build_params(
    args: &ParamArgs,
    texts: &[Text],
    reference: Option<&FrequencyTable>,
) -> Result<MatchParams, Box<dyn std::error::Error>> {
    let base = match &args.config {
        Some(path) => MatchParams::from_json(&std::fs::read_to_string(path)?)?,
        None => MatchParams::default(),
    };

    let stopwords: BTreeSet<String> = if let Some(words) = &args.stopwords {
        words.iter().map(|w| w.trim().to_string()).collect()
    } else if let Some(path) = &args.stoplist_file {
        read_stopwords(path)?
    } else if let Some(n) = args.stopwords_top {
        build_stoplist(texts, reference, n).into_iter().collect()
    } else {
        base.stopwords.clone()
    };

    let params = MatchParams {
        stopwords,
        min_shared: args.min_shared.unwrap_or(base.min_shared),
        scoring_mode: args.scoring_mode.map(ScoringMode::from).unwrap_or(base.scoring_mode),
        frequency_scope: args
            .frequency_scope
            .map(FrequencyScope::from)
            .unwrap_or(base.frequency_scope),
        weight_combination: args
            .weight_combination
            .map(WeightCombination::from)
            .unwrap_or(base.weight_combination),
        rarity_floor: args.rarity_floor.unwrap_or(base.rarity_floor),
        top_n: args.top_n.or(base.top_n),
        distance_basis: args
            .distance_basis
            .map(DistanceBasis::from)
            .unwrap_or(base.distance_basis),
        max_distance: args.max_distance.or(base.max_distance),
        min_score: args.min_score.or(base.min_score),
    };
    params.validate()?;
    Ok(params)
}

/// The reference table to score with: the one given, or one built from the
/// compared texts when the reference scope is chosen without one.
fn resolve_reference(
    params: &MatchParams,
    given: Option<FrequencyTable>,
    texts: &[Text],
) -> Option<FrequencyTable> {
    match (params.frequency_scope, given) {
        (_, Some(table)) => Some(table),
        (FrequencyScope::ReferenceCorpus, None) => {
            warn!("no --reference given; using the compared texts as the reference corpus");
            Some(FrequencyTable::from_texts(texts))
        }
        (FrequencyScope::PerText, None) => None,
    }
}

fn write_matches<T: serde::Serialize>(
    result: &T,
    matches: &MatchResultSet,
    output: &OutputArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &output.output {
        match output.format {
            OutputFormat::Json => write_json_file(result, path)?,
            OutputFormat::Csv => write_csv_file(matches, path)?,
        }
        info!(path = %path.display(), "wrote output");
    }

    if let Some(limit) = output.show_matches {
        println!("\n=== Sample Matches ===");
        print_matches(matches, Some(limit));
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);
    let show_progress = !cli.quiet;

    match cli.command {
        Commands::Match {
            text_a,
            text_b,
            input,
            params,
            output,
        } => {
            let texts = vec![
                load_input(input.corpus_db.as_deref(), &text_a)?,
                load_input(input.corpus_db.as_deref(), &text_b)?,
            ];
            let given = load_reference(&input)?;
            let params = build_params(&params, &texts, given.as_ref())?;
            let reference = resolve_reference(&params, given, &texts);

            let result = compare_texts(&texts[0], &texts[1], &params, reference.as_ref(), show_progress)?;

            if !cli.quiet {
                print_summary(&result);
            }
            write_matches(&result, &result.matches, &output)?;
        }

        Commands::SelfMatch {
            text,
            input,
            params,
            output,
        } => {
            let texts = vec![load_input(input.corpus_db.as_deref(), &text)?];
            let given = load_reference(&input)?;
            let params = build_params(&params, &texts, given.as_ref())?;
            let reference = resolve_reference(&params, given, &texts);

            let result = compare_text_with_itself(&texts[0], &params, reference.as_ref(), show_progress)?;

            if !cli.quiet {
                print_summary(&result);
            }
            write_matches(&result, &result.matches, &output)?;
        }

        Commands::Corpus {
            texts,
            input,
            params,
            output,
        } => {
            let texts = load_inputs(&input, &texts)?;
            if texts.len() < 2 {
                return Err("corpus matching needs at least two texts".into());
            }
            let given = load_reference(&input)?;
            let params = build_params(&params, &texts, given.as_ref())?;
            let reference = resolve_reference(&params, given, &texts);

            let result = compare_corpus(&texts, &params, reference.as_ref(), show_progress)?;

            if !cli.quiet {
                print_corpus_summary(&result);
            }
            write_matches(&result, &result.matches, &output)?;
        }

        Commands::Stoplist { texts, input, size } => {
            let texts = load_inputs(&input, &texts)?;
            let reference = load_reference(&input)?;
            for form in build_stoplist(&texts, reference.as_ref(), size) {
                println!("{}", form);
            }
        }

        Commands::Frequencies {
            texts,
            input,
            output,
        } => {
            let texts = load_inputs(&input, &texts)?;
            let mut table = FrequencyTable::from_texts(&texts);
            if let Some(reference) = load_reference(&input)? {
                table.merge(&reference);
            }
            info!(
                forms = table.distinct_forms(),
                tokens = table.total_tokens(),
                "built frequency table"
            );
            match output {
                Some(path) => write_frequency_json_file(&table, &path)?,
                None => write_frequency_json(&table, &mut std::io::stdout().lock())?,
            }
        }

        Commands::Stats { corpus_db } => {
            let stats = load_corpus_stats(&corpus_db)?;

            println!("=== Corpus Statistics ===");
            println!("Documents: {}", stats.documents);
            println!("Units: {}", stats.units);
            println!("Tokens: {}", stats.tokens);
            println!("Distinct forms: {}", stats.distinct_forms);
        }

        Commands::Benchmark {
            iterations,
            units,
            unit_size,
        } => {
            run_benchmark(iterations, units, unit_size)?;
        }
    }

    Ok(())
}

/// Deterministic synthetic text: form ids follow a skewed distribution so
/// that a few forms are frequent and most are rare.
fn synthetic_text(document: &str, units: usize, unit_size: usize, seed: u64) -> Text {
    let mut state = seed;
    let mut text = Text::new(document);
    for u in 0..units {
        let tokens: Vec<Token> = (0..unit_size)
            .map(|_| {
                // xorshift64
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let r = (state % 10_000) as f64 / 10_000.0;
                let id = (r * r * r * 5_000.0) as u64;
                Token::new(format!("w{}", id))
            })
            .collect();
        text.push_unit(format!("{}.{}", document, u + 1), tokens);
    }
    text
}

/// Run matching benchmark to measure performance.
fn run_benchmark(
    iterations: usize,
    units: usize,
    unit_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::time::Instant;

    println!("=== Matching Benchmark ===");
    println!("Iterations: {}", iterations);
    println!("Units per text: {}", units);
    println!("Tokens per unit: {}", unit_size);

    let text_a = synthetic_text("A", units, unit_size, 0x9E37_79B9_7F4A_7C15);
    let text_b = synthetic_text("B", units, unit_size, 0xD1B5_4A32_D192_ED03);
    let stopwords = build_stoplist(&[text_a.clone(), text_b.clone()], None, 10);

    for mode in [ScoringMode::Frequency, ScoringMode::Distance, ScoringMode::Tesserae] {
        let params = MatchParams {
            scoring_mode: mode,
            ..MatchParams::default().with_stopwords(stopwords.iter().cloned())
        };

        println!("\n{} scoring:", mode);
        let start = Instant::now();
        let mut matches = 0;
        for _ in 0..iterations {
            matches = compare_texts(&text_a, &text_b, &params, None, false)?.matches.len();
        }
        let elapsed = start.elapsed();
        let per_run = elapsed.as_secs_f64() / iterations.max(1) as f64;
        println!("  Matches: {}", matches);
        println!("  Total time: {:.3}s", elapsed.as_secs_f64());
        println!("  Per run: {:.3}ms", per_run * 1000.0);
        println!("  Runs/sec: {:.1}", 1.0 / per_run);
    }

    Ok(())
}
