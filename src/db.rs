//! Input adapters: SQLite corpus database and JSON text files.
//!
//! The database holds texts that are already tokenized and normalized:
//!
//! ```sql
//! documents (document TEXT)
//! units  (document TEXT, idx INTEGER, locus TEXT)
//! tokens (document TEXT, unit_idx INTEGER, position INTEGER, form TEXT, display TEXT)
//! ```

use crate::frequency::FrequencyTable;
use crate::models::{Text, Token};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Text not found: {0}")]
    TextNotFound(String),
}

/// Create the corpus tables if they do not exist yet.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
             document TEXT PRIMARY KEY
         );
         CREATE TABLE IF NOT EXISTS units (
             document TEXT NOT NULL,
             idx INTEGER NOT NULL,
             locus TEXT NOT NULL,
             PRIMARY KEY (document, idx)
         );
         CREATE TABLE IF NOT EXISTS tokens (
             document TEXT NOT NULL,
             unit_idx INTEGER NOT NULL,
             position INTEGER NOT NULL,
             form TEXT NOT NULL,
             display TEXT,
             PRIMARY KEY (document, unit_idx, position)
         );",
    )?;
    Ok(())
}

/// Store a text, replacing any previous text with the same document id.
pub fn insert_text(conn: &mut Connection, text: &Text) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM units WHERE document = ?1", [&text.document])?;
    tx.execute("DELETE FROM tokens WHERE document = ?1", [&text.document])?;
    tx.execute(
        "INSERT OR IGNORE INTO documents (document) VALUES (?1)",
        [&text.document],
    )?;
    {
        let mut unit_stmt =
            tx.prepare("INSERT INTO units (document, idx, locus) VALUES (?1, ?2, ?3)")?;
        let mut token_stmt = tx.prepare(
            "INSERT INTO tokens (document, unit_idx, position, form, display)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for unit in text.units() {
            unit_stmt.execute(params![text.document, unit.index(), unit.citation().locus])?;
            for (position, token) in unit.tokens().iter().enumerate() {
                token_stmt.execute(params![
                    text.document,
                    unit.index(),
                    position as u32,
                    token.form,
                    token.display
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load one text from a database file.
pub fn load_text(db_path: &Path, document: &str) -> Result<Text, DbError> {
    let conn = Connection::open(db_path)?;
    load_text_from_conn(&conn, document)
}

/// Load one text, units in stored order and tokens in position order.
/// A stored text without units loads as an empty text.
pub fn load_text_from_conn(conn: &Connection, document: &str) -> Result<Text, DbError> {
    let known: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM documents WHERE document = ?1)",
        [document],
        |row| row.get(0),
    )?;
    if !known {
        return Err(DbError::TextNotFound(document.to_string()));
    }

    let mut unit_stmt =
        conn.prepare("SELECT idx, locus FROM units WHERE document = ?1 ORDER BY idx")?;
    let units: Vec<(u32, String)> = unit_stmt
        .query_map([document], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut tokens_by_unit: BTreeMap<u32, Vec<Token>> = BTreeMap::new();
    let mut token_stmt = conn.prepare(
        "SELECT unit_idx, form, display FROM tokens
         WHERE document = ?1
         ORDER BY unit_idx, position",
    )?;
    let mut rows = token_stmt.query([document])?;
    while let Some(row) = rows.next()? {
        let unit_idx: u32 = row.get(0)?;
        let form: String = row.get(1)?;
        let display: Option<String> = row.get(2)?;
        tokens_by_unit
            .entry(unit_idx)
            .or_default()
            .push(Token { form, display });
    }

    // Stored indices may have gaps; units are renumbered densely in order
    let mut text = Text::new(document);
    for (idx, locus) in units {
        let tokens = tokens_by_unit.remove(&idx).unwrap_or_default();
        text.push_unit(locus, tokens);
    }
    Ok(text)
}

/// Load several texts from one database file.
pub fn load_texts(db_path: &Path, documents: &[String]) -> Result<Vec<Text>, DbError> {
    let conn = Connection::open(db_path)?;
    documents
        .iter()
        .map(|doc| load_text_from_conn(&conn, doc))
        .collect()
}

/// Document ids in the database, sorted.
pub fn list_documents(db_path: &Path) -> Result<Vec<String>, DbError> {
    let conn = Connection::open(db_path)?;
    list_documents_from_conn(&conn)
}

pub fn list_documents_from_conn(conn: &Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare("SELECT document FROM documents ORDER BY document")?;
    let docs = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(docs)
}

/// Corpus-wide counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusStats {
    pub documents: u64,
    pub units: u64,
    pub tokens: u64,
    pub distinct_forms: u64,
}

/// Load corpus statistics
pub fn load_corpus_stats(db_path: &Path) -> Result<CorpusStats, DbError> {
    let conn = Connection::open(db_path)?;
    load_corpus_stats_from_conn(&conn)
}

pub fn load_corpus_stats_from_conn(conn: &Connection) -> Result<CorpusStats, DbError> {
    let documents: u64 =
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

    let units: u64 = conn.query_row("SELECT COUNT(*) FROM units", [], |row| row.get(0))?;

    let tokens: u64 = conn.query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;

    let distinct_forms: u64 =
        conn.query_row("SELECT COUNT(DISTINCT form) FROM tokens", [], |row| row.get(0))?;

    Ok(CorpusStats {
        documents,
        units,
        tokens,
        distinct_forms,
    })
}

/// Frequency table over every token in the database.
pub fn load_corpus_frequencies(db_path: &Path) -> Result<FrequencyTable, DbError> {
    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare("SELECT form, COUNT(*) FROM tokens GROUP BY form")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FrequencyTable::from_counts(counts))
}

// ============================================================================
// JSON files
// ============================================================================

#[derive(Debug, Deserialize)]
struct TextFile {
    document: String,
    units: Vec<UnitEntry>,
}

#[derive(Debug, Deserialize)]
struct UnitEntry {
    locus: String,
    tokens: Vec<Token>,
}

/// Parse a text from JSON:
/// `{"document": "...", "units": [{"locus": "...", "tokens": ["form", {"form": "...", "display": "..."}]}]}`
pub fn parse_text_json(json: &str) -> Result<Text, DbError> {
    let file: TextFile = serde_json::from_str(json)?;
    let mut text = Text::new(file.document);
    for unit in file.units {
        text.push_unit(unit.locus, unit.tokens);
    }
    Ok(text)
}

pub fn read_text_json(path: &Path) -> Result<Text, DbError> {
    parse_text_json(&std::fs::read_to_string(path)?)
}

/// Read a reference frequency table stored as a JSON object of form -> count.
pub fn read_frequency_json(path: &Path) -> Result<FrequencyTable, DbError> {
    let counts: BTreeMap<String, u64> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(FrequencyTable::from_counts(counts))
}

/// Parse a stoplist: one form per line, blank lines and `#` comments ignored.
pub fn parse_stopwords(contents: &str) -> BTreeSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_stopwords(path: &Path) -> Result<BTreeSet<String>, DbError> {
    Ok(parse_stopwords(&std::fs::read_to_string(path)?))
}
