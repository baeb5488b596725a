use std::path::{Path, PathBuf};

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::db::now_timestamp;
use crate::error::{LedgerError, Result};
use crate::extractor::{statement_files, Document};
use crate::grammar::RowGrammar;
use crate::merger::merge_candidates;
use crate::models::{ConflictWarning, IngestionRun, ParseWarning, RunStatus, RunWarning};
use crate::parser::parse_document;

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

pub fn begin_run(conn: &Connection, filename: &str, checksum: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingestion_runs (filename, checksum, started_at, status) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![filename, checksum, now_timestamp(), RunStatus::Running.key()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn finish_run(conn: &Connection, run_id: i64, report: &DocumentReport) -> Result<()> {
    conn.execute(
        "UPDATE ingestion_runs SET finished_at = ?1, status = ?2, new_count = ?3, \
         duplicate_count = ?4, conflict_count = ?5, warning_count = ?6 WHERE id = ?7",
        rusqlite::params![
            now_timestamp(),
            RunStatus::Completed.key(),
            report.new as i64,
            report.duplicates as i64,
            report.conflicts.len() as i64,
            report.parse_warnings.len() as i64,
            run_id,
        ],
    )?;
    Ok(())
}

fn fail_run(conn: &Connection, run_id: i64, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE ingestion_runs SET finished_at = ?1, status = ?2, error = ?3 WHERE id = ?4",
        rusqlite::params![now_timestamp(), RunStatus::Failed.key(), error, run_id],
    )?;
    Ok(())
}

fn record_warnings(
    conn: &Connection,
    run_id: i64,
    parse: &[ParseWarning],
    conflicts: &[ConflictWarning],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO run_warnings (run_id, kind, page, line, message) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for w in parse {
        stmt.execute(rusqlite::params![
            run_id,
            "parse",
            w.page as i64,
            w.line as i64,
            format!("{}: {}", w.reason, w.text.trim()),
        ])?;
    }
    for c in conflicts {
        stmt.execute(rusqlite::params![
            run_id,
            "conflict",
            c.page as i64,
            c.line as i64,
            format!("'{}' differs from stored record in {}", c.description, c.fields.join(", ")),
        ])?;
    }
    Ok(())
}

fn run_from_row(row: &rusqlite::Row) -> rusqlite::Result<IngestionRun> {
    let status: String = row.get(5)?;
    Ok(IngestionRun {
        id: row.get(0)?,
        filename: row.get(1)?,
        checksum: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: RunStatus::from_key(&status).unwrap_or(RunStatus::Failed),
        new_count: row.get(6)?,
        duplicate_count: row.get(7)?,
        conflict_count: row.get(8)?,
        warning_count: row.get(9)?,
        error: row.get(10)?,
    })
}

const RUN_COLUMNS: &str = "id, filename, checksum, started_at, finished_at, status, \
     new_count, duplicate_count, conflict_count, warning_count, error";

/// Most recent runs first.
pub fn list_runs(conn: &Connection, limit: usize) -> Result<Vec<IngestionRun>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM ingestion_runs ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map([limit as i64], run_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_run(conn: &Connection, run_id: i64) -> Result<(IngestionRun, Vec<RunWarning>)> {
    let run = conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM ingestion_runs WHERE id = ?1"),
            [run_id],
            run_from_row,
        )
        .map_err(|_| LedgerError::Other(format!("No ingestion run with ID {run_id}")))?;

    let mut stmt = conn.prepare(
        "SELECT kind, page, line, message FROM run_warnings WHERE run_id = ?1 ORDER BY id",
    )?;
    let warnings = stmt
        .query_map([run_id], |row| {
            Ok(RunWarning {
                kind: row.get(0)?,
                page: row.get(1)?,
                line: row.get(2)?,
                message: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((run, warnings))
}

// ---------------------------------------------------------------------------
// ingest_document
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DocumentReport {
    pub run_id: i64,
    pub filename: String,
    pub pages: usize,
    pub new: usize,
    pub duplicates: usize,
    pub conflicts: Vec<ConflictWarning>,
    pub parse_warnings: Vec<ParseWarning>,
}

/// Extract, parse and merge one statement. The merge and the run bookkeeping
/// commit together; on error the document leaves only a failed run behind.
pub fn ingest_document(conn: &Connection, path: &Path, grammar: &RowGrammar) -> Result<DocumentReport> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let checksum = compute_checksum(path).ok();
    let run_id = begin_run(conn, &filename, checksum.as_deref())?;
    log::info!("run {run_id}: ingesting {filename}");

    match ingest_into_run(conn, path, grammar, run_id) {
        Ok(report) => {
            log::info!(
                "run {run_id}: {} new, {} duplicate, {} conflict, {} warning(s)",
                report.new,
                report.duplicates,
                report.conflicts.len(),
                report.parse_warnings.len()
            );
            Ok(report)
        }
        Err(e) => {
            log::error!("run {run_id}: {filename} failed: {e}");
            fail_run(conn, run_id, &e.to_string())?;
            Err(e)
        }
    }
}

fn ingest_into_run(
    conn: &Connection,
    path: &Path,
    grammar: &RowGrammar,
    run_id: i64,
) -> Result<DocumentReport> {
    let document = Document::open(path)?;
    let parsed = parse_document(document.lines(), grammar, document.name());
    for w in &parsed.warnings {
        log::warn!("{} page {} line {}: {} ({})", document.name(), w.page, w.line, w.reason, w.text.trim());
    }

    let tx = conn.unchecked_transaction()?;
    let merged = merge_candidates(&tx, run_id, &parsed.candidates)?;
    let report = DocumentReport {
        run_id,
        filename: document.name().to_string(),
        pages: document.page_count(),
        new: merged.new,
        duplicates: merged.duplicates,
        conflicts: merged.conflicts,
        parse_warnings: parsed.warnings,
    };
    record_warnings(&tx, run_id, &report.parse_warnings, &report.conflicts)?;
    finish_run(&tx, run_id, &report)?;
    tx.commit()?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DocumentFailure {
    pub path: PathBuf,
    pub error: LedgerError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<DocumentReport>,
    pub failed: Vec<DocumentFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn new_count(&self) -> usize {
        self.succeeded.iter().map(|r| r.new).sum()
    }

    pub fn duplicate_count(&self) -> usize {
        self.succeeded.iter().map(|r| r.duplicates).sum()
    }

    pub fn conflict_count(&self) -> usize {
        self.succeeded.iter().map(|r| r.conflicts.len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.succeeded.iter().map(|r| r.parse_warnings.len()).sum()
    }

    pub fn absorb(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// `Err(BatchIncomplete)` when any document failed.
    pub fn into_result(self) -> Result<Self> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(LedgerError::BatchIncomplete {
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }
}

/// Ingest each path in order. A failing document is recorded and the batch
/// moves on; `on_document` sees every outcome as it happens.
pub fn ingest_paths<F>(
    conn: &Connection,
    paths: &[PathBuf],
    grammar: &RowGrammar,
    mut on_document: F,
) -> BatchReport
where
    F: FnMut(&Path, std::result::Result<&DocumentReport, &LedgerError>),
{
    let mut batch = BatchReport::default();
    for path in paths {
        match ingest_document(conn, path, grammar) {
            Ok(report) => {
                on_document(path, Ok(&report));
                batch.succeeded.push(report);
            }
            Err(error) => {
                on_document(path, Err(&error));
                batch.failed.push(DocumentFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }
    batch
}

pub fn ingest_folder<F>(conn: &Connection, dir: &Path, grammar: &RowGrammar, on_document: F) -> Result<BatchReport>
where
    F: FnMut(&Path, std::result::Result<&DocumentReport, &LedgerError>),
{
    let files = statement_files(dir)?;
    if files.is_empty() {
        log::warn!("no statement documents in {}", dir.display());
    }
    Ok(ingest_paths(conn, &files, grammar, on_document))
}
