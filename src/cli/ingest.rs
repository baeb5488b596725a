use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::categorizer::categorize_transactions;
use crate::cli::open_ledger;
use crate::error::{LedgerError, Result};
use crate::grammar::RowGrammar;
use crate::importer::{ingest_folder, ingest_paths, BatchReport, DocumentReport};

fn print_document(path: &Path, outcome: std::result::Result<&DocumentReport, &LedgerError>) {
    match outcome {
        Ok(report) => {
            println!(
                "{} {}: {} new, {} duplicate, {} conflict, {} warning(s) [run {}, {} page(s)]",
                "✓".green(),
                report.filename,
                report.new,
                report.duplicates,
                report.conflicts.len(),
                report.parse_warnings.len(),
                report.run_id,
                report.pages
            );
            for w in &report.parse_warnings {
                let line = format!("    page {} line {}: {}: {}", w.page, w.line, w.reason, w.text.trim());
                println!("{}", line.yellow());
            }
            for c in &report.conflicts {
                let line = format!(
                    "    page {} line {}: conflicts with stored record ({}): {}",
                    c.page,
                    c.line,
                    c.fields.join(", "),
                    c.description
                );
                println!("{}", line.yellow());
            }
        }
        Err(e) => println!("{} {}: {e}", "✗".red(), path.display()),
    }
}

pub fn run(paths: Vec<PathBuf>, grammar: Option<String>, no_categorize: bool) -> Result<()> {
    let (settings, conn) = open_ledger()?;
    let grammar = RowGrammar::resolve(grammar.as_deref().unwrap_or(&settings.grammar))?;

    let paths = if paths.is_empty() {
        let dir = settings.statements_dir.as_ref().ok_or_else(|| {
            LedgerError::Other(
                "No statement paths given and no statements dir configured (see `otpledger init --statements-dir`)"
                    .to_string(),
            )
        })?;
        vec![PathBuf::from(dir)]
    } else {
        paths
    };

    let mut batch = BatchReport::default();
    for path in &paths {
        let part = if path.is_dir() {
            ingest_folder(&conn, path, &grammar, print_document)?
        } else {
            ingest_paths(&conn, std::slice::from_ref(path), &grammar, print_document)
        };
        batch.absorb(part);
    }
    if batch.total() == 0 {
        println!("No statement documents found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Documents", "Failed", "New", "Duplicate", "Conflict", "Warnings"]);
    table.add_row(vec![
        Cell::new(batch.total()),
        Cell::new(batch.failed.len()),
        Cell::new(batch.new_count()),
        Cell::new(batch.duplicate_count()),
        Cell::new(batch.conflict_count()),
        Cell::new(batch.warning_count()),
    ]);
    println!("\nBatch summary\n{table}");
    for failure in &batch.failed {
        let line = format!("  failed: {}: {}", failure.path.display(), failure.error);
        println!("{}", line.red());
    }

    if !no_categorize {
        let result = categorize_transactions(&conn)?;
        println!(
            "{} categorized by rule, {} by history, {} still uncategorized",
            result.by_rule, result.by_history, result.uncategorized
        );
    }

    batch.into_result().map(|_| ())
}
