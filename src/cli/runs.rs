use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::error::Result;
use crate::importer::{get_run, list_runs};
use crate::models::RunStatus;

fn status_cell(status: RunStatus) -> Cell {
    match status {
        RunStatus::Completed => Cell::new(status.key().green()),
        RunStatus::Failed => Cell::new(status.key().red()),
        RunStatus::Running => Cell::new(status.key().yellow()),
    }
}

pub fn list(limit: usize) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let mut table = Table::new();
    table.set_header(vec![
        "ID", "File", "Started", "Status", "New", "Duplicate", "Conflict", "Warnings",
    ]);
    for run in list_runs(&conn, limit)? {
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(run.filename),
            Cell::new(run.started_at),
            status_cell(run.status),
            Cell::new(run.new_count),
            Cell::new(run.duplicate_count),
            Cell::new(run.conflict_count),
            Cell::new(run.warning_count),
        ]);
    }
    println!("Ingestion runs\n{table}");
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let (run, warnings) = get_run(&conn, id)?;

    println!("Run:        {}", run.id);
    println!("File:       {}", run.filename);
    println!("Checksum:   {}", run.checksum.as_deref().unwrap_or("(unknown)"));
    println!("Started:    {}", run.started_at);
    println!("Finished:   {}", run.finished_at.as_deref().unwrap_or("(not finished)"));
    println!("Status:     {}", run.status.key());
    if let Some(error) = &run.error {
        println!("Error:      {}", error.red());
    }
    println!(
        "Counts:     {} new, {} duplicate, {} conflict, {} warning(s)",
        run.new_count, run.duplicate_count, run.conflict_count, run.warning_count
    );

    if !warnings.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Kind", "Page", "Line", "Message"]);
        for w in warnings {
            table.add_row(vec![
                Cell::new(w.kind),
                Cell::new(w.page),
                Cell::new(w.line),
                Cell::new(w.message),
            ]);
        }
        println!("\nWarnings\n{table}");
    }
    Ok(())
}
