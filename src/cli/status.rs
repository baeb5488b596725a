use crate::cli::open_ledger;
use crate::error::Result;
use crate::importer::list_runs;
use crate::settings::{load_settings, settings_file_exists};

fn count(conn: &rusqlite::Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

pub fn run() -> Result<()> {
    let settings = load_settings()?;
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Grammar:    {}", settings.grammar);
    println!(
        "Statements: {}",
        settings.statements_dir.as_deref().unwrap_or("(not set)")
    );

    if !settings_file_exists() || !db_path.exists() {
        println!();
        println!("Database not found. Run `otpledger init` to set up.");
        return Ok(());
    }

    let (_, conn) = open_ledger()?;
    let transactions = count(&conn, "SELECT count(*) FROM transactions")?;
    let uncategorized = count(&conn, "SELECT count(*) FROM transactions WHERE category_id IS NULL")?;
    let categories = count(&conn, "SELECT count(*) FROM categories")?;
    let rules = count(&conn, "SELECT count(*) FROM rules WHERE is_active = 1")?;
    let runs = count(&conn, "SELECT count(*) FROM ingestion_runs")?;

    println!();
    println!("Transactions:   {transactions}");
    println!("Uncategorized:  {uncategorized}");
    println!("Categories:     {categories}");
    println!("Rules:          {rules}");
    println!("Runs:           {runs}");
    if let Some(last) = list_runs(&conn, 1)?.into_iter().next() {
        println!(
            "Last run:       {} ({}, {})",
            last.filename,
            last.status.key(),
            last.started_at
        );
    }
    Ok(())
}
