use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS ingestion_runs (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    checksum TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL DEFAULT 'running',
    new_count INTEGER DEFAULT 0,
    duplicate_count INTEGER DEFAULT 0,
    conflict_count INTEGER DEFAULT 0,
    warning_count INTEGER DEFAULT 0,
    error TEXT
);

CREATE TABLE IF NOT EXISTS run_warnings (
    id INTEGER PRIMARY KEY,
    run_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    page INTEGER,
    line INTEGER,
    message TEXT NOT NULL,
    FOREIGN KEY (run_id) REFERENCES ingestion_runs(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    reference TEXT,
    balance TEXT,
    category_id INTEGER,
    category_source TEXT,
    source_document TEXT NOT NULL,
    run_id INTEGER,
    ingested_at TEXT NOT NULL,
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (run_id) REFERENCES ingestion_runs(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    pattern TEXT NOT NULL,
    match_type TEXT DEFAULT 'contains',
    category_id INTEGER NOT NULL,
    priority INTEGER DEFAULT 0,
    hit_count INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
";

// (name, description)
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Salary", "Payroll and regular income"),
    ("Groceries", "Supermarkets and food shops"),
    ("Dining", "Restaurants, cafes, delivery"),
    ("Housing", "Rent, maintenance, furnishing"),
    ("Utilities", "Electricity, water, internet, phone"),
    ("Transport", "Fuel, public transport, parking"),
    ("Health", "Pharmacy, doctors, insurance"),
    ("Cash", "ATM withdrawals"),
    ("Transfers", "Transfers between own accounts"),
    ("Fees", "Bank fees and charges"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Fresh initialized store that lives only as long as the handle.
#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (name, description) in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (name, description) VALUES (?1, ?2)",
                rusqlite::params![name, description],
            )?;
        }
    }
    Ok(())
}

pub(crate) fn decimal_column(idx: usize, raw: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn date_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
