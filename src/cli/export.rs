use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::cli::{open_ledger, PeriodArgs};
use crate::error::Result;
use crate::ledger::load_transactions;
use crate::models::Transaction;

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    date: String,
    amount: String,
    description: &'a str,
    reference: Option<&'a str>,
    balance: Option<String>,
    category: Option<&'a str>,
    category_source: Option<&'static str>,
    source_document: &'a str,
}

impl<'a> From<&'a Transaction> for CsvRow<'a> {
    fn from(t: &'a Transaction) -> Self {
        Self {
            id: &t.id,
            date: t.date.to_string(),
            amount: t.amount.to_string(),
            description: &t.description,
            reference: t.reference.as_deref(),
            balance: t.balance.map(|b| b.to_string()),
            category: t.category.as_deref(),
            category_source: t.category_source.map(|s| s.key()),
            source_document: &t.source_document,
        }
    }
}

pub(crate) fn write_csv<W: Write>(writer: W, transactions: &[Transaction]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for t in transactions {
        wtr.serialize(CsvRow::from(t))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn run(period: PeriodArgs, output: Option<PathBuf>) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let period = period.period()?;
    let transactions = load_transactions(&conn, &period)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_csv(std::fs::File::create(&path)?, &transactions)?;
            eprintln!("Wrote {} transaction(s) to {}", transactions.len(), path.display());
        }
        None => write_csv(std::io::stdout().lock(), &transactions)?,
    }
    Ok(())
}
