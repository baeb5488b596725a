use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_ledger, PeriodArgs};
use crate::error::Result;
use crate::fmt::{money, short_id};
use crate::ledger::{load_transactions, transactions_for_month, Period};

pub fn run(period: PeriodArgs, uncategorized: bool, category: Option<String>) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let period = period.period()?;
    let loaded = match period {
        Period::Month(year, month) => transactions_for_month(&conn, year, month)?,
        other => load_transactions(&conn, &other)?,
    };
    let rows: Vec<_> = loaded
        .into_iter()
        .filter(|t| !uncategorized || !t.is_categorized())
        .filter(|t| category.is_none() || t.category == category)
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Category", "Source"]);
    for t in &rows {
        let amount = if t.is_income() {
            money(t.amount).green()
        } else {
            money(t.amount).red()
        };
        table.add_row(vec![
            Cell::new(short_id(&t.id)),
            Cell::new(t.date),
            Cell::new(&t.description),
            Cell::new(amount),
            Cell::new(t.category.as_deref().unwrap_or("-")),
            Cell::new(t.category_source.map(|s| s.key()).unwrap_or("")),
        ]);
    }
    println!("Transactions: {} ({})\n{table}", period.label(), rows.len());
    Ok(())
}
