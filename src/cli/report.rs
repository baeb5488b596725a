use colored::Colorize;
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use crate::aggregator::{self, Flow};
use crate::cli::{open_ledger, PeriodArgs};
use crate::error::Result;
use crate::fmt::money;
use crate::ledger::load_transactions;

fn net_cell(net: Decimal) -> Cell {
    if net >= Decimal::ZERO {
        Cell::new(money(net).green())
    } else {
        Cell::new(money(net).red())
    }
}

pub fn monthly(period: PeriodArgs) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let period = period.period()?;
    let txns = load_transactions(&conn, &period)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Income", "Expense", "Net", "Count", "Uncategorized"]);
    for m in aggregator::monthly(&txns) {
        table.add_row(vec![
            Cell::new(m.month),
            Cell::new(money(m.income)),
            Cell::new(money(m.expense)),
            net_cell(m.net),
            Cell::new(m.count),
            Cell::new(m.uncategorized),
        ]);
    }
    println!("Monthly summary: {}\n{table}", period.label());
    Ok(())
}

pub fn categories(period: PeriodArgs, income: bool) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let period = period.period()?;
    let txns = load_transactions(&conn, &period)?;
    let flow = if income { Flow::Income } else { Flow::Expense };
    let rows = aggregator::category_totals(&txns, flow);
    let grand: Decimal = rows.iter().map(|r| r.total).sum();

    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount", "%", "Count"]);
    for row in &rows {
        let pct = if grand.is_zero() {
            Decimal::ZERO
        } else {
            (row.total / grand * Decimal::ONE_HUNDRED).round_dp(1)
        };
        table.add_row(vec![
            Cell::new(&row.category),
            Cell::new(money(row.total)),
            Cell::new(format!("{pct}%")),
            Cell::new(row.count),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(money(grand)),
        Cell::new(""),
        Cell::new(""),
    ]);

    let totals = aggregator::totals(&txns);
    let title = if income { "Income by category" } else { "Expenses by category" };
    println!("{title}: {}\n{table}", period.label());
    if !income && totals.uncategorized_expense > Decimal::ZERO {
        let note = format!(
            "{} of expenses are uncategorized",
            money(totals.uncategorized_expense)
        );
        println!("{}", note.yellow());
    }
    Ok(())
}

pub fn totals(period: PeriodArgs) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let period = period.period()?;
    let t = aggregator::totals(&load_transactions(&conn, &period)?);

    let mut table = Table::new();
    table.set_header(vec!["", "Amount"]);
    table.add_row(vec![Cell::new("Income".green().bold()), Cell::new(money(t.income))]);
    table.add_row(vec![Cell::new("Expense".red().bold()), Cell::new(money(t.expense))]);
    table.add_row(vec![Cell::new("NET".bold()), net_cell(t.net)]);
    table.add_row(vec![Cell::new("Transactions"), Cell::new(t.count)]);
    table.add_row(vec![Cell::new("Uncategorized"), Cell::new(t.uncategorized)]);
    println!("Totals: {}\n{table}", period.label());
    Ok(())
}
