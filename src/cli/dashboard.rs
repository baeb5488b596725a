use std::path::PathBuf;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregator::{self, CategoryTotal, Flow, MonthlyAggregate, Totals};
use crate::cli::{open_ledger, PeriodArgs};
use crate::error::Result;
use crate::models::Transaction;

#[derive(Debug, Serialize)]
struct DailyPoint {
    date: NaiveDate,
    net: Decimal,
}

#[derive(Debug, Serialize)]
struct Dashboard {
    period: String,
    totals: Totals,
    monthly: Vec<MonthlyAggregate>,
    expense_categories: Vec<CategoryTotal>,
    income_categories: Vec<CategoryTotal>,
    daily_net: Vec<DailyPoint>,
    transactions: Vec<Transaction>,
}

fn build(transactions: Vec<Transaction>, label: String) -> Dashboard {
    Dashboard {
        period: label,
        totals: aggregator::totals(&transactions),
        monthly: aggregator::monthly(&transactions),
        expense_categories: aggregator::category_totals(&transactions, Flow::Expense),
        income_categories: aggregator::category_totals(&transactions, Flow::Income),
        daily_net: aggregator::daily_net(&transactions)
            .into_iter()
            .map(|(date, net)| DailyPoint { date, net })
            .collect(),
        transactions,
    }
}

pub fn run(period: PeriodArgs, output: Option<PathBuf>) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let period = period.period()?;
    let dashboard = build(crate::ledger::load_transactions(&conn, &period)?, period.label());
    let json = serde_json::to_string_pretty(&dashboard)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, format!("{json}\n"))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
