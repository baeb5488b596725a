use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::models::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Expense is reported as a positive magnitude; `net = income - expense`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAggregate {
    pub month: YearMonth,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub count: usize,
    pub uncategorized: usize,
}

impl MonthlyAggregate {
    fn empty(month: YearMonth) -> Self {
        Self {
            month,
            income: Decimal::ZERO,
            expense: Decimal::ZERO,
            net: Decimal::ZERO,
            count: 0,
            uncategorized: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub count: usize,
    pub uncategorized: usize,
    pub uncategorized_expense: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Expense,
    Income,
}

impl Flow {
    fn includes(&self, txn: &Transaction) -> bool {
        match self {
            Self::Expense => txn.is_expense(),
            Self::Income => txn.is_income(),
        }
    }
}

/// Per-month income, expense and counts in chronological order. Months with
/// no transactions are absent.
pub fn monthly(transactions: &[Transaction]) -> Vec<MonthlyAggregate> {
    let mut months: BTreeMap<YearMonth, MonthlyAggregate> = BTreeMap::new();
    for txn in transactions {
        let key = YearMonth::of(txn.date);
        let agg = months.entry(key).or_insert_with(|| MonthlyAggregate::empty(key));
        if txn.is_income() {
            agg.income += txn.amount;
        } else {
            agg.expense += txn.amount.abs();
        }
        agg.count += 1;
        if !txn.is_categorized() {
            agg.uncategorized += 1;
        }
    }
    months
        .into_values()
        .map(|mut agg| {
            agg.net = agg.income - agg.expense;
            agg
        })
        .collect()
}

/// Totals per category for one direction of money flow, largest first with
/// ties broken by name. Uncategorized transactions are left out.
pub fn category_totals(transactions: &[Transaction], flow: Flow) -> Vec<CategoryTotal> {
    let mut by_category: HashMap<&str, CategoryTotal> = HashMap::new();
    for txn in transactions.iter().filter(|t| flow.includes(t)) {
        let Some(name) = txn.category.as_deref() else {
            continue;
        };
        let entry = by_category.entry(name).or_insert_with(|| CategoryTotal {
            category: name.to_string(),
            total: Decimal::ZERO,
            count: 0,
        });
        entry.total += txn.amount.abs();
        entry.count += 1;
    }
    let mut totals: Vec<CategoryTotal> = by_category.into_values().collect();
    totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
    totals
}

pub fn totals(transactions: &[Transaction]) -> Totals {
    let mut t = Totals::default();
    for txn in transactions {
        if txn.is_income() {
            t.income += txn.amount;
        } else {
            t.expense += txn.amount.abs();
        }
        t.count += 1;
        if !txn.is_categorized() {
            t.uncategorized += 1;
            if txn.is_expense() {
                t.uncategorized_expense += txn.amount.abs();
            }
        }
    }
    t.net = t.income - t.expense;
    t
}

/// Net amount per calendar day, oldest first.
pub fn daily_net(transactions: &[Transaction]) -> Vec<(NaiveDate, Decimal)> {
    let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for txn in transactions {
        *days.entry(txn.date).or_insert(Decimal::ZERO) += txn.amount;
    }
    days.into_iter().collect()
}
