pub mod assign;
pub mod categories;
pub mod categorize;
pub mod dashboard;
pub mod export;
pub mod ingest;
pub mod init;
pub mod report;
pub mod rules;
pub mod runs;
pub mod status;
pub mod transactions;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::{LedgerError, Result};
use crate::ledger::Period;
use crate::settings::{load_settings, Settings};

/// Settings plus a connection to the configured ledger database.
pub(crate) fn open_ledger() -> Result<(Settings, Connection)> {
    let settings = load_settings()?;
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(LedgerError::Other(format!(
            "Database not found at {}. Run `otpledger init` first.",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    Ok((settings, conn))
}

fn parse_month_opt(month: &Option<String>) -> Result<(Option<i32>, Option<u32>)> {
    let Some(m) = month else {
        return Ok((None, None));
    };
    let invalid = || LedgerError::Other(format!("invalid month '{m}' (expected YYYY-MM)"));
    let (year, month) = m.split_once('-').ok_or_else(invalid)?;
    Ok((
        Some(year.parse().map_err(|_| invalid())?),
        Some(month.parse().map_err(|_| invalid())?),
    ))
}

#[derive(Args, Debug, Clone, Default)]
pub struct PeriodArgs {
    /// Month filter: YYYY-MM
    #[arg(long, conflicts_with = "year")]
    pub month: Option<String>,
    /// Year filter: YYYY
    #[arg(long)]
    pub year: Option<i32>,
    /// Start date: YYYY-MM-DD (requires --to)
    #[arg(long = "from")]
    pub from_date: Option<String>,
    /// End date: YYYY-MM-DD (requires --from)
    #[arg(long = "to")]
    pub to_date: Option<String>,
}

impl PeriodArgs {
    pub fn period(&self) -> Result<Period> {
        if self.month.is_some() && self.year.is_some() {
            return Err(LedgerError::Other(
                "--month already names a year; drop --year".to_string(),
            ));
        }
        let (my, mm) = parse_month_opt(&self.month)?;
        Period::from_args(
            my.or(self.year),
            mm,
            self.from_date.as_deref(),
            self.to_date.as_deref(),
        )
    }
}

#[derive(Parser)]
#[command(
    name = "otpledger",
    version,
    about = "Ingest OTP Bank statement PDFs into a local ledger and summarize spending."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for ledger data (default: platform data dir/otpledger)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Row grammar: a preset (otp, delimited) or a JSON grammar file
        #[arg(long)]
        grammar: Option<String>,
        /// Default folder scanned by `ingest`
        #[arg(long = "statements-dir")]
        statements_dir: Option<String>,
    },
    /// Ingest statement documents, then categorize new transactions.
    Ingest {
        /// Statement files or folders (default: the configured statements dir)
        paths: Vec<PathBuf>,
        /// Override the configured row grammar for this batch
        #[arg(long)]
        grammar: Option<String>,
        /// Skip categorization after ingesting
        #[arg(long = "no-categorize")]
        no_categorize: bool,
    },
    /// Apply rules and description history to uncategorized transactions.
    Categorize,
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Manually set or clear the category of transactions.
    Assign {
        /// Transaction ID or a unique prefix of one
        #[arg(required_unless_present = "keyword")]
        id: Option<String>,
        /// Category name to assign
        #[arg(long)]
        category: Option<String>,
        /// Clear the category; rules will not fill it in again
        #[arg(long, conflicts_with = "category")]
        clear: bool,
        /// Apply to every transaction with the same description
        #[arg(long = "same-description")]
        same_description: bool,
        /// Apply to every transaction whose description contains this text
        #[arg(long, conflicts_with_all = ["id", "same_description"])]
        keyword: Option<String>,
    },
    /// List transactions.
    Transactions {
        #[command(flatten)]
        period: PeriodArgs,
        /// Only uncategorized transactions
        #[arg(long)]
        uncategorized: bool,
        /// Only transactions in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Write every dashboard view as one JSON document.
    Dashboard {
        #[command(flatten)]
        period: PeriodArgs,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Inspect ingestion runs.
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Export transactions to CSV.
    Export {
        #[command(flatten)]
        period: PeriodArgs,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show current configuration and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List categories with transaction counts.
    List,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a categorization rule.
    Add {
        /// Pattern to match against transaction descriptions
        pattern: String,
        /// Category name to assign
        #[arg(long)]
        category: String,
        /// Match type: contains, starts_with, regex
        #[arg(long = "match-type", default_value = "contains")]
        match_type: String,
        /// Rule priority (higher wins; equal priorities apply in creation order)
        #[arg(long, default_value = "0")]
        priority: i64,
    },
    /// List active rules in evaluation order.
    List,
    /// Delete (deactivate) a rule by ID.
    Delete {
        /// Rule ID (shown in `otpledger rules list`)
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Income, expense and net per month.
    Monthly {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Totals per category.
    Categories {
        #[command(flatten)]
        period: PeriodArgs,
        /// Show income categories instead of expenses
        #[arg(long)]
        income: bool,
    },
    /// Overall income, expense and net.
    Totals {
        #[command(flatten)]
        period: PeriodArgs,
    },
}

#[derive(Subcommand)]
pub enum RunsCommands {
    /// Recent ingestion runs.
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// One run with its warnings.
    Show { id: i64 },
}
