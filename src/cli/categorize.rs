use crate::categorizer::categorize_transactions;
use crate::cli::open_ledger;
use crate::error::Result;

pub fn run() -> Result<()> {
    let (_, conn) = open_ledger()?;
    let result = categorize_transactions(&conn)?;
    println!(
        "{} categorized by rule, {} by history, {} still uncategorized",
        result.by_rule, result.by_history, result.uncategorized
    );
    Ok(())
}
