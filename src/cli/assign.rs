use crate::cli::open_ledger;
use crate::error::{LedgerError, Result};
use crate::fmt::short_id;
use crate::ledger::resolve_transaction_id;
use crate::reviewer::{assign_by_keyword, assign_category, assign_same_description};

pub fn run(
    id: Option<String>,
    category: Option<String>,
    clear: bool,
    same_description: bool,
    keyword: Option<String>,
) -> Result<()> {
    if category.is_none() && !clear {
        return Err(LedgerError::Other(
            "Pass --category NAME or --clear".to_string(),
        ));
    }
    let (_, conn) = open_ledger()?;
    let target = category.as_deref();
    let label = target.unwrap_or("(none)");

    if let Some(keyword) = keyword {
        let n = assign_by_keyword(&conn, &keyword, target)?;
        println!("{n} transaction(s) matching '{keyword}' set to {label}");
        return Ok(());
    }

    let prefix = id.ok_or_else(|| LedgerError::Other("Pass a transaction ID or --keyword".to_string()))?;
    let txn_id = resolve_transaction_id(&conn, &prefix)?;
    if same_description {
        let n = assign_same_description(&conn, &txn_id, target)?;
        println!("{n} transaction(s) with the same description set to {label}");
    } else {
        assign_category(&conn, &txn_id, target)?;
        println!("Transaction {} set to {label}", short_id(&txn_id));
    }
    Ok(())
}
