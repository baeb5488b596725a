use rusqlite::Connection;

use crate::error::{LedgerError, Result};
use crate::ledger::{category_id, get_transaction};

fn target_category(conn: &Connection, category: Option<&str>) -> Result<Option<i64>> {
    category.map(|name| category_id(conn, name)).transpose()
}

fn set_manual(conn: &Connection, ids: &[String], category_id: Option<i64>) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "UPDATE transactions SET category_id = ?1, category_source = 'manual' WHERE id = ?2",
        )?;
        for id in ids {
            stmt.execute(rusqlite::params![category_id, id])?;
        }
    }
    tx.commit()?;
    Ok(ids.len())
}

/// Manually set (or with `None`, clear) one transaction's category.
/// The categorizer never changes it afterwards.
pub fn assign_category(conn: &Connection, transaction_id: &str, category: Option<&str>) -> Result<()> {
    let txn = get_transaction(conn, transaction_id)?;
    let cat_id = target_category(conn, category)?;
    set_manual(conn, &[txn.id], cat_id)?;
    Ok(())
}

/// Apply a manual assignment to every transaction sharing the description of
/// `transaction_id`. Returns the number of transactions updated.
pub fn assign_same_description(
    conn: &Connection,
    transaction_id: &str,
    category: Option<&str>,
) -> Result<usize> {
    let txn = get_transaction(conn, transaction_id)?;
    let cat_id = target_category(conn, category)?;
    let ids: Vec<String> = conn
        .prepare("SELECT id FROM transactions WHERE description = ?1")?
        .query_map([&txn.description], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    set_manual(conn, &ids, cat_id)
}

/// Apply a manual assignment to every transaction whose description contains
/// `keyword`, ignoring case.
pub fn assign_by_keyword(conn: &Connection, keyword: &str, category: Option<&str>) -> Result<usize> {
    let needle = keyword.trim().to_uppercase();
    if needle.is_empty() {
        return Err(LedgerError::Other("Keyword cannot be empty".to_string()));
    }
    let cat_id = target_category(conn, category)?;
    let mut stmt = conn.prepare("SELECT id, description FROM transactions")?;
    let ids: Vec<String> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|(_, description)| description.to_uppercase().contains(&needle))
        .map(|(id, _)| id)
        .collect();
    set_manual(conn, &ids, cat_id)
}
