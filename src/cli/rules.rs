use comfy_table::{Cell, Table};

use crate::categorizer::{add_rule, deactivate_rule, list_rules};
use crate::cli::open_ledger;
use crate::error::{LedgerError, Result};
use crate::models::MatchType;

pub fn add(pattern: &str, category: &str, match_type: &str, priority: i64) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let kind = MatchType::from_key(match_type).ok_or_else(|| {
        LedgerError::Other(format!(
            "Unknown match type '{match_type}' (expected contains, starts_with or regex)"
        ))
    })?;
    let id = add_rule(&conn, pattern, category, kind, priority)?;
    println!("Added rule {id}: '{pattern}' \u{2192} {category}");
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, conn) = open_ledger()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Category", "Priority", "Hits"]);
    for rule in list_rules(&conn)? {
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(rule.pattern),
            Cell::new(rule.match_type.key()),
            Cell::new(rule.category_name),
            Cell::new(rule.priority),
            Cell::new(rule.hit_count),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let rule = deactivate_rule(&conn, id)?;
    println!("Deleted rule {id}: '{}' \u{2192} {}", rule.pattern, rule.category_name);
    Ok(())
}
