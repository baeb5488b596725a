use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::error::Result;
use crate::ledger::{add_category, list_categories};

pub fn add(name: &str, description: Option<&str>) -> Result<()> {
    let (_, conn) = open_ledger()?;
    add_category(&conn, name, description)?;
    println!("Added category: {}", name.trim());
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, conn) = open_ledger()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Description", "Transactions"]);
    for c in list_categories(&conn)? {
        table.add_row(vec![
            Cell::new(c.id),
            Cell::new(c.name),
            Cell::new(c.description.unwrap_or_default()),
            Cell::new(c.transaction_count),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}
