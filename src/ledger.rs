use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::{date_column, decimal_column};
use crate::error::{LedgerError, Result};
use crate::models::{Category, CategorySource, Transaction};

/// Date window for reads. Ranges are inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    All,
    Year(i32),
    Month(i32, u32),
    Range(NaiveDate, NaiveDate),
}

impl Period {
    pub fn from_args(
        year: Option<i32>,
        month: Option<u32>,
        from_date: Option<&str>,
        to_date: Option<&str>,
    ) -> Result<Self> {
        match (from_date, to_date) {
            (Some(from), Some(to)) => {
                let (from, to) = (parse_day(from)?, parse_day(to)?);
                if from > to {
                    return Err(LedgerError::Other(format!("--from {from} is after --to {to}")));
                }
                return Ok(Self::Range(from, to));
            }
            (Some(_), None) => {
                return Err(LedgerError::Other(
                    "--from requires --to (both date boundaries must be specified)".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(LedgerError::Other(
                    "--to requires --from (both date boundaries must be specified)".to_string(),
                ));
            }
            (None, None) => {}
        }
        match (year, month) {
            (Some(y), Some(m)) if (1..=12).contains(&m) => Ok(Self::Month(y, m)),
            (Some(_), Some(m)) => Err(LedgerError::Other(format!("invalid month: {m}"))),
            (None, Some(_)) => Err(LedgerError::Other("--month requires --year".to_string())),
            (Some(y), None) => Ok(Self::Year(y)),
            (None, None) => Ok(Self::All),
        }
    }

    fn filter(&self) -> (String, Vec<String>) {
        match *self {
            Self::All => ("1 = 1".to_string(), Vec::new()),
            Self::Year(y) => ("t.date LIKE ?1".to_string(), vec![format!("{y:04}-%")]),
            Self::Month(y, m) => ("t.date LIKE ?1".to_string(), vec![format!("{y:04}-{m:02}-%")]),
            Self::Range(from, to) => (
                "t.date BETWEEN ?1 AND ?2".to_string(),
                vec![from.to_string(), to.to_string()],
            ),
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Self::All => "All time".to_string(),
            Self::Year(y) => y.to_string(),
            Self::Month(y, m) => format!("{y:04}-{m:02}"),
            Self::Range(from, to) => format!("{from} to {to}"),
        }
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| LedgerError::Other(format!("invalid date '{raw}' (expected YYYY-MM-DD)")))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

const TRANSACTION_SELECT: &str = "SELECT t.id, t.date, t.amount, t.description, t.reference, t.balance, \
     c.name, t.category_source, t.source_document, t.ingested_at \
     FROM transactions t LEFT JOIN categories c ON t.category_id = c.id";

fn transaction_from_row(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let balance: Option<String> = row.get(5)?;
    let source: Option<String> = row.get(7)?;
    Ok(Transaction {
        id: row.get(0)?,
        date: date_column(1, &row.get::<_, String>(1)?)?,
        amount: decimal_column(2, &row.get::<_, String>(2)?)?,
        description: row.get(3)?,
        reference: row.get(4)?,
        balance: balance.map(|b| decimal_column(5, &b)).transpose()?,
        category: row.get(6)?,
        category_source: source.as_deref().and_then(CategorySource::from_key),
        source_document: row.get(8)?,
        ingested_at: row.get(9)?,
    })
}

/// Transactions in the period, oldest first; rows of one day keep ingestion order.
pub fn load_transactions(conn: &Connection, period: &Period) -> Result<Vec<Transaction>> {
    let (clause, params) = period.filter();
    let mut stmt = conn.prepare(&format!(
        "{TRANSACTION_SELECT} WHERE {clause} ORDER BY t.date, t.rowid"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), transaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn transactions_for_month(conn: &Connection, year: i32, month: u32) -> Result<Vec<Transaction>> {
    load_transactions(conn, &Period::Month(year, month))
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Transaction> {
    conn.query_row(&format!("{TRANSACTION_SELECT} WHERE t.id = ?1"), [id], transaction_from_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::UnknownTransaction(id.to_string()),
            other => other.into(),
        })
}

/// Full identifier for a unique prefix of one.
pub fn resolve_transaction_id(conn: &Connection, prefix: &str) -> Result<String> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LedgerError::UnknownTransaction(prefix));
    }
    let mut stmt = conn.prepare("SELECT id FROM transactions WHERE id LIKE ?1 LIMIT 2")?;
    let ids: Vec<String> = stmt
        .query_map([format!("{prefix}%")], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match ids.as_slice() {
        [id] => Ok(id.clone()),
        [] => Err(LedgerError::UnknownTransaction(prefix)),
        _ => Err(LedgerError::Other(format!("Transaction prefix '{prefix}' is ambiguous"))),
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub fn category_id(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row("SELECT id FROM categories WHERE name = ?1", [name], |row| row.get(0))
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::UnknownCategory(name.to_string()),
            other => other.into(),
        })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.description, COUNT(t.id) \
         FROM categories c LEFT JOIN transactions t ON t.category_id = c.id \
         GROUP BY c.id ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                transaction_count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn add_category(conn: &Connection, name: &str, description: Option<&str>) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::Other("Category name cannot be empty".to_string()));
    }
    let exists: bool = conn
        .prepare("SELECT 1 FROM categories WHERE name = ?1")?
        .exists([name])?;
    if exists {
        return Err(LedgerError::DuplicateCategory(name.to_string()));
    }
    conn.execute(
        "INSERT INTO categories (name, description) VALUES (?1, ?2)",
        rusqlite::params![name, description],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use rust_decimal_macros::dec;

    fn insert(conn: &Connection, id: &str, date: &str, amount: &str, description: &str) {
        conn.execute(
            "INSERT INTO transactions (id, date, amount, description, source_document, ingested_at) \
             VALUES (?1, ?2, ?3, ?4, 'jan.pdf', '2024-02-01T00:00:00Z')",
            rusqlite::params![id, date, amount, description],
        )
        .unwrap();
    }

    fn seeded() -> Connection {
        let conn = open_in_memory().unwrap();
        insert(&conn, "aa01", "2024-01-20", "2000.00", "PAYROLL");
        insert(&conn, "aa02", "2024-01-05", "-54.32", "GROCERY STORE");
        insert(&conn, "bb03", "2024-02-03", "-12.00", "CAFE");
        insert(&conn, "cc04", "2023-12-31", "-5.00", "FEE");
        conn
    }

    #[test]
    fn test_period_from_args() {
        assert_eq!(Period::from_args(None, None, None, None).unwrap(), Period::All);
        assert_eq!(Period::from_args(Some(2024), None, None, None).unwrap(), Period::Year(2024));
        assert_eq!(
            Period::from_args(Some(2024), Some(1), None, None).unwrap(),
            Period::Month(2024, 1)
        );
        assert!(Period::from_args(None, None, Some("2024-01-01"), None).is_err());
        assert!(Period::from_args(None, None, None, Some("2024-01-31")).is_err());
        assert!(Period::from_args(None, Some(3), None, None).is_err());
        assert!(Period::from_args(Some(2024), Some(13), None, None).is_err());
        assert!(Period::from_args(None, None, Some("2024-02-01"), Some("2024-01-01")).is_err());
    }

    #[test]
    fn test_load_transactions_is_chronological() {
        let conn = seeded();
        let all = load_transactions(&conn, &Period::All).unwrap();
        let ids: Vec<&str> = all.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["cc04", "aa02", "aa01", "bb03"]);
        assert_eq!(all[1].amount, dec!(-54.32));
        assert!(all[1].category.is_none());
    }

    #[test]
    fn test_period_filters() {
        let conn = seeded();
        assert_eq!(transactions_for_month(&conn, 2024, 1).unwrap().len(), 2);
        assert_eq!(load_transactions(&conn, &Period::Year(2024)).unwrap().len(), 3);
        let range = Period::from_args(None, None, Some("2023-12-31"), Some("2024-01-05")).unwrap();
        let rows = load_transactions(&conn, &range).unwrap();
        assert_eq!(rows.len(), 2);
        let ids: Vec<&str> = rows.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["cc04", "aa02"]);
    }

    #[test]
    fn test_resolve_transaction_id() {
        let conn = seeded();
        assert_eq!(resolve_transaction_id(&conn, "bb").unwrap(), "bb03");
        assert!(matches!(
            resolve_transaction_id(&conn, "ff"),
            Err(LedgerError::UnknownTransaction(_))
        ));
        assert!(matches!(resolve_transaction_id(&conn, "aa"), Err(LedgerError::Other(_))));
        assert!(resolve_transaction_id(&conn, "a%").is_err());
    }

    #[test]
    fn test_get_transaction_unknown() {
        let conn = seeded();
        assert_eq!(get_transaction(&conn, "aa01").unwrap().description, "PAYROLL");
        assert!(matches!(
            get_transaction(&conn, "nope"),
            Err(LedgerError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn test_add_and_list_categories() {
        let conn = open_in_memory().unwrap();
        add_category(&conn, "Travel", Some("Trips")).unwrap();
        assert!(matches!(
            add_category(&conn, "Travel", None),
            Err(LedgerError::DuplicateCategory(_))
        ));
        assert!(add_category(&conn, "  ", None).is_err());
        let names: Vec<String> = list_categories(&conn).unwrap().into_iter().map(|c| c.name).collect();
        assert!(names.contains(&"Travel".to_string()));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_category_id_unknown() {
        let conn = open_in_memory().unwrap();
        assert!(category_id(&conn, "Groceries").is_ok());
        assert!(matches!(category_id(&conn, "groceries"), Err(LedgerError::UnknownCategory(_))));
    }
}
