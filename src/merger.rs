use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::db::{date_column, decimal_column, now_timestamp};
use crate::error::Result;
use crate::models::{Candidate, ConflictWarning};

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    New,
    Duplicate,
    Conflict(Vec<&'static str>),
}

/// The fields of a stored transaction that a candidate is compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFields {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub balance: Option<Decimal>,
}

/// Balances are only compared when both sides have one.
pub fn classify(candidate: &Candidate, existing: Option<&StoredFields>) -> Classification {
    let Some(stored) = existing else {
        return Classification::New;
    };
    let mut differing = Vec::new();
    if stored.date != candidate.date {
        differing.push("date");
    }
    if stored.amount != candidate.amount {
        differing.push("amount");
    }
    if stored.description != candidate.description {
        differing.push("description");
    }
    if let (Some(a), Some(b)) = (stored.balance, candidate.balance) {
        if a != b {
            differing.push("balance");
        }
    }
    if differing.is_empty() {
        Classification::Duplicate
    } else {
        Classification::Conflict(differing)
    }
}

fn stored_fields(conn: &Connection, id: &str) -> Result<Option<StoredFields>> {
    let mut stmt = conn.prepare_cached(
        "SELECT date, amount, description, balance FROM transactions WHERE id = ?1",
    )?;
    let row = stmt
        .query_row([id], |row| {
            let balance: Option<String> = row.get(3)?;
            Ok(StoredFields {
                date: date_column(0, &row.get::<_, String>(0)?)?,
                amount: decimal_column(1, &row.get::<_, String>(1)?)?,
                description: row.get(2)?,
                balance: balance.map(|b| decimal_column(3, &b)).transpose()?,
            })
        })
        .optional()?;
    Ok(row)
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub new: usize,
    pub duplicates: usize,
    pub conflicts: Vec<ConflictWarning>,
}

/// Insert new candidates and classify the rest. Stored rows are never modified:
/// on conflict the existing record wins.
pub fn merge_candidates(conn: &Connection, run_id: i64, candidates: &[Candidate]) -> Result<MergeOutcome> {
    let mut outcome = MergeOutcome::default();
    let ingested_at = now_timestamp();

    for candidate in candidates {
        let existing = stored_fields(conn, &candidate.id)?;
        match classify(candidate, existing.as_ref()) {
            Classification::New => {
                conn.execute(
                    "INSERT INTO transactions \
                     (id, date, amount, description, reference, balance, source_document, run_id, ingested_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        candidate.id,
                        candidate.date.to_string(),
                        candidate.amount.to_string(),
                        candidate.description,
                        candidate.reference,
                        candidate.balance.map(|b| b.to_string()),
                        candidate.source_document,
                        run_id,
                        ingested_at,
                    ],
                )?;
                outcome.new += 1;
            }
            Classification::Duplicate => outcome.duplicates += 1,
            Classification::Conflict(fields) => {
                log::warn!(
                    "{}: transaction {} on page {} line {} conflicts with the stored record ({}); keeping stored",
                    candidate.source_document,
                    &candidate.id[..12.min(candidate.id.len())],
                    candidate.page,
                    candidate.line,
                    fields.join(", "),
                );
                outcome.conflicts.push(ConflictWarning {
                    transaction_id: candidate.id.clone(),
                    fields,
                    page: candidate.page,
                    line: candidate.line,
                    description: candidate.description.clone(),
                });
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::importer::begin_run;
    use rust_decimal_macros::dec;

    fn candidate(id: &str, amount: Decimal, description: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            amount,
            description: description.to_string(),
            reference: None,
            balance: None,
            page: 1,
            line: 1,
            source_document: "jan.pdf".to_string(),
        }
    }

    fn stored_description(conn: &Connection, id: &str) -> (String, String) {
        conn.query_row(
            "SELECT description, amount FROM transactions WHERE id = ?1",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_classify() {
        let c = candidate("a", dec!(-54.32), "GROCERY STORE");
        assert_eq!(classify(&c, None), Classification::New);

        let same = StoredFields {
            date: c.date,
            amount: c.amount,
            description: c.description.clone(),
            balance: None,
        };
        assert_eq!(classify(&c, Some(&same)), Classification::Duplicate);

        let different = StoredFields {
            amount: dec!(-50.00),
            description: "GROCERIES".to_string(),
            ..same.clone()
        };
        assert_eq!(
            classify(&c, Some(&different)),
            Classification::Conflict(vec!["amount", "description"])
        );
    }

    #[test]
    fn test_balance_only_compared_when_both_present() {
        let mut c = candidate("a", dec!(-1.00), "X");
        c.balance = Some(dec!(10.00));
        let stored = StoredFields {
            date: c.date,
            amount: c.amount,
            description: "X".to_string(),
            balance: None,
        };
        assert_eq!(classify(&c, Some(&stored)), Classification::Duplicate);
        let stored = StoredFields { balance: Some(dec!(11.00)), ..stored };
        assert_eq!(classify(&c, Some(&stored)), Classification::Conflict(vec!["balance"]));
    }

    #[test]
    fn test_merge_inserts_then_skips_duplicates() {
        let conn = open_in_memory().unwrap();
        let run = begin_run(&conn, "jan.pdf", None).unwrap();
        let batch = vec![
            candidate("a", dec!(-54.32), "GROCERY STORE"),
            candidate("b", dec!(2000.00), "PAYROLL"),
        ];
        let first = merge_candidates(&conn, run, &batch).unwrap();
        assert_eq!((first.new, first.duplicates, first.conflicts.len()), (2, 0, 0));

        let second = merge_candidates(&conn, run, &batch).unwrap();
        assert_eq!((second.new, second.duplicates, second.conflicts.len()), (0, 2, 0));

        let count: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_conflict_keeps_stored_record() {
        let conn = open_in_memory().unwrap();
        let run = begin_run(&conn, "jan.pdf", None).unwrap();
        merge_candidates(&conn, run, &[candidate("a", dec!(-54.32), "GROCERY STORE")]).unwrap();

        let outcome =
            merge_candidates(&conn, run, &[candidate("a", dec!(-99.99), "SOMETHING ELSE")]).unwrap();
        assert_eq!(outcome.new, 0);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].fields, vec!["amount", "description"]);

        let (description, amount) = stored_description(&conn, "a");
        assert_eq!(description, "GROCERY STORE");
        assert_eq!(amount, "-54.32");
    }

    #[test]
    fn test_duplicate_within_one_batch() {
        let conn = open_in_memory().unwrap();
        let run = begin_run(&conn, "jan.pdf", None).unwrap();
        let c = candidate("a", dec!(-1.00), "X");
        let outcome = merge_candidates(&conn, run, &[c.clone(), c]).unwrap();
        assert_eq!((outcome.new, outcome.duplicates), (1, 1));
    }
}
