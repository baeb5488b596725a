use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use rusqlite::Connection;

use crate::error::{LedgerError, Result};
use crate::ledger::category_id;
use crate::models::{MatchType, Rule};

enum Matcher {
    Contains(String),
    StartsWith(String),
    Regex(Regex),
}

impl Matcher {
    fn new(pattern: &str, match_type: MatchType) -> Result<Self> {
        Ok(match match_type {
            MatchType::Contains => Self::Contains(pattern.to_uppercase()),
            MatchType::StartsWith => Self::StartsWith(pattern.to_uppercase()),
            MatchType::Regex => Self::Regex(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| LedgerError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    })?,
            ),
        })
    }

    fn is_match(&self, description: &str, upper: &str) -> bool {
        match self {
            Self::Contains(p) => upper.contains(p.as_str()),
            Self::StartsWith(p) => upper.starts_with(p.as_str()),
            Self::Regex(re) => re.is_match(description),
        }
    }
}

struct CompiledRule {
    id: i64,
    category_id: i64,
    matcher: Matcher,
}

/// Active rules in evaluation order: highest priority first, then creation order.
/// The first rule that matches decides the category.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn load(conn: &Connection) -> Result<Self> {
        let rules = list_rules(conn)?
            .into_iter()
            .filter_map(|rule| match Matcher::new(&rule.pattern, rule.match_type) {
                Ok(matcher) => Some(CompiledRule {
                    id: rule.id,
                    category_id: rule.category_id,
                    matcher,
                }),
                Err(e) => {
                    log::warn!("skipping rule {}: {e}", rule.id);
                    None
                }
            })
            .collect();
        Ok(Self { rules })
    }

    /// (rule id, category id) of the first matching rule.
    pub fn first_match(&self, description: &str) -> Option<(i64, i64)> {
        let upper = description.to_uppercase();
        self.rules
            .iter()
            .find(|r| r.matcher.is_match(description, &upper))
            .map(|r| (r.id, r.category_id))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Category most often assigned by hand to each description; ties go to the
/// alphabetically first category.
fn manual_history(conn: &Connection) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare(
        "SELECT t.description, t.category_id, COUNT(*) AS n \
         FROM transactions t JOIN categories c ON t.category_id = c.id \
         WHERE t.category_source = 'manual' \
         GROUP BY t.description, t.category_id \
         ORDER BY t.description, n DESC, c.name ASC",
    )?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut history = HashMap::new();
    for (description, category_id) in rows {
        history.entry(description).or_insert(category_id);
    }
    Ok(history)
}

#[derive(Debug, Default, PartialEq)]
pub struct CategorizeResult {
    pub by_rule: usize,
    pub by_history: usize,
    pub uncategorized: usize,
}

/// Categorize every transaction that has no category and was not cleared by hand.
/// Manually assigned transactions are never touched.
pub fn categorize_transactions(conn: &Connection) -> Result<CategorizeResult> {
    let rules = RuleSet::load(conn)?;
    let history = manual_history(conn)?;

    let mut stmt = conn.prepare(
        "SELECT id, description FROM transactions \
         WHERE category_id IS NULL AND (category_source IS NULL OR category_source <> 'manual') \
         ORDER BY date, id",
    )?;
    let pending: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    log::info!(
        "categorizing {} transaction(s) with {} active rule(s)",
        pending.len(),
        rules.len()
    );
    let mut result = CategorizeResult::default();
    for (txn_id, description) in &pending {
        if let Some((rule_id, category_id)) = rules.first_match(description) {
            conn.execute(
                "UPDATE transactions SET category_id = ?1, category_source = 'rule' WHERE id = ?2",
                rusqlite::params![category_id, txn_id],
            )?;
            conn.execute("UPDATE rules SET hit_count = hit_count + 1 WHERE id = ?1", [rule_id])?;
            log::debug!("rule {rule_id} matched '{description}'");
            result.by_rule += 1;
        } else if let Some(category_id) = history.get(description) {
            conn.execute(
                "UPDATE transactions SET category_id = ?1, category_source = 'history' WHERE id = ?2",
                rusqlite::params![category_id, txn_id],
            )?;
            result.by_history += 1;
        } else {
            result.uncategorized += 1;
        }
    }

    Ok(result)
}

// ---------------------------------------------------------------------------
// Rule management
// ---------------------------------------------------------------------------

pub fn add_rule(
    conn: &Connection,
    pattern: &str,
    category: &str,
    match_type: MatchType,
    priority: i64,
) -> Result<i64> {
    if pattern.trim().is_empty() {
        return Err(LedgerError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }
    Matcher::new(pattern, match_type)?;
    let cat_id = category_id(conn, category)?;
    conn.execute(
        "INSERT INTO rules (pattern, match_type, category_id, priority) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![pattern, match_type.key(), cat_id, priority],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_rules(conn: &Connection) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.pattern, r.match_type, r.category_id, c.name, r.priority, r.hit_count \
         FROM rules r JOIN categories c ON r.category_id = c.id \
         WHERE r.is_active = 1 ORDER BY r.priority DESC, r.id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let match_type: String = row.get(2)?;
            Ok(Rule {
                id: row.get(0)?,
                pattern: row.get(1)?,
                match_type: MatchType::from_key(&match_type).unwrap_or(MatchType::Contains),
                category_id: row.get(3)?,
                category_name: row.get(4)?,
                priority: row.get(5)?,
                hit_count: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn deactivate_rule(conn: &Connection, id: i64) -> Result<Rule> {
    let rule = list_rules(conn)?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| LedgerError::Other(format!("No active rule with ID {id}")))?;
    conn.execute("UPDATE rules SET is_active = 0 WHERE id = ?1", [id])?;
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn insert_txns(conn: &Connection, descriptions: &[&str]) {
        conn.execute(
            "INSERT INTO ingestion_runs (filename, started_at) VALUES ('t.pdf', '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        for (i, desc) in descriptions.iter().enumerate() {
            conn.execute(
                "INSERT INTO transactions (id, date, amount, description, source_document, ingested_at) \
                 VALUES (?1, '2025-01-15', '-50.00', ?2, 't.pdf', '2025-01-15T00:00:00Z')",
                rusqlite::params![format!("tx{i}"), desc],
            )
            .unwrap();
        }
    }

    fn category_of(conn: &Connection, id: &str) -> (Option<String>, Option<String>) {
        conn.query_row(
            "SELECT c.name, t.category_source FROM transactions t \
             LEFT JOIN categories c ON t.category_id = c.id WHERE t.id = ?1",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_contains_rule() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["NAKUP MERCATOR LJUBLJANA"]);
        add_rule(&conn, "mercator", "Groceries", MatchType::Contains, 0).unwrap();
        let result = categorize_transactions(&conn).unwrap();
        assert_eq!(result.by_rule, 1);
        assert_eq!(result.uncategorized, 0);
        assert_eq!(
            category_of(&conn, "tx0"),
            (Some("Groceries".to_string()), Some("rule".to_string()))
        );
    }

    #[test]
    fn test_starts_with_rule() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["DVIG GOTOVINE BA", "PROVIZIJA DVIG"]);
        add_rule(&conn, "DVIG", "Cash", MatchType::StartsWith, 0).unwrap();
        let result = categorize_transactions(&conn).unwrap();
        assert_eq!(result.by_rule, 1);
        assert_eq!(result.uncategorized, 1);
    }

    #[test]
    fn test_regex_rule() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["Petrol 1234 Ljubljana"]);
        add_rule(&conn, r"^PETROL \d+", "Transport", MatchType::Regex, 0).unwrap();
        assert_eq!(categorize_transactions(&conn).unwrap().by_rule, 1);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let conn = open_in_memory().unwrap();
        let err = add_rule(&conn, "(", "Transport", MatchType::Regex, 0).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let conn = open_in_memory().unwrap();
        let err = add_rule(&conn, "X", "Nope", MatchType::Contains, 0).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownCategory(_)));
    }

    #[test]
    fn test_first_created_rule_wins_on_equal_priority() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["SPAR RESTAVRACIJA"]);
        add_rule(&conn, "SPAR", "Groceries", MatchType::Contains, 0).unwrap();
        add_rule(&conn, "RESTAVRACIJA", "Dining", MatchType::Contains, 0).unwrap();
        categorize_transactions(&conn).unwrap();
        assert_eq!(category_of(&conn, "tx0").0.as_deref(), Some("Groceries"));
    }

    #[test]
    fn test_higher_priority_wins() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["SPAR RESTAVRACIJA"]);
        add_rule(&conn, "SPAR", "Groceries", MatchType::Contains, 0).unwrap();
        add_rule(&conn, "RESTAVRACIJA", "Dining", MatchType::Contains, 10).unwrap();
        categorize_transactions(&conn).unwrap();
        assert_eq!(category_of(&conn, "tx0").0.as_deref(), Some("Dining"));
    }

    #[test]
    fn test_rule_order_is_listed_as_evaluated() {
        let conn = open_in_memory().unwrap();
        let a = add_rule(&conn, "A", "Groceries", MatchType::Contains, 0).unwrap();
        let b = add_rule(&conn, "B", "Dining", MatchType::Contains, 5).unwrap();
        let c = add_rule(&conn, "C", "Dining", MatchType::Contains, 0).unwrap();
        let ids: Vec<i64> = list_rules(&conn).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, a, c]);
        assert_eq!(RuleSet::load(&conn).unwrap().len(), 3);
    }

    #[test]
    fn test_unmatched_stays_uncategorized() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["RANDOM VENDOR XYZ"]);
        let result = categorize_transactions(&conn).unwrap();
        assert_eq!(result, CategorizeResult { by_rule: 0, by_history: 0, uncategorized: 1 });
        assert_eq!(category_of(&conn, "tx0"), (None, None));
    }

    #[test]
    fn test_manual_assignment_is_never_overwritten() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["MERCATOR", "MERCATOR CENTER"]);
        let health = category_id(&conn, "Health").unwrap();
        conn.execute(
            "UPDATE transactions SET category_id = ?1, category_source = 'manual' WHERE id = 'tx0'",
            [health],
        )
        .unwrap();
        conn.execute(
            "UPDATE transactions SET category_source = 'manual' WHERE id = 'tx1'",
            [],
        )
        .unwrap();
        add_rule(&conn, "MERCATOR", "Groceries", MatchType::Contains, 100).unwrap();

        categorize_transactions(&conn).unwrap();
        categorize_transactions(&conn).unwrap();
        assert_eq!(category_of(&conn, "tx0").0.as_deref(), Some("Health"));
        assert_eq!(category_of(&conn, "tx1"), (None, Some("manual".to_string())));
    }

    #[test]
    fn test_history_reuses_manual_category() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["LEKARNA CENTER", "LEKARNA CENTER"]);
        let health = category_id(&conn, "Health").unwrap();
        conn.execute(
            "UPDATE transactions SET category_id = ?1, category_source = 'manual' WHERE id = 'tx0'",
            [health],
        )
        .unwrap();
        let result = categorize_transactions(&conn).unwrap();
        assert_eq!(result.by_history, 1);
        assert_eq!(
            category_of(&conn, "tx1"),
            (Some("Health".to_string()), Some("history".to_string()))
        );
    }

    #[test]
    fn test_hit_count_incremented() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["PETROL A", "PETROL B"]);
        add_rule(&conn, "PETROL", "Transport", MatchType::Contains, 0).unwrap();
        categorize_transactions(&conn).unwrap();
        assert_eq!(list_rules(&conn).unwrap()[0].hit_count, 2);
    }

    #[test]
    fn test_deactivated_rule_is_ignored() {
        let conn = open_in_memory().unwrap();
        insert_txns(&conn, &["PETROL A"]);
        let id = add_rule(&conn, "PETROL", "Transport", MatchType::Contains, 0).unwrap();
        deactivate_rule(&conn, id).unwrap();
        assert_eq!(categorize_transactions(&conn).unwrap().uncategorized, 1);
        assert!(deactivate_rule(&conn, id).is_err());
    }
}
