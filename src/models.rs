use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Regex => "regex",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "contains" => Some(Self::Contains),
            "starts_with" => Some(Self::StartsWith),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: i64,
    pub pattern: String,
    pub match_type: MatchType,
    pub category_id: i64,
    pub category_name: String,
    pub priority: i64,
    pub hit_count: i64,
}

/// How a transaction got its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Rule,
    History,
    Manual,
}

impl CategorySource {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::History => "history",
            Self::Manual => "manual",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "rule" => Some(Self::Rule),
            "history" => Some(Self::History),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub balance: Option<Decimal>,
    pub category: Option<String>,
    pub category_source: Option<CategorySource>,
    pub source_document: String,
    pub ingested_at: String,
}

impl Transaction {
    pub fn is_income(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_expense(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }
}

/// A parsed statement row that has not been merged into the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub balance: Option<Decimal>,
    pub page: usize,
    pub line: usize,
    pub source_document: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub page: usize,
    pub line: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictWarning {
    pub transaction_id: String,
    pub fields: Vec<&'static str>,
    pub page: usize,
    pub line: usize,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionRun {
    pub id: i64,
    pub filename: String,
    pub checksum: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub new_count: i64,
    pub duplicate_count: i64,
    pub conflict_count: i64,
    pub warning_count: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunWarning {
    pub kind: String,
    pub page: i64,
    pub line: i64,
    pub message: String,
}
