//! Row grammar: everything the parser needs to know about one statement layout.
//!
//! The grammar is data, not code. Presets cover the OTP Bank export and a simple
//! pipe-delimited text layout; anything else can be described in a JSON file with
//! the same fields as [`GrammarConfig`].

use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

const OTP_AMOUNT: &str = r"\d{1,3}(?:\.\d{3})*,\d{2}";

/// Where a row's sign comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignRule {
    /// Explicit `-`, trailing `-` or parentheses on the amount.
    Marker,
    /// Separate `credit` and `debit` capture groups.
    Columns,
    /// Difference between this row's balance and the previous one.
    BalanceDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarConfig {
    pub name: String,
    pub row_pattern: String,
    pub date_prefix: String,
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,
    #[serde(default)]
    pub thousands_separator: Option<char>,
    #[serde(default = "default_sign_rule")]
    pub sign_rule: SignRule,
    #[serde(default)]
    pub noise_markers: Vec<String>,
    #[serde(default)]
    pub opening_balance: Option<String>,
    #[serde(default = "default_max_wrapped_lines")]
    pub max_wrapped_lines: usize,
    #[serde(default)]
    pub placeholder_descriptions: Vec<String>,
    /// Pulls the balance out of a dated line that failed `row_pattern`, so the
    /// running balance stays in step with the statement.
    #[serde(default)]
    pub balance_fallback: Option<String>,
}

fn default_date_formats() -> Vec<String> {
    vec!["%Y-%m-%d".to_string()]
}

fn default_decimal_separator() -> char {
    '.'
}

fn default_sign_rule() -> SignRule {
    SignRule::Marker
}

fn default_max_wrapped_lines() -> usize {
    4
}

impl GrammarConfig {
    /// OTP Bank account statement rows: date, 10-digit reference, counter account,
    /// amount, running balance, description. The sign comes from the balance delta.
    ///
    /// A dated row without an amount column (an informational entry carrying only
    /// the balance) does not match and is reported as "date without a parsable
    /// amount". Its balance still feeds the running balance through
    /// `balance_fallback`.
    pub fn otp() -> Self {
        Self {
            name: "otp".to_string(),
            row_pattern: format!(
                r"^(?P<date>\d{{2}}\.\d{{2}}\.\d{{4}})\s+(?P<reference>\d{{10}})\s+(?P<account>\S+)\s+(?P<amount>{OTP_AMOUNT})\s+(?P<balance>-?{OTP_AMOUNT})(?:\s+(?P<description>.*))?$"
            ),
            date_prefix: r"^\d{2}\.\d{2}\.\d{4}\b".to_string(),
            date_formats: vec!["%d.%m.%Y".to_string(), "%d. %m. %Y".to_string()],
            decimal_separator: ',',
            thousands_separator: Some('.'),
            sign_rule: SignRule::BalanceDelta,
            noise_markers: ["otp banka", "d8008", "izpis prometa", "stran", "legenda"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            opening_balance: Some(format!(
                r"^EUR\s+(?P<balance>-?{OTP_AMOUNT})\s+-?{OTP_AMOUNT}\s+-?{OTP_AMOUNT}\s+-?{OTP_AMOUNT}"
            )),
            max_wrapped_lines: default_max_wrapped_lines(),
            placeholder_descriptions: vec![".".to_string(), "/".to_string()],
            balance_fallback: Some(format!(
                r"^\d{{2}}\.\d{{2}}\.\d{{4}}\s+\d{{10}}\s+\S+\s+(?:\S+\s+)?(?P<balance>-?{OTP_AMOUNT})(?:\s|$)"
            )),
        }
    }

    pub fn delimited() -> Self {
        Self {
            name: "delimited".to_string(),
            row_pattern: r"^(?P<date>\d{4}-\d{2}-\d{2})\s*[|\t]\s*(?P<description>[^|\t]*?)\s*[|\t]\s*(?P<amount>[^|\t\s][^|\t]*?)\s*$"
                .to_string(),
            date_prefix: r"^\d{4}-\d{2}-\d{2}\b".to_string(),
            date_formats: default_date_formats(),
            decimal_separator: '.',
            thousands_separator: Some(','),
            sign_rule: SignRule::Marker,
            noise_markers: Vec::new(),
            opening_balance: None,
            max_wrapped_lines: default_max_wrapped_lines(),
            placeholder_descriptions: Vec::new(),
            balance_fallback: None,
        }
    }
}

/// Named capture groups of a matched transaction row.
#[derive(Debug, Clone, Default)]
pub struct RowFields<'t> {
    pub date: &'t str,
    pub description: &'t str,
    pub amount: Option<&'t str>,
    pub credit: Option<&'t str>,
    pub debit: Option<&'t str>,
    pub balance: Option<&'t str>,
    pub reference: Option<&'t str>,
}

#[derive(Debug, Clone)]
pub struct RowGrammar {
    config: GrammarConfig,
    row: Regex,
    date_prefix: Regex,
    opening_balance: Option<Regex>,
    balance_fallback: Option<Regex>,
    noise_markers: Vec<String>,
}

impl RowGrammar {
    pub fn compile(config: GrammarConfig) -> Result<Self> {
        let row = compile_regex("row_pattern", &config.row_pattern)?;
        let names: Vec<&str> = row.capture_names().flatten().collect();
        for required in ["date", "description"] {
            if !names.contains(&required) {
                return Err(LedgerError::InvalidGrammar(format!(
                    "row_pattern must have a '{required}' group"
                )));
            }
        }
        if !["amount", "credit", "debit"].iter().any(|g| names.contains(g)) {
            return Err(LedgerError::InvalidGrammar(
                "row_pattern needs an 'amount', 'credit' or 'debit' group".to_string(),
            ));
        }
        if config.sign_rule == SignRule::BalanceDelta && !names.contains(&"balance") {
            return Err(LedgerError::InvalidGrammar(
                "sign_rule balance_delta needs a 'balance' group".to_string(),
            ));
        }
        if config.date_formats.is_empty() {
            return Err(LedgerError::InvalidGrammar("date_formats is empty".to_string()));
        }

        let date_prefix = compile_regex("date_prefix", &config.date_prefix)?;
        let opening_balance = match &config.opening_balance {
            Some(p) => Some(compile_regex("opening_balance", p)?),
            None => None,
        };
        let balance_fallback = match &config.balance_fallback {
            Some(p) => Some(compile_regex("balance_fallback", p)?),
            None => None,
        };
        if let Some(re) = &balance_fallback {
            if !re.capture_names().flatten().any(|n| n == "balance") {
                return Err(LedgerError::InvalidGrammar(
                    "balance_fallback must have a 'balance' group".to_string(),
                ));
            }
        }
        let noise_markers = config.noise_markers.iter().map(|m| m.to_lowercase()).collect();

        Ok(Self {
            config,
            row,
            date_prefix,
            opening_balance,
            balance_fallback,
            noise_markers,
        })
    }

    pub fn preset(name: &str) -> Option<Result<Self>> {
        match name {
            "otp" => Some(Self::compile(GrammarConfig::otp())),
            "delimited" => Some(Self::compile(GrammarConfig::delimited())),
            _ => None,
        }
    }

    /// A preset name, or a path to a JSON grammar file.
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        if let Some(grammar) = Self::preset(name_or_path) {
            return grammar;
        }
        let path = Path::new(name_or_path);
        if !path.exists() {
            return Err(LedgerError::InvalidGrammar(format!(
                "'{name_or_path}' is neither a preset (otp, delimited) nor a grammar file"
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: GrammarConfig = serde_json::from_str(&content)?;
        Self::compile(config)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn sign_rule(&self) -> SignRule {
        self.config.sign_rule
    }

    pub fn max_wrapped_lines(&self) -> usize {
        self.config.max_wrapped_lines
    }

    pub fn match_row<'t>(&self, text: &'t str) -> Option<RowFields<'t>> {
        let caps = self.row.captures(text.trim())?;
        let group = |c: &Captures<'t>, name: &str| {
            c.name(name).map(|m| m.as_str()).filter(|s| !s.is_empty())
        };
        Some(RowFields {
            date: group(&caps, "date")?,
            description: group(&caps, "description").unwrap_or(""),
            amount: group(&caps, "amount"),
            credit: group(&caps, "credit"),
            debit: group(&caps, "debit"),
            balance: group(&caps, "balance"),
            reference: group(&caps, "reference"),
        })
    }

    pub fn starts_with_date(&self, text: &str) -> bool {
        self.date_prefix.is_match(text.trim())
    }

    pub fn is_noise(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.noise_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    pub fn is_placeholder(&self, text: &str) -> bool {
        let t = text.trim();
        self.config.placeholder_descriptions.iter().any(|p| p == t)
    }

    pub fn opening_balance(&self, text: &str) -> Option<Decimal> {
        let re = self.opening_balance.as_ref()?;
        let caps = re.captures(text.trim())?;
        self.parse_amount(caps.name("balance")?.as_str())
    }

    pub fn fallback_balance(&self, text: &str) -> Option<Decimal> {
        let re = self.balance_fallback.as_ref()?;
        let caps = re.captures(text.trim())?;
        self.parse_amount(caps.name("balance")?.as_str())
    }

    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        self.config
            .date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    }

    /// Parse an amount into a two-place decimal. Honours leading and trailing
    /// minus signs, a leading plus and parenthesised negatives.
    pub fn parse_amount(&self, raw: &str) -> Option<Decimal> {
        let mut s: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '"'))
            .filter(|c| Some(*c) != self.config.thousands_separator)
            .collect();
        let mut negative = false;

        if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            negative = true;
            s = inner.to_string();
        }
        if let Some(rest) = s.strip_suffix('-') {
            negative = !negative;
            s = rest.to_string();
        }
        if let Some(rest) = s.strip_prefix('-') {
            negative = !negative;
            s = rest.to_string();
        } else if let Some(rest) = s.strip_prefix('+') {
            s = rest.to_string();
        }

        if self.config.decimal_separator != '.' {
            if s.contains('.') {
                return None;
            }
            s = s.replace(self.config.decimal_separator, ".");
        }
        let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
        let dots = s.chars().filter(|c| *c == '.').count();
        if digits == 0 || dots > 1 || digits + dots != s.len() {
            return None;
        }

        let mut value = Decimal::from_str(&s).ok()?.round_dp(2);
        value.rescale(2);
        Some(if negative { -value } else { value })
    }
}

fn compile_regex(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| LedgerError::InvalidGrammar(format!("{field}: {e}")))
}
