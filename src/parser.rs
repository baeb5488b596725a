use std::collections::HashMap;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::extractor::TextLine;
use crate::grammar::{RowFields, RowGrammar, SignRule};
use crate::models::{Candidate, ParseWarning};

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<ParseWarning>,
}

// ---------------------------------------------------------------------------
// Row assembly
// ---------------------------------------------------------------------------

/// Captured text of one transaction row plus any wrapped description lines.
#[derive(Debug, Clone, PartialEq)]
struct RawRow {
    page: usize,
    line: usize,
    text: String,
    date: String,
    amount: Option<String>,
    credit: Option<String>,
    debit: Option<String>,
    balance: Option<String>,
    reference: Option<String>,
    description: Vec<String>,
    wrapped: usize,
}

impl RawRow {
    fn from_fields(
        grammar: &RowGrammar,
        fields: &RowFields<'_>,
        page: usize,
        line: usize,
        text: &str,
    ) -> Self {
        let own = |s: Option<&str>| s.map(str::to_string);
        let mut description = Vec::new();
        if !grammar.is_placeholder(fields.description) {
            description.push(fields.description.to_string());
        }
        Self {
            page,
            line,
            text: text.to_string(),
            date: fields.date.to_string(),
            amount: own(fields.amount),
            credit: own(fields.credit),
            debit: own(fields.debit),
            balance: own(fields.balance),
            reference: own(fields.reference),
            description,
            wrapped: 0,
        }
    }
}

/// A line that starts with a date but did not match the row signature on its own.
#[derive(Debug, Clone, PartialEq)]
struct RowHead {
    page: usize,
    line: usize,
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Head(RowHead),
    Row(RawRow),
}

#[derive(Debug, Clone, PartialEq)]
enum AssemblyState {
    SeekingRow,
    AccumulatingWrappedLine(Pending),
    RowComplete(RawRow),
}

#[derive(Debug)]
enum Assembled {
    Row(RawRow),
    Unmatched(ParseWarning),
}

struct RowAssembler<'g> {
    grammar: &'g RowGrammar,
    state: AssemblyState,
}

impl<'g> RowAssembler<'g> {
    fn new(grammar: &'g RowGrammar) -> Self {
        Self {
            grammar,
            state: AssemblyState::SeekingRow,
        }
    }

    fn feed(&mut self, line: &TextLine<'_>, out: &mut Vec<Assembled>) {
        let text = line.text.trim();
        loop {
            let state = std::mem::replace(&mut self.state, AssemblyState::SeekingRow);
            match state {
                AssemblyState::SeekingRow => {
                    self.state = self.seek(line, text);
                    return;
                }
                AssemblyState::RowComplete(row) => {
                    out.push(Assembled::Row(row));
                }
                AssemblyState::AccumulatingWrappedLine(Pending::Head(head)) => {
                    if text.is_empty() && head.page == line.page {
                        self.state = AssemblyState::AccumulatingWrappedLine(Pending::Head(head));
                        return;
                    }
                    if head.page == line.page && !self.grammar.starts_with_date(text) {
                        let joined = format!("{} {}", head.text, text);
                        if let Some(fields) = self.grammar.match_row(&joined) {
                            let row = RawRow::from_fields(self.grammar, &fields, head.page, head.line, &joined);
                            self.state = AssemblyState::AccumulatingWrappedLine(Pending::Row(row));
                            return;
                        }
                    }
                    out.push(Assembled::Unmatched(unmatched_head(head)));
                }
                AssemblyState::AccumulatingWrappedLine(Pending::Row(mut row)) => {
                    if text.is_empty() && row.page == line.page {
                        self.state = AssemblyState::AccumulatingWrappedLine(Pending::Row(row));
                        return;
                    }
                    if self.ends_row(&row, line, text) {
                        self.state = AssemblyState::RowComplete(row);
                        continue;
                    }
                    if !self.grammar.is_placeholder(text) {
                        row.description.push(text.to_string());
                    }
                    row.wrapped += 1;
                    self.state = AssemblyState::AccumulatingWrappedLine(Pending::Row(row));
                    return;
                }
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<Assembled>) {
        match std::mem::replace(&mut self.state, AssemblyState::SeekingRow) {
            AssemblyState::SeekingRow => {}
            AssemblyState::RowComplete(row)
            | AssemblyState::AccumulatingWrappedLine(Pending::Row(row)) => {
                out.push(Assembled::Row(row));
            }
            AssemblyState::AccumulatingWrappedLine(Pending::Head(head)) => {
                out.push(Assembled::Unmatched(unmatched_head(head)));
            }
        }
    }

    fn seek(&self, line: &TextLine<'_>, text: &str) -> AssemblyState {
        if text.is_empty() {
            return AssemblyState::SeekingRow;
        }
        if let Some(fields) = self.grammar.match_row(text) {
            let row = RawRow::from_fields(self.grammar, &fields, line.page, line.number, text);
            return AssemblyState::AccumulatingWrappedLine(Pending::Row(row));
        }
        if self.grammar.starts_with_date(text) && !self.grammar.is_noise(text) {
            return AssemblyState::AccumulatingWrappedLine(Pending::Head(RowHead {
                page: line.page,
                line: line.number,
                text: text.to_string(),
            }));
        }
        AssemblyState::SeekingRow
    }

    fn ends_row(&self, row: &RawRow, line: &TextLine<'_>, text: &str) -> bool {
        line.page != row.page
            || row.wrapped >= self.grammar.max_wrapped_lines()
            || self.grammar.is_noise(text)
            || self.grammar.starts_with_date(text)
            || self.grammar.match_row(text).is_some()
    }
}

fn unmatched_head(head: RowHead) -> ParseWarning {
    ParseWarning {
        page: head.page,
        line: head.line,
        text: head.text,
        reason: "date without a parsable amount".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Row resolution
// ---------------------------------------------------------------------------

struct Resolver<'g> {
    grammar: &'g RowGrammar,
    source: &'g str,
    previous_balance: Option<Decimal>,
    occurrences: HashMap<String, usize>,
}

impl<'g> Resolver<'g> {
    fn resolve(&mut self, row: RawRow) -> Result<Candidate, ParseWarning> {
        let warn = |row: &RawRow, reason: &str| ParseWarning {
            page: row.page,
            line: row.line,
            text: row.text.clone(),
            reason: reason.to_string(),
        };

        let Some(date) = self.grammar.parse_date(&row.date) else {
            return Err(warn(&row, "unparsable date"));
        };
        let balance = row.balance.as_deref().and_then(|b| self.grammar.parse_amount(b));
        let magnitude = self.magnitude(&row);

        let sign = match (self.grammar.sign_rule(), &magnitude) {
            (_, None) => None,
            (SignRule::Marker, Some((_, marker))) => Some(marker.unwrap_or(Sign::Credit)),
            (SignRule::Columns, Some((_, marker))) => *marker,
            (SignRule::BalanceDelta, Some((value, marker))) => {
                let from_delta = match (self.previous_balance, balance) {
                    (Some(prev), Some(current)) if (current - prev).abs() == *value => {
                        Some(if current < prev { Sign::Debit } else { Sign::Credit })
                    }
                    _ => None,
                };
                from_delta.or(*marker)
            }
        };
        // The running balance follows the statement even past rows we reject.
        if balance.is_some() {
            self.previous_balance = balance;
        }

        let Some((magnitude, _)) = magnitude else {
            return Err(warn(&row, "unparsable amount"));
        };
        if self.grammar.sign_rule() == SignRule::BalanceDelta && row.balance.is_some() && balance.is_none() {
            return Err(warn(&row, "unparsable balance"));
        }
        let Some(sign) = sign else {
            return Err(warn(&row, "cannot determine sign"));
        };
        let amount = match sign {
            Sign::Credit => magnitude,
            Sign::Debit => -magnitude,
        };

        let description = normalize_description(&row.description.join(" "));
        let id = self.identify(row.reference.as_deref(), &date.to_string(), amount, &description);

        Ok(Candidate {
            id,
            date,
            amount,
            description,
            reference: row.reference,
            balance,
            page: row.page,
            line: row.line,
            source_document: self.source.to_string(),
        })
    }

    /// A dated line that never became a row still moves the statement's balance.
    fn skip_unmatched(&mut self, text: &str) {
        if let Some(balance) = self.grammar.fallback_balance(text) {
            self.previous_balance = Some(balance);
        }
    }

    /// Absolute amount and any explicit sign carried by the row itself.
    fn magnitude(&self, row: &RawRow) -> Option<(Decimal, Option<Sign>)> {
        if let Some(raw) = &row.amount {
            let value = self.grammar.parse_amount(raw)?;
            let marker = if value < Decimal::ZERO {
                Some(Sign::Debit)
            } else if raw.trim_start().starts_with('+') {
                Some(Sign::Credit)
            } else {
                None
            };
            return Some((value.abs(), marker));
        }
        let credit = match &row.credit {
            Some(raw) => Some(self.grammar.parse_amount(raw)?.abs()),
            None => None,
        };
        let debit = match &row.debit {
            Some(raw) => Some(self.grammar.parse_amount(raw)?.abs()),
            None => None,
        };
        match (credit, debit) {
            (Some(c), None) => Some((c, Some(Sign::Credit))),
            (None, Some(d)) => Some((d, Some(Sign::Debit))),
            (Some(c), Some(d)) => {
                let net = c - d;
                let sign = if net < Decimal::ZERO { Sign::Debit } else { Sign::Credit };
                Some((net.abs(), Some(sign)))
            }
            (None, None) => None,
        }
    }

    fn identify(&mut self, reference: Option<&str>, date: &str, amount: Decimal, description: &str) -> String {
        let key = match reference {
            Some(reference) => format!("ref|{reference}|{date}"),
            None => {
                let base = format!("row|{date}|{amount:.2}|{description}");
                let seen = self.occurrences.entry(base.clone()).or_insert(0);
                let key = format!("{base}|{seen}");
                *seen += 1;
                key
            }
        };
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Credit,
    Debit,
}

/// Collapse whitespace and drop surrounding quotes.
pub fn normalize_description(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(|s| s.trim().to_string())
        .unwrap_or(collapsed)
}

// ---------------------------------------------------------------------------
// parse_document
// ---------------------------------------------------------------------------

/// Turn the lines of one statement into transaction candidates. Lines that do not
/// look like transactions are dropped; rows that look like transactions but cannot
/// be read become warnings.
pub fn parse_document<'a>(
    lines: impl IntoIterator<Item = TextLine<'a>>,
    grammar: &RowGrammar,
    source: &str,
) -> ParseOutcome {
    let mut assembler = RowAssembler::new(grammar);
    let mut resolver = Resolver {
        grammar,
        source,
        previous_balance: None,
        occurrences: HashMap::new(),
    };
    let mut outcome = ParseOutcome::default();
    let mut assembled = Vec::new();
    let mut seen_row = false;

    for line in lines {
        if !seen_row {
            if let Some(opening) = grammar.opening_balance(line.text) {
                resolver.previous_balance = Some(opening);
            }
        }
        assembler.feed(&line, &mut assembled);
        seen_row |= !assembled.is_empty() || assembler.state != AssemblyState::SeekingRow;
        drain(&mut resolver, &mut assembled, &mut outcome);
    }
    assembler.finish(&mut assembled);
    drain(&mut resolver, &mut assembled, &mut outcome);

    outcome
}

fn drain(resolver: &mut Resolver<'_>, assembled: &mut Vec<Assembled>, outcome: &mut ParseOutcome) {
    for item in assembled.drain(..) {
        match item {
            Assembled::Row(row) => match resolver.resolve(row) {
                Ok(candidate) => outcome.candidates.push(candidate),
                Err(warning) => outcome.warnings.push(warning),
            },
            Assembled::Unmatched(warning) => {
                resolver.skip_unmatched(&warning.text);
                outcome.warnings.push(warning);
            }
        }
    }
}
