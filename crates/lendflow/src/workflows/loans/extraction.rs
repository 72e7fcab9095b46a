//! Pattern rules turning recognized document text into typed fields.
//!
//! Each document type is parsed independently. Rules never fail: a field that cannot be found
//! is `None`, and callers decide what an incomplete extraction means.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("extraction pattern compiles"))
}

fn pan_strict() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"(?i)\b([A-Z]{5}[0-9]{4}[A-Z])\b")
}

fn pan_labelled() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(
        &CELL,
        r"(?im)^\s*(?:permanent\s+account\s+number|pan)(?:\s*(?:no\.?|number|card))?\s*[:\-]\s*([A-Z0-9]+)",
    )
}

fn aadhaar_grouped() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"\b(\d{4}[ ]?\d{4}[ ]?\d{4})\b")
}

fn aadhaar_labelled() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(
        &CELL,
        r"(?im)^\s*aadhaar(?:\s*(?:no\.?|number))?\s*[:\-]\s*([0-9][0-9 ]*)",
    )
}

fn name_line() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"(?im)^\s*name\s*[:\-]?\s*(\S.*?)\s*$")
}

fn father_line() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"(?im)^\s*father(?:'s)?\s*name\s*[:\-]?\s*(\S.*?)\s*$")
}

fn birth_line() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(
        &CELL,
        r"(?im)(?:date\s*of\s*birth|dob|year\s*of\s*birth|yob)\s*[:\-]?\s*(\d{1,2}[/\-.]\d{1,2}[/\-.]\d{4}|\d{4}-\d{2}-\d{2}|\d{4})\b",
    )
}

fn net_pay() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(
        &CELL,
        r"(?im)(?:net\s*(?:pay|salary)|take\s*home(?:\s*pay)?)\s*[:\-]?\s*(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
    )
}

fn emi_line() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"(?i)\b(?:emi|loan\s+instal+ment)\b")
}

fn amount() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"([0-9][0-9,]*\.[0-9]{1,2}|[0-9]{1,3}(?:,[0-9]{2,3})+|[0-9]+)")
}

const DATE_FORMATS: [&str; 4] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"];

/// Birth data as printed on the document. Some cards only carry the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BirthDate {
    Full(NaiveDate),
    YearOnly(i32),
}

impl BirthDate {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Some(BirthDate::Full(date));
            }
        }

        if trimmed.len() == 4 && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return trimmed.parse().ok().map(BirthDate::YearOnly);
        }

        None
    }

    /// Exact match only; a bare year never matches a stored full date.
    pub fn matches(&self, stored: Option<NaiveDate>) -> bool {
        match (self, stored) {
            (BirthDate::Full(date), Some(stored)) => *date == stored,
            _ => false,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            BirthDate::Full(date) => date.year(),
            BirthDate::YearOnly(year) => *year,
        }
    }
}

/// Identity fields pulled from a PAN or Aadhaar card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityFields {
    pub number: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<BirthDate>,
    /// PAN cards only.
    pub father_name: Option<String>,
}

impl IdentityFields {
    pub fn is_complete(&self) -> bool {
        self.number.is_some() && self.name.is_some() && self.birth_date.is_some()
    }
}

pub fn extract_pan(text: &str) -> IdentityFields {
    let number = capture(pan_strict(), text).or_else(|| capture(pan_labelled(), text));

    IdentityFields {
        number,
        name: capture(name_line(), text).map(|name| collapse_whitespace(&name)),
        birth_date: capture(birth_line(), text).and_then(|raw| BirthDate::parse(&raw)),
        father_name: capture(father_line(), text).map(|name| collapse_whitespace(&name)),
    }
}

pub fn extract_aadhaar(text: &str) -> IdentityFields {
    let number = capture(aadhaar_grouped(), text)
        .or_else(|| capture(aadhaar_labelled(), text))
        .map(|raw| raw.split_whitespace().collect::<String>());

    IdentityFields {
        number,
        name: capture(name_line(), text).map(|name| collapse_whitespace(&name)),
        birth_date: capture(birth_line(), text).and_then(|raw| BirthDate::parse(&raw)),
        father_name: None,
    }
}

/// Net monthly pay from a salary slip.
pub fn extract_net_monthly_pay(text: &str) -> Option<f64> {
    capture(net_pay(), text)
        .and_then(|raw| parse_amount(&raw))
        .filter(|value| *value > 0.0)
}

/// Monthly EMI obligations on a bank statement.
///
/// On each EMI / loan instalment line the debit is the first amount after the keyword; any
/// later column is the running balance. A statement spanning several months repeats the same
/// debit, so each narration counts once at its latest value. Blank text yields `None`; a
/// readable statement with no EMI lines yields zero.
pub fn extract_existing_emis(text: &str) -> Option<f64> {
    if text.trim().is_empty() {
        return None;
    }

    let mut obligations: BTreeMap<String, f64> = BTreeMap::new();
    for line in text.lines() {
        if let Some((narration, debit)) = emi_debit(line) {
            obligations.insert(narration, debit);
        }
    }

    Some(obligations.values().sum())
}

fn emi_debit(line: &str) -> Option<(String, f64)> {
    let keyword = emi_line().find(line)?;
    let debit = amount().find_at(line, keyword.end())?;
    let value = parse_amount(debit.as_str())?;
    Some((narration_key(&line[..debit.start()]), value))
}

/// Narration text with transaction dates dropped, so the same loan matches across months.
fn narration_key(narration: &str) -> String {
    narration
        .split_whitespace()
        .filter(|token| {
            !token
                .chars()
                .all(|ch| ch.is_ascii_digit() || matches!(ch, '/' | '-' | '.'))
        })
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
pub(crate) fn parse_amount_for_tests(raw: &str) -> Option<f64> {
    parse_amount(raw)
}
