use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::workflows::loans::domain::LoanFieldUpdate;

const MIN_LOAN_AMOUNT: f64 = 1_000.0;
const MAX_TENURE_MONTHS: u32 = 360;

fn amount_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:loan|amount|borrow|need)\b\D{0,24}?(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(k|thousand|lakhs?|lacs?|months?|years?|yrs?)?\b",
        )
        .expect("amount rule compiles")
    })
}

fn income_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:income|salary|earn|earning|earnings|take\s*home)\b\D{0,24}?(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(k|thousand|lakhs?|lacs?)?\b",
        )
        .expect("income rule compiles")
    })
}

fn tenure_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(r"(?i)\b([0-9]{1,3})\s*(months?|mos?|years?|yrs?)\b")
            .expect("tenure rule compiles")
    })
}

/// Picks loan terms out of a free-text sales message. Fields not mentioned stay `None`.
pub fn parse_terms(message: &str) -> LoanFieldUpdate {
    LoanFieldUpdate {
        amount: parse_amount(message),
        tenure_months: parse_tenure(message),
        monthly_income: income_rule()
            .captures(message)
            .and_then(|caps| scaled_value(&caps))
            .filter(|income| *income > 0.0),
    }
}

fn parse_amount(message: &str) -> Option<f64> {
    amount_rule()
        .captures_iter(message)
        .filter(|caps| !is_duration(caps.get(2).map(|unit| unit.as_str())))
        .filter_map(|caps| scaled_value(&caps))
        .find(|amount| *amount >= MIN_LOAN_AMOUNT)
}

fn parse_tenure(message: &str) -> Option<u32> {
    let caps = tenure_rule().captures(message)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    let months = if unit.starts_with('y') {
        value.checked_mul(12)?
    } else {
        value
    };
    (1..=MAX_TENURE_MONTHS).contains(&months).then_some(months)
}

fn is_duration(unit: Option<&str>) -> bool {
    unit.map(|unit| {
        let unit = unit.to_ascii_lowercase();
        unit.starts_with("month") || unit.starts_with("year") || unit.starts_with("yr")
    })
    .unwrap_or(false)
}

fn scaled_value(caps: &Captures<'_>) -> Option<f64> {
    let value: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|unit| unit.as_str().to_ascii_lowercase()) {
        Some(unit) if unit == "k" || unit == "thousand" => 1_000.0,
        Some(unit) if unit.starts_with("lakh") || unit.starts_with("lac") => 100_000.0,
        _ => 1.0,
    };
    let scaled = value * multiplier;
    scaled.is_finite().then_some(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_amount_tenure_and_income_from_one_message() {
        let terms = parse_terms("I need a loan of Rs. 2,00,000 for 2 years, my salary is 45k");
        assert_eq!(terms.amount, Some(200_000.0));
        assert_eq!(terms.tenure_months, Some(24));
        assert_eq!(terms.monthly_income, Some(45_000.0));
    }

    #[test]
    fn lakh_amounts_and_month_tenures() {
        let terms = parse_terms("need 5 lakh over 36 months");
        assert_eq!(terms.amount, Some(500_000.0));
        assert_eq!(terms.tenure_months, Some(36));
        assert_eq!(terms.monthly_income, None);
    }

    #[test]
    fn tenure_is_not_mistaken_for_an_amount() {
        let terms = parse_terms("I want the loan for 24 months");
        assert_eq!(terms.amount, None);
        assert_eq!(terms.tenure_months, Some(24));
    }

    #[test]
    fn small_talk_yields_nothing() {
        assert!(parse_terms("hello, what documents do you need?").is_empty());
    }
}
