//! Text normalization helpers shared by row mappers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::value::CellValue;
use crate::Timestamp;

/// Layout of dates written back to a sheet.
pub const SHEET_DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Keep only ASCII digits. Non-text cells yield an empty string.
pub fn only_digits(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => digits(s),
        _ => String::new(),
    }
}

/// Digits of a raw string, e.g. a postal code typed as `"01310-100"`.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Trimmed, lowercased text; non-text cells normalize to `""`.
pub fn normalize_text(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => s.trim().to_lowercase(),
        _ => String::new(),
    }
}

/// Trimmed display form of any cell.
pub fn trimmed(value: &CellValue) -> String {
    value.to_string().trim().to_string()
}

/// Parse a price written in pt-BR notation (`"R$ 1.234,56"`).
///
/// When a comma is present it is the decimal separator and dots group
/// thousands; otherwise a single dot is taken as the decimal point.
/// Anything unparsable is `0.0`.
pub fn parse_locale_price(raw: &str) -> f64 {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    let normalized = if kept.contains(',') {
        kept.replace('.', "").replacen(',', ".", 1).replace(',', "")
    } else if kept.matches('.').count() > 1 {
        kept.replace('.', "")
    } else {
        kept
    };

    match normalized.parse::<f64>() {
        Ok(price) if price.is_finite() => price,
        _ => 0.0,
    }
}

/// Price of a catalog cell: numbers as-is, text through [`parse_locale_price`].
pub fn price_of(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Text(s) => parse_locale_price(s),
        _ => 0.0,
    }
}

/// Coerce a date-like cell into [`CellValue::Date`].
///
/// Dates pass through. Text is tried as RFC 3339, then ISO `YYYY-MM-DD`
/// with or without a time, then pt-BR `DD/MM/YYYY`; dates without a time
/// land on midnight UTC. Blank cells become [`CellValue::Empty`]. Anything
/// else is returned unchanged.
pub fn normalize_date(value: &CellValue) -> CellValue {
    match value {
        CellValue::Text(s) if s.trim().is_empty() => CellValue::Empty,
        CellValue::Text(s) => parse_date(s.trim())
            .map(CellValue::Date)
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn parse_date(raw: &str) -> Option<Timestamp> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `dd/MM/yyyy HH:mm:ss` in UTC, the layout sheets display.
pub fn format_date_for_sheet(date: &Timestamp) -> String {
    date.format(SHEET_DATE_FORMAT).to_string()
}
