//! Cell values, records and explicit lookup results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::text::format_date_for_sheet;
use crate::Timestamp;

/// A single scalar stored in a table cell.
///
/// Serialized untagged so records read as plain JSON objects
/// (`{"ID": 7, "Nome": "Ana", "Ativo": true}`), with empty cells as `null`.
/// Dates serialize as RFC 3339 strings, and RFC 3339 strings read back as dates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Date(Timestamp),
    Text(String),
}

impl CellValue {
    /// String-cast used for key matching: `7.0` and `"7"` compare equal.
    pub fn as_key_string(&self) -> String {
        self.to_string()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&Timestamp> {
        match self {
            CellValue::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            // f64's Display already drops the trailing ".0" of integral values.
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Date(d) => f.write_str(&format_date_for_sheet(d)),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<Timestamp> for CellValue {
    fn from(value: Timestamp) -> Self {
        CellValue::Date(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// One row, keyed by column name.
pub type Record = BTreeMap<String, CellValue>;

/// Raw row as stored in the backing table, in column order.
pub type Row = Vec<CellValue>;

/// Build a record from `(column, value)` pairs.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<CellValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Outcome of a keyed lookup.
///
/// Not finding a row is a normal answer, so it is a value rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_string_cast() {
        assert_eq!(CellValue::Number(7.0).as_key_string(), "7");
        assert_eq!(CellValue::Number(7.5).as_key_string(), "7.5");
        assert_eq!(CellValue::from("7").as_key_string(), "7");
        assert_eq!(CellValue::Bool(true).as_key_string(), "true");
        assert_eq!(CellValue::Empty.as_key_string(), "");
    }

    #[test]
    fn test_untagged_json_shape() {
        let rec = record([
            ("ID", CellValue::from(3i64)),
            ("Nome", CellValue::from("Ana")),
            ("Obs", CellValue::Empty),
        ]);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["ID"], serde_json::json!(3.0));
        assert_eq!(json["Nome"], serde_json::json!("Ana"));
        assert!(json["Obs"].is_null());

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_lookup_serialization() {
        let found: Lookup<u32> = Lookup::Found(4);
        assert_eq!(
            serde_json::to_value(&found).unwrap(),
            serde_json::json!({"status": "found", "value": 4})
        );
        let missing: Lookup<u32> = Lookup::NotFound;
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            serde_json::json!({"status": "not_found"})
        );
    }

    #[test]
    fn test_date_cells() {
        use chrono::TimeZone;

        let when = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let cell = CellValue::from(when);
        assert_eq!(cell.to_string(), "09/03/2024 14:05:00");
        assert_eq!(cell.as_date(), Some(&when));
        assert!(!cell.is_empty());

        let rec = record([("Entrada", cell)]);
        let back: Record = serde_json::from_value(serde_json::to_value(&rec).unwrap()).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_is_empty() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::from("").is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }
}
