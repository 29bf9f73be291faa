//! Cell values
//!
//! The tabular store contract is `column name -> string | number | time |
//! empty`. All reads and writes go through [`CellValue`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell of a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    /// Empty cell
    #[default]
    Empty,
    /// Text cell
    Text(String),
    /// Numeric cell
    Number(f64),
    /// Timestamp cell
    Time(DateTime<Utc>),
}

impl CellValue {
    /// Whether the cell holds no value (empty, or blank text)
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text content, if the cell holds non-blank text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric content; text cells are parsed leniently
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer content, truncating a numeric cell
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().map(|n| n as i64)
    }

    /// Timestamp content; text cells are parsed as RFC 3339
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            CellValue::Time(t) => Some(*t),
            CellValue::Text(s) => s.trim().parse::<DateTime<Utc>>().ok(),
            _ => None,
        }
    }

    /// Display form matching what the store would render
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s)
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<u32> for CellValue {
    fn from(n: u32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(t: DateTime<Utc>) -> Self {
        CellValue::Time(t)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => CellValue::Empty,
        }
    }
}
