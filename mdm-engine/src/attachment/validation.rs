//! Task-sheet validation
//!
//! Each data row of every task sheet is checked twice: no mandatory cell may
//! be empty, and each cell must pass its column's declared rule. Any failure
//! is reported per row; an empty mandatory cell triggers a system send-back
//! upstream.

use super::TaskSheet;
use crate::model::CellValue;
use regex::Regex;
use std::collections::HashMap;

/// Expected scalar shape of a typed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Text,
}

/// Declared validation rule of a task-sheet column
#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// Value must be one of a fixed set
    Lookup(Vec<String>),
    /// Value must be in the set keyed by another column's value
    DependentLookup {
        key_column: String,
        sets: HashMap<String, Vec<String>>,
    },
    /// Value must match the pattern
    Pattern(String),
    /// Value must match the pattern keyed by another column's value
    DependentPattern {
        key_column: String,
        patterns: HashMap<String, String>,
    },
    /// Value must parse as the given kind
    Typed(ValueKind),
    /// Value must be in the fixed set, or match the pattern keyed by another
    /// column's value
    LookupOrDependentPattern {
        lookup: Vec<String>,
        key_column: String,
        patterns: HashMap<String, String>,
    },
}

impl ValidationRule {
    /// Check one cell against the rule. `row` provides the sibling cells a
    /// dependent rule keys on; `columns` maps column names to row offsets.
    fn accepts(
        &self,
        value: &CellValue,
        row: &[CellValue],
        columns: &HashMap<&str, usize>,
    ) -> bool {
        let text = value.render();
        match self {
            ValidationRule::Lookup(set) => set.iter().any(|v| v == &text),
            ValidationRule::DependentLookup { key_column, sets } => {
                match key_cell(row, columns, key_column) {
                    Some(key) => sets
                        .get(&key)
                        .map(|set| set.iter().any(|v| v == &text))
                        .unwrap_or(false),
                    None => false,
                }
            }
            ValidationRule::Pattern(pattern) => matches_pattern(pattern, &text),
            ValidationRule::DependentPattern {
                key_column,
                patterns,
            } => match key_cell(row, columns, key_column) {
                Some(key) => patterns
                    .get(&key)
                    .map(|p| matches_pattern(p, &text))
                    .unwrap_or(false),
                None => false,
            },
            ValidationRule::Typed(kind) => match kind {
                ValueKind::Integer => text.parse::<i64>().is_ok(),
                ValueKind::Float => text.parse::<f64>().is_ok(),
                ValueKind::Text => true,
            },
            ValidationRule::LookupOrDependentPattern {
                lookup,
                key_column,
                patterns,
            } => {
                if lookup.iter().any(|v| v == &text) {
                    return true;
                }
                match key_cell(row, columns, key_column) {
                    Some(key) => patterns
                        .get(&key)
                        .map(|p| matches_pattern(p, &text))
                        .unwrap_or(false),
                    None => false,
                }
            }
        }
    }
}

fn key_cell(
    row: &[CellValue],
    columns: &HashMap<&str, usize>,
    key_column: &str,
) -> Option<String> {
    columns
        .get(key_column)
        .and_then(|idx| row.get(*idx))
        .filter(|cell| !cell.is_empty())
        .map(|cell| cell.render())
}

fn matches_pattern(pattern: &str, text: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(err) => {
            tracing::warn!(pattern, %err, "unusable validation pattern, failing the cell");
            false
        }
    }
}

/// Failures found on one data row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowValidation {
    /// Sheet the row belongs to
    pub sheet: String,
    /// Row position on the sheet (absolute, offset by the sheet start row)
    pub row: usize,
    /// Mandatory columns found empty
    pub empty_columns: Vec<String>,
    /// Columns whose value failed the declared rule
    pub invalid_columns: Vec<String>,
}

impl RowValidation {
    /// Whether this row blocks the request via a system send-back
    pub fn has_empty_mandatory(&self) -> bool {
        !self.empty_columns.is_empty()
    }
}

/// Validate every occupied row of the given sheets; returns failing rows only
pub fn validate_sheets(sheets: &[TaskSheet]) -> Vec<RowValidation> {
    let mut failures = Vec::new();
    for sheet in sheets {
        let column_index: HashMap<&str, usize> = sheet
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| (col.name.as_str(), idx))
            .collect();

        for (offset, row) in sheet.rows.iter().enumerate() {
            if row.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            let mut empty_columns = Vec::new();
            let mut invalid_columns = Vec::new();
            for (idx, column) in sheet.columns.iter().enumerate() {
                let cell = row.get(idx).cloned().unwrap_or(CellValue::Empty);
                if cell.is_empty() {
                    if column.mandatory {
                        empty_columns.push(column.name.clone());
                    }
                    continue;
                }
                if let Some(rule) = &column.rule {
                    if !rule.accepts(&cell, row, &column_index) {
                        invalid_columns.push(column.name.clone());
                    }
                }
            }
            if !empty_columns.is_empty() || !invalid_columns.is_empty() {
                failures.push(RowValidation {
                    sheet: sheet.name.clone(),
                    row: sheet.start_row + offset,
                    empty_columns,
                    invalid_columns,
                });
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::TaskColumn;

    fn sheet(columns: Vec<TaskColumn>, rows: Vec<Vec<CellValue>>) -> TaskSheet {
        TaskSheet {
            name: "Tasks".to_string(),
            start_row: 25,
            columns,
            rows,
        }
    }

    #[test]
    fn empty_mandatory_is_reported() {
        let s = sheet(
            vec![
                TaskColumn {
                    name: "Material".to_string(),
                    mandatory: true,
                    rule: None,
                },
                TaskColumn {
                    name: "Notes".to_string(),
                    mandatory: false,
                    rule: None,
                },
            ],
            vec![vec![CellValue::Empty, CellValue::from("x")]],
        );
        let failures = validate_sheets(&[s]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row, 25);
        assert_eq!(failures[0].empty_columns, vec!["Material"]);
        assert!(failures[0].has_empty_mandatory());
    }

    #[test]
    fn blank_rows_are_skipped() {
        let s = sheet(
            vec![TaskColumn {
                name: "Material".to_string(),
                mandatory: true,
                rule: None,
            }],
            vec![vec![CellValue::Empty]],
        );
        assert!(validate_sheets(&[s]).is_empty());
    }

    #[test]
    fn lookup_and_pattern_rules() {
        let s = sheet(
            vec![
                TaskColumn {
                    name: "Plant".to_string(),
                    mandatory: true,
                    rule: Some(ValidationRule::Lookup(vec![
                        "P100".to_string(),
                        "P200".to_string(),
                    ])),
                },
                TaskColumn {
                    name: "Material".to_string(),
                    mandatory: true,
                    rule: Some(ValidationRule::Pattern("^M-[0-9]{4}$".to_string())),
                },
            ],
            vec![
                vec![CellValue::from("P100"), CellValue::from("M-0001")],
                vec![CellValue::from("P900"), CellValue::from("M-1")],
            ],
        );
        let failures = validate_sheets(&[s]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row, 26);
        assert_eq!(failures[0].invalid_columns, vec!["Plant", "Material"]);
    }

    #[test]
    fn dependent_lookup_keys_on_sibling_cell() {
        let mut sets = HashMap::new();
        sets.insert("P100".to_string(), vec!["A".to_string(), "B".to_string()]);
        sets.insert("P200".to_string(), vec!["C".to_string()]);
        let s = sheet(
            vec![
                TaskColumn {
                    name: "Plant".to_string(),
                    mandatory: true,
                    rule: None,
                },
                TaskColumn {
                    name: "Storage".to_string(),
                    mandatory: true,
                    rule: Some(ValidationRule::DependentLookup {
                        key_column: "Plant".to_string(),
                        sets,
                    }),
                },
            ],
            vec![
                vec![CellValue::from("P100"), CellValue::from("B")],
                vec![CellValue::from("P200"), CellValue::from("B")],
            ],
        );
        let failures = validate_sheets(&[s]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].invalid_columns, vec!["Storage"]);
    }

    #[test]
    fn typed_rule_checks_shape() {
        let s = sheet(
            vec![TaskColumn {
                name: "Qty".to_string(),
                mandatory: true,
                rule: Some(ValidationRule::Typed(ValueKind::Integer)),
            }],
            vec![
                vec![CellValue::from("12")],
                vec![CellValue::from("12.5")],
            ],
        );
        let failures = validate_sheets(&[s]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row, 26);
    }
}
