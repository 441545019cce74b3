/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Result-set equivalence.
//!
//! Equal means: identical column set by name and position, identical row
//! count, and identical cell values under a relative float tolerance. Row
//! order is ignored unless the query requested an explicit order — both sets
//! are then compared in place. Column and row-count mismatches short-circuit
//! without any value comparison.

use serde::Serialize;
use shared::result::{CellValue, ResultSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Difference {
    ColumnMismatch {
        baseline: Vec<String>,
        candidate: Vec<String>,
    },
    RowCountMismatch {
        baseline: usize,
        candidate: usize,
    },
    CellMismatch {
        /// Position in the compared order: sorted order for
        /// order-insensitive comparison, original order otherwise.
        row: usize,
        column: String,
        baseline: CellValue,
        candidate: CellValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Verdict {
    Equal,
    NotEqual(Difference),
}

impl Verdict {
    pub fn is_equal(&self) -> bool {
        matches!(self, Verdict::Equal)
    }
}

pub fn compare(baseline: &ResultSet, candidate: &ResultSet, tol: f64) -> Verdict {
    if baseline.columns != candidate.columns {
        return Verdict::NotEqual(Difference::ColumnMismatch {
            baseline: baseline.columns.clone(),
            candidate: candidate.columns.clone(),
        });
    }
    if baseline.rows.len() != candidate.rows.len() {
        return Verdict::NotEqual(Difference::RowCountMismatch {
            baseline: baseline.rows.len(),
            candidate: candidate.rows.len(),
        });
    }
    let ordered = baseline.explicit_order || candidate.explicit_order;
    let (baseline_rows, candidate_rows) = if ordered {
        (
            baseline.rows.iter().collect::<Vec<_>>(),
            candidate.rows.iter().collect::<Vec<_>>(),
        )
    } else {
        (baseline.sorted_rows(), candidate.sorted_rows())
    };
    for (row, (b, c)) in baseline_rows.iter().zip(candidate_rows.iter()).enumerate() {
        for (col, (bv, cv)) in b.iter().zip(c.iter()).enumerate() {
            if !bv.approx_eq(cv, tol) {
                return Verdict::NotEqual(Difference::CellMismatch {
                    row,
                    column: baseline.columns.get(col).cloned().unwrap_or_default(),
                    baseline: bv.clone(),
                    candidate: cv.clone(),
                });
            }
        }
    }
    Verdict::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<CellValue>>) -> ResultSet {
        ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            explicit_order: false,
        }
    }

    #[test]
    fn test_reflexive_including_empty() {
        let empty = table(&["a"], vec![]);
        assert!(compare(&empty, &empty, 1e-9).is_equal());
        let set = table(
            &["a", "b"],
            vec![
                vec![CellValue::Int(1), CellValue::Text("x".into())],
                vec![CellValue::Int(2), CellValue::Blank],
            ],
        );
        assert!(compare(&set, &set, 1e-9).is_equal());
    }

    #[test]
    fn test_order_insensitive_without_explicit_order() {
        let a = table(
            &["a"],
            vec![vec![CellValue::Int(1)], vec![CellValue::Int(2)]],
        );
        let b = table(
            &["a"],
            vec![vec![CellValue::Int(2)], vec![CellValue::Int(1)]],
        );
        assert!(compare(&a, &b, 1e-9).is_equal());
    }

    #[test]
    fn test_order_sensitive_with_explicit_order() {
        let mut a = table(
            &["a"],
            vec![vec![CellValue::Int(1)], vec![CellValue::Int(2)]],
        );
        let mut b = table(
            &["a"],
            vec![vec![CellValue::Int(2)], vec![CellValue::Int(1)]],
        );
        a.explicit_order = true;
        b.explicit_order = true;
        assert!(!compare(&a, &b, 1e-9).is_equal());
    }

    #[test]
    fn test_column_mismatch_short_circuits() {
        let a = table(&["a"], vec![vec![CellValue::Int(1)]]);
        let b = table(&["b"], vec![vec![CellValue::Int(1)]]);
        match compare(&a, &b, 1e-9) {
            Verdict::NotEqual(Difference::ColumnMismatch { .. }) => {}
            other => panic!("expected column mismatch, got {:?}", other),
        }
        // same names, different positions
        let c = table(&["a", "b"], vec![]);
        let d = table(&["b", "a"], vec![]);
        assert!(!compare(&c, &d, 1e-9).is_equal());
    }

    #[test]
    fn test_row_count_mismatch() {
        let a = table(&["a"], vec![vec![CellValue::Int(1)]]);
        let b = table(&["a"], vec![]);
        match compare(&a, &b, 1e-9) {
            Verdict::NotEqual(Difference::RowCountMismatch {
                baseline: 1,
                candidate: 0,
            }) => {}
            other => panic!("expected row count mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_float_rounding_absorbed() {
        let a = table(&["a"], vec![vec![CellValue::Real(1000.0)]]);
        let b = table(&["a"], vec![vec![CellValue::Real(1000.0000001)]]);
        assert!(compare(&a, &b, 1e-9).is_equal());
        let c = table(&["a"], vec![vec![CellValue::Real(1000.1)]]);
        match compare(&a, &c, 1e-9) {
            Verdict::NotEqual(Difference::CellMismatch { column, .. }) => {
                assert_eq!(column, "a");
            }
            other => panic!("expected cell mismatch, got {:?}", other),
        }
    }
}
