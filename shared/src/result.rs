/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One materialized cell of a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blank,
}

impl CellValue {
    /// Tolerant equality: floats compare under a relative tolerance scaled to
    /// magnitude, with `tol` itself as the absolute fallback near zero. This
    /// absorbs engine-level rounding without masking semantic drift; all
    /// other variants compare exactly.
    pub fn approx_eq(&self, other: &CellValue, tol: f64) -> bool {
        match (self, other) {
            (CellValue::Real(a), CellValue::Real(b)) => real_approx_eq(*a, *b, tol),
            (CellValue::Int(a), CellValue::Real(b)) | (CellValue::Real(b), CellValue::Int(a)) => {
                real_approx_eq(*a as f64, *b, tol)
            }
            _ => self == other,
        }
    }

    /// Total ordering across all variants, used to sort rows for
    /// order-insensitive comparison. Variants order by kind first, values
    /// within a kind; floats use `total_cmp` so NaN never poisons the sort.
    pub fn cmp_total(&self, other: &CellValue) -> Ordering {
        fn rank(v: &CellValue) -> u8 {
            match v {
                CellValue::Blank => 0,
                CellValue::Bool(_) => 1,
                CellValue::Int(_) => 2,
                CellValue::Real(_) => 3,
                CellValue::Text(_) => 4,
            }
        }
        match (self, other) {
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
            (CellValue::Real(a), CellValue::Real(b)) => a.total_cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

fn real_approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    diff <= tol || diff <= tol * a.abs().max(b.abs())
}

/// A materialized result set as returned by one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// True when the query requested an explicit output order; row order is
    /// then significant for equivalence.
    pub explicit_order: bool,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        ResultSet {
            columns,
            rows: Vec::new(),
            explicit_order: false,
        }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    /// Rows sorted by the full row tuple, for order-insensitive comparison.
    pub fn sorted_rows(&self) -> Vec<&Vec<CellValue>> {
        let mut rows: Vec<&Vec<CellValue>> = self.rows.iter().collect();
        rows.sort_by(|a, b| cmp_rows(a, b));
        rows
    }
}

/// Lexicographic comparison over a full row tuple.
pub fn cmp_rows(a: &[CellValue], b: &[CellValue]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.cmp_total(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
