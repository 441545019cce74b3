/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Individual anti-pattern detectors.
//!
//! Every detector is a pure predicate over one measure body (or, for the
//! run-level rule, one event list). Detection happens on a case-folded copy
//! of the body with string literals masked; the copy is length-preserving so
//! spans index straight into the original text.

use crate::classifier::catalog::{Finding, RemediationId};
use crate::config::AnalyzerConfig;
use shared::definition::{measure_refs, Measure};
use shared::trace::ScanEvent;

/// Functions that establish a row context over their first argument.
pub(crate) const ITERATORS: &[&str] = &[
    "SUMX",
    "AVERAGEX",
    "MINX",
    "MAXX",
    "COUNTX",
    "PRODUCTX",
    "CONCATENATEX",
    "FILTER",
];

/// Iteration re-evaluating another measure per row: candidate for caching
/// the measure's result in a variable.
pub fn iterator_measure_reference(measure: &Measure) -> Option<Finding> {
    let folded = fold_case(&measure.body);
    for (start, end) in iterator_inner_spans(&folded) {
        let refs = measure_refs(&measure.body[start..end]);
        if let Some(name) = refs.first() {
            return Some(Finding {
                remediation: RemediationId::CacheMeasureInVariable,
                measure: measure.name.clone(),
                evidence: format!("measure [{}] re-evaluated per row inside an iterator", name),
                confirmed: false,
            });
        }
    }
    None
}

/// Conditional selecting between whole measures: candidate for precomputing
/// the branches so their scans can fuse.
pub fn conditional_measure_branches(measure: &Measure) -> Option<Finding> {
    let folded = fold_case(&measure.body);
    for name in ["IF", "SWITCH"] {
        for (_, open) in find_calls(&folded, name) {
            let close = match close_paren(&folded, open) {
                Some(c) => c,
                None => continue,
            };
            let branches = split_args(&folded[open + 1..close])
                .into_iter()
                .map(|(s, e)| measure.body[open + 1 + s..open + 1 + e].trim().to_string())
                .filter(|arg| is_bare_measure_ref(arg))
                .collect::<Vec<_>>();
            if branches.len() >= 2 {
                return Some(Finding {
                    remediation: RemediationId::HoistConditionalMeasures,
                    measure: measure.name.clone(),
                    evidence: format!(
                        "{} selects between measures {}",
                        name,
                        branches.join(", ")
                    ),
                    confirmed: false,
                });
            }
        }
    }
    None
}

/// Protected division inside an iteration: candidate for the native operator.
pub fn divide_inside_iterator(measure: &Measure) -> Option<Finding> {
    let folded = fold_case(&measure.body);
    for (start, end) in iterator_inner_spans(&folded) {
        if !find_calls(&folded[start..end], "DIVIDE").is_empty() {
            return Some(Finding {
                remediation: RemediationId::NativeDivision,
                measure: measure.name.clone(),
                evidence: "DIVIDE evaluated per row inside an iterator".to_string(),
                confirmed: false,
            });
        }
    }
    None
}

/// The same filter expression evaluated more than once in one body:
/// candidate for hoisting it into a single variable.
pub fn duplicated_filter(measure: &Measure) -> Option<Finding> {
    let folded = fold_case(&measure.body);
    let mut seen: Vec<String> = Vec::new();
    for (start, open) in find_calls(&folded, "FILTER") {
        let close = match close_paren(&folded, open) {
            Some(c) => c,
            None => continue,
        };
        let normalized = normalize_ws(&measure.body[start..=close]);
        if seen.contains(&normalized) {
            return Some(Finding {
                remediation: RemediationId::DeduplicateFilter,
                measure: measure.name.clone(),
                evidence: format!("filter evaluated twice: {}", normalized),
                confirmed: false,
            });
        }
        seen.push(normalized);
    }
    None
}

/// Run-level, report-only rule: a long scan with a poor CPU/wall ratio points
/// at storage layout or segmentation, which no measure rewrite can fix.
pub fn slow_serial_scans(events: &[ScanEvent], cfg: &AnalyzerConfig) -> Vec<Finding> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.cache_match && e.duration_ms >= cfg.slow_scan_ms)
        .filter(|(_, e)| {
            (e.cpu_time_ms as f64 / e.duration_ms as f64) < cfg.low_parallelism_factor
        })
        .map(|(index, e)| Finding {
            remediation: RemediationId::ReportStorageLayout,
            measure: format!("scan #{}", index),
            evidence: format!(
                "scan of {} ms used {} ms CPU (factor {:.2})",
                e.duration_ms,
                e.cpu_time_ms,
                e.cpu_time_ms as f64 / e.duration_ms as f64
            ),
            confirmed: true,
        })
        .collect()
}

/// Byte-length-preserving normalization: ASCII-uppercase outside double-quoted
/// string literals, literal contents masked with spaces. Masking pads one
/// space per byte so offsets into the folded text slice the original body
/// at char boundaries even for non-ASCII literal content.
pub(crate) fn fold_case(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_string = false;
    for c in body.chars() {
        if c == '"' {
            in_string = !in_string;
            out.push('"');
        } else if in_string {
            for _ in 0..c.len_utf8() {
                out.push(' ');
            }
        } else {
            out.push(c.to_ascii_uppercase());
        }
    }
    out
}

/// All calls of `name` in folded text: `(name_start, open_paren)` pairs.
/// A match must not be preceded by an identifier character.
pub(crate) fn find_calls(folded: &str, name: &str) -> Vec<(usize, usize)> {
    let mut calls = Vec::new();
    for (pos, _) in folded.match_indices(name) {
        let preceded_by_ident = folded[..pos]
            .chars()
            .next_back()
            .map(|c| c.is_ascii_alphanumeric() || c == '_')
            .unwrap_or(false);
        if preceded_by_ident {
            continue;
        }
        let after = &folded[pos + name.len()..];
        let trimmed = after.trim_start();
        if trimmed.starts_with('(') {
            let open = pos + name.len() + (after.len() - trimmed.len());
            calls.push((pos, open));
        }
    }
    calls
}

/// Index of the `)` matching the `(` at `open`.
pub(crate) fn close_paren(folded: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in folded[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Top-level argument spans of a call body, split on depth-zero commas.
/// Brackets are tracked too so a comma inside `[a, b]` never splits.
pub(crate) fn split_args(inner: &str) -> Vec<(usize, usize)> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (pos, c) in inner.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                args.push((start, pos));
                start = pos + c.len_utf8();
            }
            _ => {}
        }
    }
    if start <= inner.len() {
        args.push((start, inner.len()));
    }
    args
}

/// Inner spans (between the parentheses) of every iterator call.
pub(crate) fn iterator_inner_spans(folded: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for name in ITERATORS {
        for (_, open) in find_calls(folded, name) {
            if let Some(close) = close_paren(folded, open) {
                spans.push((open + 1, close));
            }
        }
    }
    spans
}

fn is_bare_measure_ref(arg: &str) -> bool {
    arg.len() > 2
        && arg.starts_with('[')
        && arg.ends_with(']')
        && !arg[1..arg.len() - 1].contains(['[', ']'])
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure(body: &str) -> Measure {
        Measure {
            name: "M".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_iterator_measure_reference_detected() {
        let finding =
            iterator_measure_reference(&measure("SUMX('Sales', [Unit Margin] * 'Sales'[Qty])"))
                .expect("finding");
        assert_eq!(finding.remediation, RemediationId::CacheMeasureInVariable);
        assert!(!finding.confirmed);
    }

    #[test]
    fn test_column_only_iterator_is_clean() {
        assert!(iterator_measure_reference(&measure(
            "SUMX('Sales', 'Sales'[Amount] - 'Sales'[Cost])"
        ))
        .is_none());
    }

    #[test]
    fn test_conditional_between_measures() {
        let finding = conditional_measure_branches(&measure(
            "IF(HASONEVALUE('Date'[Year]), [Actual Sales], [Projected Sales])",
        ))
        .expect("finding");
        assert_eq!(finding.remediation, RemediationId::HoistConditionalMeasures);
    }

    #[test]
    fn test_conditional_with_single_measure_branch_is_clean() {
        assert!(conditional_measure_branches(&measure(
            "IF(HASONEVALUE('Date'[Year]), [Actual Sales], 0)"
        ))
        .is_none());
    }

    #[test]
    fn test_divide_outside_iterator_is_clean() {
        assert!(divide_inside_iterator(&measure("DIVIDE([A], [B])")).is_none());
        assert!(
            divide_inside_iterator(&measure("SUMX('Sales', DIVIDE([A], [B]))")).is_some()
        );
    }

    #[test]
    fn test_divide_is_case_insensitive_and_string_masked() {
        assert!(divide_inside_iterator(&measure("sumx('Sales', divide([A], [B]))")).is_some());
        // DIVIDE only inside a string literal must not match
        assert!(divide_inside_iterator(&measure(
            "SUMX('Sales', \"DIVIDE( is a function\" & \"\")"
        ))
        .is_none());
    }

    #[test]
    fn test_duplicated_filter_detected() {
        let body = "CALCULATE(SUM('Sales'[Amount]), FILTER('Sales', 'Sales'[Qty] > 1)) \
                    + COUNTROWS(FILTER('Sales', 'Sales'[Qty] > 1))";
        let finding = duplicated_filter(&measure(body)).expect("finding");
        assert_eq!(finding.remediation, RemediationId::DeduplicateFilter);
    }

    #[test]
    fn test_distinct_filters_are_clean() {
        let body = "CALCULATE(SUM('Sales'[Amount]), FILTER('Sales', 'Sales'[Qty] > 1)) \
                    + COUNTROWS(FILTER('Sales', 'Sales'[Qty] > 2))";
        assert!(duplicated_filter(&measure(body)).is_none());
    }

    #[test]
    fn test_non_ascii_string_literal_keeps_offsets_aligned() {
        let body = "COUNTROWS(FILTER('Sales', 'Sales'[Name] = \"éé\"))";
        assert_eq!(fold_case(body).len(), body.len());
        assert!(duplicated_filter(&measure(body)).is_none());
        // detection still works past a masked multi-byte literal
        let finding = iterator_measure_reference(&measure(
            "SUMX(FILTER('Sales', 'Sales'[Région] = \"Über\"), [Unit Margin])",
        ))
        .expect("finding");
        assert_eq!(finding.remediation, RemediationId::CacheMeasureInVariable);
    }

    #[test]
    fn test_identifier_prefix_does_not_match_call() {
        // MYFILTER( must not count as FILTER(
        assert_eq!(find_calls(&fold_case("MYFILTER(x)"), "FILTER").len(), 0);
        assert_eq!(find_calls(&fold_case("FILTER (x)"), "FILTER").len(), 1);
    }

    #[test]
    fn test_split_args_respects_nesting() {
        let spans = split_args("IF(a, b), [x, y], 3");
        assert_eq!(spans.len(), 3);
        let inner = "IF(a, b), [x, y], 3";
        assert_eq!(&inner[spans[1].0..spans[1].1].trim(), &"[x, y]");
    }
}
