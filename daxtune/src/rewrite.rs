/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Remediation application.
//!
//! Each remediation is a pure textual transform on exactly one measure body;
//! the query and every other measure stay untouched, so the externally
//! observable output shape is held fixed. A transform may turn out to be
//! semantically wrong for a particular model — that is what the equivalence
//! check downstream is for.

use crate::classifier::rules::{
    close_paren, find_calls, fold_case, iterator_inner_spans, split_args,
};
use crate::classifier::{Finding, RemediationId};
use shared::definition::{measure_refs, QueryDefinition};

/// Applies one remediation to the definition, producing the candidate.
/// `None` when the remediation is report-only or the expected shape is no
/// longer present in the measure body.
pub fn apply(finding: &Finding, definition: &QueryDefinition) -> Option<QueryDefinition> {
    if !finding.remediation.auto_applicable() {
        return None;
    }
    let measure = definition.measure(&finding.measure)?;
    let body = match finding.remediation {
        RemediationId::CacheMeasureInVariable => cache_measure_in_variable(&measure.body),
        RemediationId::HoistConditionalMeasures => hoist_conditional_measures(&measure.body),
        RemediationId::NativeDivision => native_division(&measure.body),
        RemediationId::DeduplicateFilter => deduplicate_filter(&measure.body),
        RemediationId::ReportStorageLayout => None,
    }?;
    Some(definition.with_measure_body(&finding.measure, &body))
}

fn variable_name(prefix: &str, seed: &str) -> String {
    let sanitized: String = seed.chars().filter(char::is_ascii_alphanumeric).collect();
    format!("__{}{}", prefix, sanitized)
}

/// `SUMX(T, ... [M] ...)` becomes `VAR __cachedM = [M] RETURN SUMX(T, ... __cachedM ...)`.
fn cache_measure_in_variable(body: &str) -> Option<String> {
    let folded = fold_case(body);
    let name = iterator_inner_spans(&folded)
        .into_iter()
        .find_map(|(start, end)| measure_refs(&body[start..end]).into_iter().next())?;
    let reference = format!("[{}]", name);
    let var = variable_name("cached", &name);
    let rewritten = body.replace(&reference, &var);
    Some(format!("VAR {} = {}\nRETURN\n{}", var, reference, rewritten))
}

/// `IF(c, [A], [B])` becomes `VAR __branch.. = [A] ... RETURN IF(c, __branch.., ..)`
/// so both branch scans are issued together and can fuse.
fn hoist_conditional_measures(body: &str) -> Option<String> {
    let folded = fold_case(body);
    let (open, close) = ["IF", "SWITCH"]
        .iter()
        .flat_map(|name| find_calls(&folded, name))
        .find_map(|(_, open)| close_paren(&folded, open).map(|close| (open, close)))?;
    let branches: Vec<String> = split_args(&folded[open + 1..close])
        .into_iter()
        .map(|(s, e)| body[open + 1 + s..open + 1 + e].trim().to_string())
        .filter(|arg| {
            arg.len() > 2
                && arg.starts_with('[')
                && arg.ends_with(']')
                && !arg[1..arg.len() - 1].contains(['[', ']'])
        })
        .collect();
    if branches.len() < 2 {
        return None;
    }
    let mut out = String::new();
    let mut rewritten = body.to_string();
    for reference in &branches {
        let var = variable_name("branch", &reference[1..reference.len() - 1]);
        out.push_str(&format!("VAR {} = {}\n", var, reference));
        rewritten = rewritten.replace(reference.as_str(), &var);
    }
    out.push_str("RETURN\n");
    out.push_str(&rewritten);
    Some(out)
}

/// First `DIVIDE(a, b[, alt])` becomes a guarded native division. Both forms
/// return the alternate (or blank) for a zero denominator.
fn native_division(body: &str) -> Option<String> {
    let folded = fold_case(body);
    let (start, open) = find_calls(&folded, "DIVIDE").into_iter().next()?;
    let close = close_paren(&folded, open)?;
    let args: Vec<String> = split_args(&folded[open + 1..close])
        .into_iter()
        .map(|(s, e)| body[open + 1 + s..open + 1 + e].trim().to_string())
        .collect();
    let replacement = match args.as_slice() {
        [num, den] => format!("IF({} <> 0, ({}) / ({}))", den, num, den),
        [num, den, alt] => format!("IF({} <> 0, ({}) / ({}), {})", den, num, den, alt),
        _ => return None,
    };
    Some(format!("{}{}{}", &body[..start], replacement, &body[close + 1..]))
}

/// Hoists a filter expression evaluated more than once into a variable.
fn deduplicate_filter(body: &str) -> Option<String> {
    let folded = fold_case(body);
    for (start, open) in find_calls(&folded, "FILTER") {
        let close = match close_paren(&folded, open) {
            Some(c) => c,
            None => continue,
        };
        let filter_text = &body[start..=close];
        if body.matches(filter_text).count() >= 2 {
            let var = variable_name("filtered", "Set");
            return Some(format!(
                "VAR {} = {}\nRETURN\n{}",
                var,
                filter_text,
                body.replace(filter_text, &var)
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::definition::Measure;

    fn definition(body: &str) -> QueryDefinition {
        QueryDefinition {
            query: "EVALUATE ROW(\"m\", [M])".to_string(),
            measures: vec![Measure {
                name: "M".to_string(),
                body: body.to_string(),
            }],
        }
    }

    fn finding(remediation: RemediationId) -> Finding {
        Finding {
            remediation,
            measure: "M".to_string(),
            evidence: String::new(),
            confirmed: true,
        }
    }

    #[test]
    fn test_native_division_two_args() {
        let def = definition("SUMX('Sales', DIVIDE('Sales'[Amount], 'Sales'[Qty]))");
        let candidate = apply(&finding(RemediationId::NativeDivision), &def).unwrap();
        let body = &candidate.measure("M").unwrap().body;
        assert!(!body.contains("DIVIDE"));
        assert!(body.contains("IF('Sales'[Qty] <> 0, ('Sales'[Amount]) / ('Sales'[Qty]))"));
    }

    #[test]
    fn test_native_division_with_alternate() {
        let def = definition("DIVIDE([A], [B], 0)");
        let candidate = apply(&finding(RemediationId::NativeDivision), &def).unwrap();
        assert_eq!(
            candidate.measure("M").unwrap().body,
            "IF([B] <> 0, ([A]) / ([B]), 0)"
        );
    }

    #[test]
    fn test_cache_measure_in_variable() {
        let def = definition("SUMX('Sales', [Unit Margin] * 'Sales'[Qty])");
        let candidate = apply(&finding(RemediationId::CacheMeasureInVariable), &def).unwrap();
        let body = &candidate.measure("M").unwrap().body;
        assert!(body.starts_with("VAR __cachedUnitMargin = [Unit Margin]\nRETURN\n"));
        assert!(body.contains("SUMX('Sales', __cachedUnitMargin * 'Sales'[Qty])"));
    }

    #[test]
    fn test_hoist_conditional_measures() {
        let def = definition("IF(HASONEVALUE('Date'[Year]), [Actual], [Projected])");
        let candidate = apply(&finding(RemediationId::HoistConditionalMeasures), &def).unwrap();
        let body = &candidate.measure("M").unwrap().body;
        assert!(body.contains("VAR __branchActual = [Actual]"));
        assert!(body.contains("VAR __branchProjected = [Projected]"));
        assert!(body.contains("IF(HASONEVALUE('Date'[Year]), __branchActual, __branchProjected)"));
    }

    #[test]
    fn test_deduplicate_filter() {
        let def = definition(
            "CALCULATE(SUM('Sales'[Amount]), FILTER('Sales', 'Sales'[Qty] > 1)) + COUNTROWS(FILTER('Sales', 'Sales'[Qty] > 1))",
        );
        let candidate = apply(&finding(RemediationId::DeduplicateFilter), &def).unwrap();
        let body = &candidate.measure("M").unwrap().body;
        assert!(body.starts_with("VAR __filteredSet = FILTER('Sales', 'Sales'[Qty] > 1)"));
        assert_eq!(body.matches("FILTER(").count(), 1);
    }

    #[test]
    fn test_report_only_is_never_applied() {
        let def = definition("SUM('Sales'[Amount])");
        assert!(apply(&finding(RemediationId::ReportStorageLayout), &def).is_none());
    }

    #[test]
    fn test_missing_shape_yields_none() {
        let def = definition("SUM('Sales'[Amount])");
        assert!(apply(&finding(RemediationId::NativeDivision), &def).is_none());
    }

    #[test]
    fn test_rewrite_never_touches_query_or_other_measures() {
        let mut def = definition("DIVIDE([A], [B])");
        def.measures.push(Measure {
            name: "Other".to_string(),
            body: "SUM('Sales'[Amount])".to_string(),
        });
        let candidate = apply(&finding(RemediationId::NativeDivision), &def).unwrap();
        assert_eq!(candidate.query, def.query);
        assert_eq!(candidate.measure("Other").unwrap().body, "SUM('Sales'[Amount])");
    }
}
