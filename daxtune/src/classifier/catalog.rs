/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::classifier::rules;
use crate::config::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use shared::definition::{Measure, QueryDefinition};
use shared::trace::{Pattern, ScanEvent};
use std::collections::BTreeSet;

/// Identifier of a suggested remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationId {
    /// Replace a protected-division call inside an iteration with the native
    /// operator.
    NativeDivision,
    /// Cache a measure re-evaluated per row of an iteration in a variable.
    CacheMeasureInVariable,
    /// Precompute the branches of a conditional selecting between measures
    /// so the engine can fuse their scans.
    HoistConditionalMeasures,
    /// Hoist a duplicated filter expression into a single variable.
    DeduplicateFilter,
    /// Storage layout / parallelism issue. Outside this controller's power
    /// to fix; reported for manual review, never applied.
    ReportStorageLayout,
}

impl RemediationId {
    /// Fixed application priority: callbacks first, then fusion blocks, then
    /// data-volume issues, then report-only layout findings.
    pub fn priority(self) -> u8 {
        match self {
            RemediationId::NativeDivision => 0,
            RemediationId::CacheMeasureInVariable => 1,
            RemediationId::HoistConditionalMeasures => 2,
            RemediationId::DeduplicateFilter => 3,
            RemediationId::ReportStorageLayout => 4,
        }
    }

    /// Trace patterns that corroborate a static finding of this kind.
    pub fn corroborating(self) -> &'static [Pattern] {
        match self {
            RemediationId::NativeDivision | RemediationId::CacheMeasureInVariable => {
                &[Pattern::RowCallback, Pattern::EncodeCallback]
            }
            RemediationId::HoistConditionalMeasures => &[
                Pattern::FusionBlockedVertical,
                Pattern::FusionBlockedHorizontal,
            ],
            RemediationId::DeduplicateFilter => &[Pattern::SemiJoinBatch, Pattern::FullScan],
            RemediationId::ReportStorageLayout => &[],
        }
    }

    pub fn auto_applicable(self) -> bool {
        !matches!(self, RemediationId::ReportStorageLayout)
    }
}

/// One classifier finding: a remediation candidate with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub remediation: RemediationId,
    /// Measure the remediation would rewrite, or the scan it reports on.
    pub measure: String,
    pub evidence: String,
    /// True when at least one corroborating trace pattern was observed in
    /// the same run.
    pub confirmed: bool,
}

type StaticRule = fn(&Measure) -> Option<Finding>;

/// The registry of detectors. Rules are independent pure functions; adding a
/// detector means adding an entry here, not new control flow.
pub struct PatternCatalog {
    rules: Vec<StaticRule>,
}

impl PatternCatalog {
    pub fn standard() -> Self {
        PatternCatalog {
            rules: vec![
                rules::divide_inside_iterator,
                rules::iterator_measure_reference,
                rules::conditional_measure_branches,
                rules::duplicated_filter,
            ],
        }
    }

    /// Applies every static rule to every measure, cross-validates against
    /// the observed trace patterns, and appends the run-level report-only
    /// findings. Output is ordered by remediation priority.
    pub fn classify(
        &self,
        definition: &QueryDefinition,
        events: &[ScanEvent],
        cfg: &AnalyzerConfig,
    ) -> Vec<Finding> {
        let observed: BTreeSet<Pattern> = events
            .iter()
            .flat_map(|e| e.patterns.iter().copied())
            .collect();
        let mut findings = Vec::new();
        for measure in &definition.measures {
            for rule in &self.rules {
                if let Some(mut finding) = rule(measure) {
                    finding.confirmed = finding
                        .remediation
                        .corroborating()
                        .iter()
                        .any(|p| observed.contains(p));
                    findings.push(finding);
                }
            }
        }
        findings.extend(rules::slow_serial_scans(events, cfg));
        findings.sort_by(|a, b| {
            (a.remediation.priority(), &a.measure).cmp(&(b.remediation.priority(), &b.measure))
        });
        findings
    }
}
