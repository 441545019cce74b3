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

/// Tunable parameters of the analyzer. Thresholds the source guidance leaves
/// as stated constants are configuration here, never hard-coded at use sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Minimum improvement ratio for a candidate to be accepted.
    pub acceptance_threshold: f64,
    /// An unfiltered scan is a full scan when its rows exceed this multiple
    /// of the final result cardinality.
    pub full_scan_ratio: f64,
    /// A semi-join batch is low-selectivity when the preliminary set exceeds
    /// this fraction of the filtered table's cardinality.
    pub low_selectivity_ratio: f64,
    /// A grouping scan is dense when its rows reach this fraction of the
    /// table's cardinality.
    pub dense_groupby_ratio: f64,
    /// Relative tolerance for floating-point cell comparison.
    pub float_tolerance: f64,
    /// Cold-cache repetitions per baseline.
    pub baseline_repetitions: usize,
    /// Timeout for each individual execute-and-trace call.
    pub execute_timeout_ms: u64,
    /// Keep iterating after an accepted candidate instead of stopping.
    pub continue_after_accept: bool,
    /// Scans at least this long are checked for poor parallelism.
    pub slow_scan_ms: u64,
    /// Per-scan CPU/wall factor below which a slow scan is reported.
    pub low_parallelism_factor: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            acceptance_threshold: 0.10,
            full_scan_ratio: 100.0,
            low_selectivity_ratio: 0.5,
            dense_groupby_ratio: 0.9,
            float_tolerance: 1e-9,
            baseline_repetitions: 3,
            execute_timeout_ms: 60_000,
            continue_after_accept: false,
            slow_scan_ms: 100,
            low_parallelism_factor: 1.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg: AnalyzerConfig =
            serde_json::from_str(r#"{"acceptance_threshold": 0.25}"#).unwrap();
        assert_eq!(cfg.acceptance_threshold, 0.25);
        assert_eq!(cfg.baseline_repetitions, 3);
        assert_eq!(cfg.low_selectivity_ratio, 0.5);
    }
}
