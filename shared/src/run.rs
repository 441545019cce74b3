/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::result::ResultSet;
use crate::trace::ScanEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    Cold,
    Warm,
}

/// One captured execution of a query definition, immutable once built.
///
/// Formula-engine and storage-engine durations are derived by the metrics
/// aggregator rather than stored here, so they can never drift from the
/// event list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub total_duration_ms: u64,
    pub cache_state: CacheState,
    /// Parsed scan events ordered by start offset. Empty when `degraded`.
    pub events: Vec<ScanEvent>,
    pub result: ResultSet,
    /// Duration-only run: no trace could be captured, so the run yields no
    /// metrics or findings and is usable for total-time comparison only.
    pub degraded: bool,
}
