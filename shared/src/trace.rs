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
use std::collections::BTreeSet;
use std::fmt;

/// Structural anti-pattern tags detected on storage-engine scans.
///
/// Tags are immutable once attached to an event and are never mutually
/// exclusive: one scan may carry any combination of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Per-row fallback from the storage engine into the formula engine.
    RowCallback,
    /// Grouping by a derived, non-physical value.
    EncodeCallback,
    /// Unfiltered scan returning far more rows than the final result needs.
    FullScan,
    /// Two-stage scan: a preliminary set built first, then used as a
    /// membership filter in a later stage.
    SemiJoinBatch,
    /// Same table and filter scanned more than once for different columns.
    FusionBlockedVertical,
    /// Same table and columns scanned more than once under different filters.
    FusionBlockedHorizontal,
    /// Grouping by a key-like column producing roughly one group per row.
    DenseGroupByOnKey,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pattern::RowCallback => "RowCallback",
            Pattern::EncodeCallback => "EncodeCallback",
            Pattern::FullScan => "FullScan",
            Pattern::SemiJoinBatch => "SemiJoinBatch",
            Pattern::FusionBlockedVertical => "FusionBlockedVertical",
            Pattern::FusionBlockedHorizontal => "FusionBlockedHorizontal",
            Pattern::DenseGroupByOnKey => "DenseGroupByOnKey",
        };
        write!(f, "{}", name)
    }
}

/// Kind of a raw trace record as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventClass {
    /// A physical storage-engine scan.
    Scan,
    /// A scan answered from the storage-engine cache.
    CacheMatch,
}

/// One low-level trace record exactly as the engine emitted it.
///
/// Fields the engine failed to populate stay `None`; the parser decides
/// which of them are mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub class: EventClass,
    pub text: Option<String>,
    pub start_offset_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub cpu_time_ms: Option<u64>,
}

impl RawEvent {
    pub fn scan(text: &str, start_offset_ms: u64, duration_ms: u64, cpu_time_ms: u64) -> Self {
        RawEvent {
            class: EventClass::Scan,
            text: Some(text.to_string()),
            start_offset_ms: Some(start_offset_ms),
            duration_ms: Some(duration_ms),
            cpu_time_ms: Some(cpu_time_ms),
        }
    }

    pub fn cache_match(text: &str, start_offset_ms: u64) -> Self {
        RawEvent {
            class: EventClass::CacheMatch,
            text: Some(text.to_string()),
            start_offset_ms: Some(start_offset_ms),
            duration_ms: Some(0),
            cpu_time_ms: Some(0),
        }
    }
}

/// A parsed storage-engine scan, ordered by start offset within its run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub text: String,
    /// Start offset relative to the beginning of the run, in milliseconds.
    pub start_ms: u64,
    pub duration_ms: u64,
    pub cpu_time_ms: u64,
    /// Row count from the embedded size annotation, when present.
    pub rows: Option<u64>,
    /// Byte volume from the embedded size annotation, when present.
    pub bytes: Option<u64>,
    pub patterns: BTreeSet<Pattern>,
    /// Severity flag for `SemiJoinBatch`: the preliminary set covers too
    /// large a fraction of the filtered table.
    pub low_selectivity_batch: bool,
    pub cache_match: bool,
}

impl ScanEvent {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }

    pub fn has_pattern(&self, pattern: Pattern) -> bool {
        self.patterns.contains(&pattern)
    }
}
