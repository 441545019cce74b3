/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Derived metrics over one captured run.
//!
//! Storage-engine time is the union of scan intervals, never their sum:
//! concurrent scans must not double-count. Formula-engine time is the gap
//! left over, i.e. intervals with no active scan. Everything here is pure
//! computation over an immutable run and is recomputed on demand.

use serde::Serialize;
use shared::run::ExecutionRun;
use shared::trace::ScanEvent;

/// CPU/wall ratio of a single scan, reported alongside the aggregate so one
/// poorly parallelized scan is never hidden inside a healthy total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanParallelism {
    pub index: usize,
    pub duration_ms: u64,
    pub cpu_time_ms: u64,
    /// `None` for zero-duration scans.
    pub factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_ms: u64,
    pub fe_ms: u64,
    pub se_ms: u64,
    pub fe_pct: f64,
    pub se_pct: f64,
    pub se_query_count: usize,
    pub se_cpu_ms: u64,
    pub cache_hits: usize,
    /// Aggregate SE parallelism: total scan CPU over SE wall time. `None`
    /// when SE wall time is zero (e.g. a fully cache-served run), where the
    /// ratio is not meaningful.
    pub parallelism: Option<f64>,
    pub per_scan: Vec<ScanParallelism>,
}

pub fn aggregate(run: &ExecutionRun) -> Metrics {
    let total = run.total_duration_ms;
    let scans: Vec<&ScanEvent> = run.events.iter().filter(|e| !e.cache_match).collect();
    let se_ms = interval_union(&scans, total);
    let fe_ms = total.saturating_sub(se_ms);
    let se_cpu_ms: u64 = scans.iter().map(|e| e.cpu_time_ms).sum();
    let parallelism = if se_ms == 0 {
        None
    } else {
        Some(se_cpu_ms as f64 / se_ms as f64)
    };
    let per_scan = run
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.cache_match)
        .map(|(index, e)| ScanParallelism {
            index,
            duration_ms: e.duration_ms,
            cpu_time_ms: e.cpu_time_ms,
            factor: if e.duration_ms == 0 {
                None
            } else {
                Some(e.cpu_time_ms as f64 / e.duration_ms as f64)
            },
        })
        .collect();
    let (fe_pct, se_pct) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            100.0 * fe_ms as f64 / total as f64,
            100.0 * se_ms as f64 / total as f64,
        )
    };
    Metrics {
        total_ms: total,
        fe_ms,
        se_ms,
        fe_pct,
        se_pct,
        se_query_count: scans.len(),
        se_cpu_ms,
        cache_hits: run.events.iter().filter(|e| e.cache_match).count(),
        parallelism,
        per_scan,
    }
}

/// Size of the union of scan intervals, clipped to `[0, total]`.
fn interval_union(scans: &[&ScanEvent], total: u64) -> u64 {
    let mut intervals: Vec<(u64, u64)> = scans
        .iter()
        .map(|e| (e.start_ms.min(total), e.end_ms().min(total)))
        .filter(|(start, end)| end > start)
        .collect();
    intervals.sort_unstable();
    let mut covered = 0;
    let mut current: Option<(u64, u64)> = None;
    for (start, end) in intervals {
        match current {
            Some((cur_start, cur_end)) if start <= cur_end => {
                current = Some((cur_start, cur_end.max(end)));
            }
            Some((cur_start, cur_end)) => {
                covered += cur_end - cur_start;
                current = Some((start, end));
            }
            None => current = Some((start, end)),
        }
    }
    if let Some((start, end)) = current {
        covered += end - start;
    }
    covered
}
