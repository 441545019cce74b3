/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Baseline execution.
//!
//! Runs a definition repeatedly under a cold cache and selects the fastest
//! run as the canonical baseline. Repetitions are strictly sequential: they
//! share one mutable cache state on the external engine, so overlapping
//! cold-cache runs would corrupt each other.

use crate::cancel::CancelToken;
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::parser;
use log::{debug, info, warn};
use shared::definition::QueryDefinition;
use shared::engine::{AnalyticsEngine, EngineError, Execution};
use shared::run::{CacheState, ExecutionRun};
use shared::trace::RawEvent;
use std::time::Duration;

/// Executes `repetitions` cold-cache runs and returns the fastest.
///
/// Failure semantics: a syntax error or connection loss is fatal and
/// propagates immediately; any other execution failure (including a timeout)
/// drops that repetition; a trace-capture failure is retried once and then
/// the repetition is dropped from the traced candidate set. When no
/// repetition captures a trace the fastest duration-only run is returned
/// with `degraded` set — usable for total-time comparison, but yielding no
/// metrics or findings.
pub fn run_baseline<E: AnalyticsEngine>(
    engine: &mut E,
    definition: &QueryDefinition,
    repetitions: usize,
    cfg: &AnalyzerConfig,
    cancel: &CancelToken,
) -> Result<ExecutionRun, AnalyzerError> {
    let text = definition.full_text();
    let timeout = Duration::from_millis(cfg.execute_timeout_ms);
    let mut traced: Vec<ExecutionRun> = Vec::new();
    let mut untraced: Vec<ExecutionRun> = Vec::new();

    for repetition in 0..repetitions {
        if cancel.is_cancelled() {
            return Err(AnalyzerError::Cancelled);
        }
        engine.clear_cache()?;
        let execution = match engine.execute(&text, true, timeout) {
            Ok(execution) => execution,
            Err(err @ EngineError::InvalidQuery(_)) | Err(err @ EngineError::Connection(_)) => {
                return Err(err.into());
            }
            Err(err) => {
                warn!("repetition {} failed to execute: {}", repetition, err);
                continue;
            }
        };
        let Execution {
            result,
            total_duration_ms,
            trace,
        } = execution;
        let raw_trace = match trace {
            Some(raws) => Some(raws),
            None => fetch_trace_with_retry(engine, repetition),
        };
        let run = match raw_trace {
            Some(raws) => match parser::parse_run(&raws, result.rows.len() as u64, cfg) {
                Ok(events) => ExecutionRun {
                    total_duration_ms,
                    cache_state: CacheState::Cold,
                    events,
                    result,
                    degraded: false,
                },
                Err(err) => {
                    warn!("repetition {} trace unusable: {}", repetition, err);
                    duration_only(total_duration_ms, result)
                }
            },
            None => duration_only(total_duration_ms, result),
        };
        debug!(
            "repetition {}: {} ms, {} events{}",
            repetition,
            run.total_duration_ms,
            run.events.len(),
            if run.degraded { " (no trace)" } else { "" }
        );
        if run.degraded {
            untraced.push(run);
        } else {
            traced.push(run);
        }
    }

    if let Some(best) = traced.into_iter().min_by_key(|r| r.total_duration_ms) {
        info!("baseline: {} ms over {} scans", best.total_duration_ms, best.events.len());
        return Ok(best);
    }
    if let Some(best) = untraced.into_iter().min_by_key(|r| r.total_duration_ms) {
        warn!("degraded baseline: no repetition captured a trace");
        return Ok(best);
    }
    Err(AnalyzerError::BaselineFailed)
}

fn fetch_trace_with_retry<E: AnalyticsEngine>(
    engine: &mut E,
    repetition: usize,
) -> Option<Vec<RawEvent>> {
    match engine.fetch_trace() {
        Ok(raws) => Some(raws),
        Err(first) => {
            debug!("repetition {} trace fetch failed once: {}", repetition, first);
            match engine.fetch_trace() {
                Ok(raws) => Some(raws),
                Err(second) => {
                    warn!(
                        "repetition {} dropped from traced set: {}",
                        repetition, second
                    );
                    None
                }
            }
        }
    }
}

fn duration_only(total_duration_ms: u64, result: shared::result::ResultSet) -> ExecutionRun {
    ExecutionRun {
        total_duration_ms,
        cache_state: CacheState::Cold,
        events: Vec::new(),
        result,
        degraded: true,
    }
}
