/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Trace event parsing.
//!
//! Converts raw scan-event records into structured [`ScanEvent`]s. Per-event
//! tagging is a pure function over one record driven by a marker table;
//! run-level rules (full scans, fusion blocks, dense group-bys, semi-join
//! selectivity) need the whole event list and the final result cardinality
//! and run after the per-event pass. Unrecognized text is never an error,
//! it simply yields zero tags.

use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::{char, digit1, multispace0};
use nom::IResult;
use rayon::prelude::*;
use shared::trace::{EventClass, Pattern, RawEvent, ScanEvent};
use std::collections::BTreeSet;

/// Marker substring to pattern tag. Detection rules are data-driven so the
/// catalog can grow without touching control flow.
const MARKER_TAGS: &[(&str, Pattern)] = &[
    ("CallbackDataID", Pattern::RowCallback),
    ("EncodeCallback", Pattern::EncodeCallback),
    ("ININDEX", Pattern::SemiJoinBatch),
];

const SIZE_ANNOTATION: &str = "Estimated size";

/// Parses one raw record. Fails with `MalformedEvent` when the query text or
/// the duration is absent; all matching marker tags are attached.
pub fn parse_event(raw: &RawEvent) -> Result<ScanEvent, AnalyzerError> {
    let text = raw
        .text
        .clone()
        .ok_or_else(|| AnalyzerError::MalformedEvent("missing query text".to_string()))?;
    let duration_ms = raw.duration_ms.ok_or_else(|| {
        AnalyzerError::MalformedEvent(format!("missing duration: {}", summarize(&text)))
    })?;

    let mut patterns = BTreeSet::new();
    for (marker, pattern) in MARKER_TAGS {
        if text.contains(marker) {
            patterns.insert(*pattern);
        }
    }

    let (rows, bytes) = match text.find(SIZE_ANNOTATION) {
        Some(pos) => match estimated_size(&text[pos..]) {
            Ok((_, (rows, bytes))) => (Some(rows), Some(bytes)),
            Err(_) => (None, None),
        },
        None => (None, None),
    };

    Ok(ScanEvent {
        start_ms: raw.start_offset_ms.unwrap_or(0),
        duration_ms,
        cpu_time_ms: raw.cpu_time_ms.unwrap_or(0),
        rows,
        bytes,
        patterns,
        low_selectivity_batch: false,
        cache_match: raw.class == EventClass::CacheMatch,
        text,
    })
}

/// Parses a whole captured run and applies the run-level tagging rules.
/// Per-event parsing is pure, so it runs in parallel while preserving the
/// original event order.
pub fn parse_run(
    raws: &[RawEvent],
    result_rows: u64,
    cfg: &AnalyzerConfig,
) -> Result<Vec<ScanEvent>, AnalyzerError> {
    let mut events: Vec<ScanEvent> = raws
        .par_iter()
        .map(parse_event)
        .collect::<Result<Vec<_>, _>>()?;
    tag_full_scans(&mut events, result_rows, cfg);
    tag_fusion_blocks(&mut events);
    tag_dense_group_by(&mut events, cfg);
    flag_low_selectivity_batches(&mut events, cfg);
    Ok(events)
}

/// `Estimated size ( volume, marshalling bytes ): <rows>, <bytes>`
fn estimated_size(input: &str) -> IResult<&str, (u64, u64)> {
    let (input, _) = tag(SIZE_ANNOTATION)(input)?;
    let (input, _) = take_until(":")(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, rows) = digit1(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(',')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, bytes) = digit1(input)?;
    Ok((
        input,
        (rows.parse().unwrap_or(u64::MAX), bytes.parse().unwrap_or(u64::MAX)),
    ))
}

fn summarize(text: &str) -> String {
    let mut short: String = text.chars().take(40).collect();
    if short.len() < text.len() {
        short.push_str("...");
    }
    short
}

/// Table name after `FROM`, unquoting `'Table Name'` forms.
fn from_table(text: &str) -> Option<String> {
    let idx = text.find("FROM ")?;
    let rest = text[idx + 5..].trim_start();
    if let Some(quoted) = rest.strip_prefix('\'') {
        let end = quoted.find('\'')?;
        Some(quoted[..end].to_string())
    } else {
        let end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if end == 0 {
            None
        } else {
            Some(rest[..end].to_string())
        }
    }
}

fn where_clause(text: &str) -> Option<String> {
    let idx = text.find(" WHERE ")?;
    let rest = &text[idx + 7..];
    let end = rest.find(SIZE_ANNOTATION).unwrap_or(rest.len());
    Some(normalize_ws(&rest[..end]))
}

fn select_list(text: &str) -> Option<String> {
    let start = text.find("SELECT ")? + 7;
    let end = text[start..].find(" FROM ")? + start;
    Some(normalize_ws(&text[start..end]))
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tag_full_scans(events: &mut [ScanEvent], result_rows: u64, cfg: &AnalyzerConfig) {
    let threshold = cfg.full_scan_ratio * result_rows.max(1) as f64;
    for event in events.iter_mut() {
        if event.cache_match || where_clause(&event.text).is_some() {
            continue;
        }
        if let Some(rows) = event.rows {
            if rows as f64 > threshold {
                event.patterns.insert(Pattern::FullScan);
            }
        }
    }
}

fn tag_fusion_blocks(events: &mut [ScanEvent]) {
    let shape: Vec<_> = events
        .iter()
        .map(|e| {
            (
                from_table(&e.text),
                select_list(&e.text),
                where_clause(&e.text),
                e.cache_match || e.has_pattern(Pattern::SemiJoinBatch),
            )
        })
        .collect();
    for i in 0..events.len() {
        for j in (i + 1)..events.len() {
            let (ti, si, wi, skip_i) = &shape[i];
            let (tj, sj, wj, skip_j) = &shape[j];
            if *skip_i || *skip_j || ti.is_none() || ti != tj {
                continue;
            }
            if wi == wj && si != sj {
                events[i].patterns.insert(Pattern::FusionBlockedVertical);
                events[j].patterns.insert(Pattern::FusionBlockedVertical);
            } else if si == sj && wi != wj {
                events[i].patterns.insert(Pattern::FusionBlockedHorizontal);
                events[j].patterns.insert(Pattern::FusionBlockedHorizontal);
            }
        }
    }
}

/// Largest row count observed for a table across plain (unbatched) scans;
/// the closest available stand-in for the table's cardinality.
fn table_cardinality(events: &[ScanEvent], table: &str) -> Option<u64> {
    events
        .iter()
        .filter(|e| {
            !e.cache_match
                && !e.has_pattern(Pattern::SemiJoinBatch)
                && from_table(&e.text).as_deref() == Some(table)
        })
        .filter_map(|e| e.rows)
        .max()
}

fn tag_dense_group_by(events: &mut [ScanEvent], cfg: &AnalyzerConfig) {
    let cardinalities: Vec<Option<u64>> = events
        .iter()
        .map(|e| from_table(&e.text).and_then(|t| table_cardinality(events, &t)))
        .collect();
    for (event, table_rows) in events.iter_mut().zip(cardinalities) {
        if event.cache_match {
            continue;
        }
        // a select list with a bare column groups by it
        let groups_by_column = select_list(&event.text)
            .map(|s| s.split(',').any(|item| !item.contains('(')))
            .unwrap_or(false);
        if !groups_by_column {
            continue;
        }
        if let (Some(rows), Some(table_rows)) = (event.rows, table_rows) {
            if table_rows > 0 && rows as f64 >= cfg.dense_groupby_ratio * table_rows as f64 {
                event.patterns.insert(Pattern::DenseGroupByOnKey);
            }
        }
    }
}

/// Matches `ININDEX $Set` consumers against their `INTO $Set` builders and
/// flags low selectivity when the preliminary set covers too much of the
/// filtered table. Missing cardinality estimates never set the flag.
fn flag_low_selectivity_batches(events: &mut [ScanEvent], cfg: &AnalyzerConfig) {
    let builders: Vec<(String, Option<u64>)> = events
        .iter()
        .filter_map(|e| batch_set_name(&e.text, "INTO ").map(|name| (name, e.rows)))
        .collect();
    for i in 0..events.len() {
        if !events[i].has_pattern(Pattern::SemiJoinBatch) {
            continue;
        }
        let set_name = match batch_set_name(&events[i].text, "ININDEX ") {
            Some(name) => name,
            None => continue,
        };
        let set_rows = builders
            .iter()
            .find(|(name, _)| *name == set_name)
            .and_then(|(_, rows)| *rows);
        let table_rows = from_table(&events[i].text)
            .and_then(|t| table_cardinality(events, &t))
            .or(events[i].rows);
        if let (Some(set_rows), Some(table_rows)) = (set_rows, table_rows) {
            if table_rows > 0 && set_rows as f64 > cfg.low_selectivity_ratio * table_rows as f64 {
                events[i].low_selectivity_batch = true;
            }
        }
    }
}

/// `$`-prefixed set name following a marker, e.g. `ININDEX $Set0`.
fn batch_set_name(text: &str, marker: &str) -> Option<String> {
    let idx = text.find(marker)?;
    let rest = text[idx + marker.len()..].trim_start();
    let rest = rest.strip_prefix('$')?;
    let end = rest
        .find(|c: char| !c.is_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(rest[..end].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, start: u64, duration: u64) -> RawEvent {
        RawEvent::scan(text, start, duration, duration)
    }

    #[test]
    fn test_missing_duration_is_malformed() {
        let mut raw = scan("SELECT 'Sales'[Color] FROM 'Sales'", 0, 10);
        raw.duration_ms = None;
        match parse_event(&raw) {
            Err(AnalyzerError::MalformedEvent(_)) => {}
            other => panic!("expected MalformedEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_text_is_malformed() {
        let mut raw = scan("x", 0, 10);
        raw.text = None;
        assert!(matches!(
            parse_event(&raw),
            Err(AnalyzerError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_unknown_text_yields_zero_tags() {
        let event = parse_event(&scan("whatever the engine said", 0, 5)).unwrap();
        assert!(event.patterns.is_empty());
    }

    #[test]
    fn test_callback_marker_detected() {
        let event = parse_event(&scan(
            "SELECT SUM('Sales'[Amount]) FROM 'Sales' WHERE [CallbackDataID(IF(...))]",
            0,
            50,
        ))
        .unwrap();
        assert!(event.has_pattern(Pattern::RowCallback));
    }

    #[test]
    fn test_multiple_markers_all_attach() {
        let event = parse_event(&scan(
            "SELECT 'Sales'[Key] FROM 'Sales' WHERE [CallbackDataID(x)] VAND EncodeCallback('Sales'[Key])",
            0,
            50,
        ))
        .unwrap();
        assert!(event.has_pattern(Pattern::RowCallback));
        assert!(event.has_pattern(Pattern::EncodeCallback));
    }

    #[test]
    fn test_estimated_size_annotation() {
        let event = parse_event(&scan(
            "SELECT 'Sales'[Color] FROM 'Sales';; Estimated size ( volume, marshalling bytes ): 8640, 276480",
            0,
            20,
        ))
        .unwrap();
        assert_eq!(event.rows, Some(8640));
        assert_eq!(event.bytes, Some(276480));
    }

    #[test]
    fn test_full_scan_tagging_against_result_cardinality() {
        let raws = vec![scan(
            "SELECT 'Sales'[Amount] FROM 'Sales';; Estimated size ( volume, marshalling bytes ): 2000, 16000",
            0,
            100,
        )];
        let cfg = AnalyzerConfig {
            full_scan_ratio: 100.0,
            ..AnalyzerConfig::default()
        };
        // 100-row result: 2000 rows stays below the 100x threshold
        let events = parse_run(&raws, 100, &cfg).unwrap();
        assert!(!events[0].has_pattern(Pattern::FullScan));
        let events = parse_run(&raws, 1, &cfg).unwrap();
        assert!(events[0].has_pattern(Pattern::FullScan));
    }

    #[test]
    fn test_filtered_scan_is_never_full_scan() {
        let raws = vec![scan(
            "SELECT 'Sales'[Amount] FROM 'Sales' WHERE 'Sales'[Year] = 2024;; Estimated size ( volume, marshalling bytes ): 2000, 16000",
            0,
            100,
        )];
        let events = parse_run(&raws, 1, &AnalyzerConfig::default()).unwrap();
        assert!(!events[0].has_pattern(Pattern::FullScan));
    }

    #[test]
    fn test_vertical_fusion_block() {
        let raws = vec![
            scan("SELECT 'Sales'[Amount] FROM 'Sales' WHERE 'Sales'[Year] = 2024", 0, 30),
            scan("SELECT 'Sales'[Cost] FROM 'Sales' WHERE 'Sales'[Year] = 2024", 35, 30),
        ];
        let events = parse_run(&raws, 1, &AnalyzerConfig::default()).unwrap();
        assert!(events[0].has_pattern(Pattern::FusionBlockedVertical));
        assert!(events[1].has_pattern(Pattern::FusionBlockedVertical));
    }

    #[test]
    fn test_horizontal_fusion_block() {
        let raws = vec![
            scan("SELECT 'Sales'[Amount] FROM 'Sales' WHERE 'Sales'[Year] = 2023", 0, 30),
            scan("SELECT 'Sales'[Amount] FROM 'Sales' WHERE 'Sales'[Year] = 2024", 35, 30),
        ];
        let events = parse_run(&raws, 1, &AnalyzerConfig::default()).unwrap();
        assert!(events[0].has_pattern(Pattern::FusionBlockedHorizontal));
        assert!(events[1].has_pattern(Pattern::FusionBlockedHorizontal));
    }

    #[test]
    fn test_low_selectivity_semijoin_batch() {
        let raws = vec![
            scan(
                "SELECT 'Product'[Key] FROM 'Product' INTO $Set0;; Estimated size ( volume, marshalling bytes ): 900, 7200",
                0,
                20,
            ),
            scan(
                "SELECT SUM('Sales'[Amount]) FROM 'Sales' WHERE 'Sales'[ProductKey] ININDEX $Set0",
                25,
                60,
            ),
            scan(
                "SELECT 'Sales'[Amount] FROM 'Sales';; Estimated size ( volume, marshalling bytes ): 1000, 8000",
                90,
                10,
            ),
        ];
        let events = parse_run(&raws, 1, &AnalyzerConfig::default()).unwrap();
        assert!(events[1].has_pattern(Pattern::SemiJoinBatch));
        // 900-row set against a 1000-row table is above the 0.5 default
        assert!(events[1].low_selectivity_batch);
    }

    #[test]
    fn test_selective_semijoin_batch_is_not_flagged() {
        let raws = vec![
            scan(
                "SELECT 'Product'[Key] FROM 'Product' INTO $Set0;; Estimated size ( volume, marshalling bytes ): 10, 80",
                0,
                20,
            ),
            scan(
                "SELECT SUM('Sales'[Amount]) FROM 'Sales' WHERE 'Sales'[ProductKey] ININDEX $Set0",
                25,
                60,
            ),
            scan(
                "SELECT 'Sales'[Amount] FROM 'Sales';; Estimated size ( volume, marshalling bytes ): 1000, 8000",
                90,
                10,
            ),
        ];
        let events = parse_run(&raws, 1, &AnalyzerConfig::default()).unwrap();
        assert!(events[1].has_pattern(Pattern::SemiJoinBatch));
        assert!(!events[1].low_selectivity_batch);
    }

    #[test]
    fn test_dense_group_by_on_key() {
        let raws = vec![
            scan(
                "SELECT 'Sales'[OrderKey] FROM 'Sales';; Estimated size ( volume, marshalling bytes ): 9990, 79920",
                0,
                40,
            ),
            scan(
                "SELECT SUM('Sales'[Amount]) FROM 'Sales';; Estimated size ( volume, marshalling bytes ): 10000, 80000",
                45,
                40,
            ),
        ];
        let events = parse_run(&raws, 1, &AnalyzerConfig::default()).unwrap();
        assert!(events[0].has_pattern(Pattern::DenseGroupByOnKey));
        // pure aggregate select list is not a grouping
        assert!(!events[1].has_pattern(Pattern::DenseGroupByOnKey));
    }
}
