/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! End-to-end walkthrough against a scripted in-process engine: measure a
//! baseline, classify the trace, rewrite the offending measure, verify the
//! candidate, and print the resulting report.

extern crate daxtune;
extern crate shared;

use daxtune::controller::SessionOutcome;
use daxtune::{aggregate, AnalyzerConfig, Session};
use rustc_hash::FxHashMap;
use shared::engine::{AnalyticsEngine, Connector, EngineError, Execution};
use shared::result::{CellValue, ResultSet};
use shared::trace::RawEvent;
use std::time::Duration;

/// A toy engine with two canned plans: the original measure pays a per-row
/// callback, the rewritten one does not.
struct DemoEngine;

impl AnalyticsEngine for DemoEngine {
    fn clear_cache(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn execute(
        &mut self,
        definition_text: &str,
        want_trace: bool,
        _timeout: Duration,
    ) -> Result<Execution, EngineError> {
        let slow = definition_text.contains("DIVIDE(");
        let duration = if slow { 1340 } else { 410 };
        let trace = if want_trace {
            Some(if slow {
                vec![RawEvent::scan(
                    "SELECT SUM('Sales'[Amount]) FROM 'Sales' WHERE \
                     [CallbackDataID(DIVIDE('Sales'[Amount], 'Sales'[Qty]))];; \
                     Estimated size ( volume, marshalling bytes ): 1200000, 9600000",
                    0,
                    1290,
                    4980,
                )]
            } else {
                vec![RawEvent::scan(
                    "SELECT SUM('Sales'[Amount]), SUM('Sales'[Qty]) FROM 'Sales';; \
                     Estimated size ( volume, marshalling bytes ): 1200000, 9600000",
                    0,
                    360,
                    1310,
                )]
            })
        } else {
            None
        };
        Ok(Execution {
            result: ResultSet {
                columns: vec!["Margin".to_string()],
                rows: vec![vec![CellValue::Real(17.25)]],
                explicit_order: false,
            },
            total_duration_ms: duration,
            trace,
        })
    }

    fn fetch_trace(&mut self) -> Result<Vec<RawEvent>, EngineError> {
        Err(EngineError::TraceCapture("no deferred trace".to_string()))
    }
}

struct DemoConnector;

impl Connector for DemoConnector {
    type Engine = DemoEngine;

    fn connect(&self, _target: &str) -> Result<DemoEngine, EngineError> {
        Ok(DemoEngine)
    }
}

fn main() {
    env_logger::init();

    let mut catalog = FxHashMap::default();
    catalog.insert(
        "Margin".to_string(),
        "SUMX('Sales', DIVIDE('Sales'[Amount], 'Sales'[Qty]))".to_string(),
    );
    let query = "EVALUATE ROW(\"Margin\", [Margin])";

    let mut session = Session::connect(&DemoConnector, "demo", AnalyzerConfig::default())
        .expect("demo connector never fails");

    let definition = shared::definition::resolve(query, &catalog).expect("catalog is closed");
    let baseline = session.baseline(&definition).expect("demo engine executes");
    let metrics = aggregate(&baseline);
    println!("Baseline: {} ms total", metrics.total_ms);
    println!(
        "  FE {} ms ({:.0}%) / SE {} ms ({:.0}%), {} SE quer(y/ies)",
        metrics.fe_ms, metrics.fe_pct, metrics.se_ms, metrics.se_pct, metrics.se_query_count
    );
    for scan in &baseline.events {
        println!("  scan: {:?} rows={:?}", scan.patterns, scan.rows);
    }

    let report = session.optimize(&catalog, query).expect("demo engine executes");
    println!("\nAttempts:");
    for attempt in &report.attempts {
        println!(
            "  {:?} on [{}]: {} ms -> {:?} ms, {:?}",
            attempt.finding.remediation,
            attempt.finding.measure,
            attempt.baseline_ms,
            attempt.candidate_ms,
            attempt.outcome
        );
    }
    match &report.outcome {
        SessionOutcome::Accepted {
            definition,
            improvement,
        } => {
            println!("\nAccepted ({:.1}% faster):", improvement * 100.0);
            println!("{}", definition.full_text());
        }
        SessionOutcome::Exhausted => println!("\nNo safe improving rewrite found."),
    }
}
