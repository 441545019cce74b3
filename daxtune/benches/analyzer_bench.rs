/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate criterion;
extern crate daxtune;

use criterion::*;
use daxtune::classifier::PatternCatalog;
use daxtune::{aggregate, AnalyzerConfig};
use shared::definition::QueryDefinition;
use shared::result::ResultSet;
use shared::run::{CacheState, ExecutionRun};
use shared::trace::RawEvent;

fn synthetic_trace(scans: usize) -> Vec<RawEvent> {
    (0..scans)
        .map(|i| {
            let table = match i % 4 {
                0 => "Sales",
                1 => "Customer",
                2 => "Product",
                _ => "Date",
            };
            let text = format!(
                "SELECT '{0}'[c{1}] FROM '{0}' WHERE '{0}'[k] = {1};; \
                 Estimated size ( volume, marshalling bytes ): {2}, {3}",
                table,
                i % 7,
                1000 + (i as u64 * 37) % 5000,
                8000 + (i as u64 * 291) % 40000
            );
            // overlapping start offsets so the interval union has work to do
            RawEvent::scan(&text, (i as u64 * 13) % 900, 40 + (i as u64 * 7) % 120, 90)
        })
        .collect()
}

fn parsed_run(scans: usize) -> ExecutionRun {
    let cfg = AnalyzerConfig::default();
    let raws = synthetic_trace(scans);
    let events = daxtune::parser::parse_run(&raws, 500, &cfg).unwrap();
    ExecutionRun {
        total_duration_ms: 1200,
        cache_state: CacheState::Cold,
        events,
        result: ResultSet {
            columns: vec!["v".to_string()],
            rows: Vec::new(),
            explicit_order: false,
        },
        degraded: false,
    }
}

fn bench_parse_run(c: &mut Criterion) {
    let cfg = AnalyzerConfig::default();
    let raws = synthetic_trace(1000);
    c.bench_function("parse_run_1000_scans", |b| {
        b.iter(|| daxtune::parser::parse_run(black_box(&raws), 500, &cfg))
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let run = parsed_run(1000);
    c.bench_function("aggregate_1000_scans", |b| {
        b.iter(|| aggregate(black_box(&run)))
    });
}

fn bench_classify(c: &mut Criterion) {
    let cfg = AnalyzerConfig::default();
    let run = parsed_run(200);
    let definition = QueryDefinition {
        query: "EVALUATE ROW(\"Margin\", [Margin])".to_string(),
        measures: vec![
            shared::definition::Measure {
                name: "Margin".to_string(),
                body: "SUMX('Sales', DIVIDE('Sales'[Amount], 'Sales'[Qty]))".to_string(),
            },
            shared::definition::Measure {
                name: "Status".to_string(),
                body: "IF([Margin] > 0, [Margin], [Fallback])".to_string(),
            },
            shared::definition::Measure {
                name: "Fallback".to_string(),
                body: "CALCULATE(SUM('Sales'[Amount]), FILTER('Sales', 'Sales'[Qty] > 0))"
                    .to_string(),
            },
        ],
    };
    let catalog = PatternCatalog::standard();
    c.bench_function("classify_200_scans", |b| {
        b.iter(|| catalog.classify(black_box(&definition), &run.events, &cfg))
    });
}

criterion_group!(benches, bench_parse_run, bench_aggregate, bench_classify);
criterion_main!(benches);
