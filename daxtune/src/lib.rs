/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! DAX query performance analysis and optimization engine
//!
//! This crate measures a query's execution cost against a tabular analytics
//! engine, decomposes it into formula-engine vs storage-engine contributions,
//! detects structural anti-patterns from low-level trace text, proposes
//! rewrites restricted to measure bodies, and iterates until a verified
//! improvement is reached. The analytics engine itself is an external
//! collaborator behind the `shared::engine` traits.
//!
//! ## Architecture
//!
//! The engine is structured into several focused modules:
//!
//! - `parser`: raw trace records into structured scan events with pattern tags
//! - `metrics`: FE/SE time split, parallelism and cache-hit ratios per run
//! - `classifier`: a data-driven catalog of anti-pattern detectors with
//!   trace-based cross-validation
//! - `rewrite`: remediation application on measure bodies
//! - `baseline`: sequential cold-cache repetitions selecting the fastest run
//! - `controller`: the accept/reject/exhaust optimization state machine
//! - `equivalence`: order-insensitive result-set comparison
//! - `session`: per-target state, replaced wholesale on reconnect

pub mod baseline;
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod equivalence;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod rewrite;
pub mod session;

pub use cancel::CancelToken;
pub use classifier::{Finding, PatternCatalog, RemediationId};
pub use config::AnalyzerConfig;
pub use controller::{OptimizationController, OptimizationReport, SessionOutcome};
pub use equivalence::{compare, Difference, Verdict};
pub use error::AnalyzerError;
pub use metrics::{aggregate, Metrics};
pub use session::Session;
