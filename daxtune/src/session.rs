/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Per-target session state.
//!
//! One session per connected target, owning the engine handle and the cancel
//! token. Connecting builds a brand-new session value; the caller replaces
//! its binding wholesale, so no baseline or attempt state can leak across
//! targets. There is no partial reset.

use crate::baseline::run_baseline;
use crate::cancel::CancelToken;
use crate::config::AnalyzerConfig;
use crate::controller::{OptimizationController, OptimizationReport};
use crate::error::AnalyzerError;
use log::info;
use rustc_hash::FxHashMap;
use shared::definition::{self, QueryDefinition};
use shared::engine::{AnalyticsEngine, Connector, EngineError};
use shared::run::ExecutionRun;

pub struct Session<E: AnalyticsEngine> {
    target: String,
    engine: E,
    cfg: AnalyzerConfig,
    cancel: CancelToken,
}

impl<E: AnalyticsEngine> Session<E> {
    /// Connects to a target. Any previous session for the same caller is
    /// superseded by dropping it in favor of the returned value.
    pub fn connect<C: Connector<Engine = E>>(
        connector: &C,
        target: &str,
        cfg: AnalyzerConfig,
    ) -> Result<Self, EngineError> {
        info!("connecting to {}", target);
        let engine = connector.connect(target)?;
        Ok(Session {
            target: target.to_string(),
            engine,
            cfg,
            cancel: CancelToken::new(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.cfg
    }

    /// Handle for cooperative cancellation; takes effect at the next
    /// repetition or attempt boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Measures the canonical cold-cache baseline for a definition.
    pub fn baseline(
        &mut self,
        definition: &QueryDefinition,
    ) -> Result<ExecutionRun, AnalyzerError> {
        run_baseline(
            &mut self.engine,
            definition,
            self.cfg.baseline_repetitions,
            &self.cfg,
            &self.cancel,
        )
    }

    /// Resolves the query against the measure catalog, measures the
    /// baseline, and drives the optimization loop to a terminal state.
    pub fn optimize(
        &mut self,
        catalog: &FxHashMap<String, String>,
        query: &str,
    ) -> Result<OptimizationReport, AnalyzerError> {
        let definition = definition::resolve(query, catalog)?;
        let baseline = self.baseline(&definition)?;
        let mut controller =
            OptimizationController::new(&mut self.engine, &self.cfg, &self.cancel);
        controller.optimize(&definition, baseline)
    }
}
