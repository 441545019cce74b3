/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Boundary traits for the external analytics engine connection.

use crate::result::ResultSet;
use crate::trace::RawEvent;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Fatal to the session; surfaced immediately.
    #[error("connection error: {0}")]
    Connection(String),
    /// Syntax-level failure; fatal and never retried.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Trace could not be captured after a successful execution.
    #[error("trace capture failed: {0}")]
    TraceCapture(String),
    /// The execute-and-trace call exceeded the caller-supplied timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of one engine execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub result: ResultSet,
    pub total_duration_ms: u64,
    /// Raw trace events, when the engine returns them inline.
    pub trace: Option<Vec<RawEvent>>,
}

/// One connected analytics-engine target.
///
/// Trace state is cleared by the next `execute` call, so a trace must be
/// fetched before re-executing.
pub trait AnalyticsEngine {
    fn clear_cache(&mut self) -> Result<(), EngineError>;

    fn execute(
        &mut self,
        definition_text: &str,
        want_trace: bool,
        timeout: Duration,
    ) -> Result<Execution, EngineError>;

    fn fetch_trace(&mut self) -> Result<Vec<RawEvent>, EngineError>;
}

/// Builds engine handles. Connecting yields a brand-new handle; any session
/// built on a previous handle is replaced wholesale, never patched.
pub trait Connector {
    type Engine: AnalyticsEngine;

    fn connect(&self, target: &str) -> Result<Self::Engine, EngineError>;
}
