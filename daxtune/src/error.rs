/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use shared::definition::DefinitionError;
use shared::engine::EngineError;
use thiserror::Error;

/// Failures that surface to the caller. An equivalence mismatch or an
/// exhausted finding queue is a normal reported outcome, not an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    /// A raw trace record is missing a required field.
    #[error("malformed trace event: {0}")]
    MalformedEvent(String),
    /// Every repetition of a baseline failed to execute.
    #[error("no repetition of the baseline executed successfully")]
    BaselineFailed,
    /// Cooperative cancellation observed at a state-machine transition.
    #[error("operation cancelled")]
    Cancelled,
}
