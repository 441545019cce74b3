/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Anti-pattern catalog and classifier
//!
//! A registry of named detectors applied to the resolved definition text and
//! to the parsed scan events of one run. The classifier never executes
//! anything: detection is static text/structure inspection, false positives
//! allowed. Each static finding is cross-validated against the trace patterns
//! observed in the same run; a finding with no corroborating pattern is
//! downgraded to unconfirmed and never auto-applied.
//!
//! - `catalog`: remediation ids, findings, the rule registry
//! - `rules`: the individual pure detectors and their text utilities

pub mod catalog;
pub mod rules;

pub use catalog::{Finding, PatternCatalog, RemediationId};
