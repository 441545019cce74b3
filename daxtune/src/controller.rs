/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The optimization state machine.
//!
//! `Baselined -> Proposing -> Verifying -> {Accepted, Rejected, Exhausted}`.
//! One remediation per candidate; acceptance requires both the improvement
//! threshold and an Equal verdict; a rejected candidate is discarded and the
//! controller returns to the original baseline. Attempts are bounded by the
//! confirmed-finding queue, so the loop always terminates in an explicit
//! state instead of retrying open-endedly.

use crate::baseline::run_baseline;
use crate::cancel::CancelToken;
use crate::classifier::{Finding, PatternCatalog};
use crate::config::AnalyzerConfig;
use crate::equivalence::{self, Difference, Verdict};
use crate::error::AnalyzerError;
use crate::rewrite;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use shared::definition::QueryDefinition;
use shared::engine::AnalyticsEngine;
use shared::run::ExecutionRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Baselined,
    Proposing,
    Verifying,
    Accepted,
    Rejected,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RejectionReason {
    /// Performance-insufficient: improvement below the acceptance threshold.
    BelowThreshold { improvement: f64 },
    /// Semantically different: the candidate result set does not match.
    NotEquivalent(Difference),
    /// The measure body no longer contains the shape the remediation needs.
    RewriteNotApplicable,
    /// Every repetition of the candidate failed to execute.
    CandidateFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttemptOutcome {
    Accepted { improvement: f64 },
    Rejected(RejectionReason),
}

/// One audited candidate: what was tried, against what baseline, and why it
/// was kept or discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationAttempt {
    pub finding: Finding,
    pub candidate: QueryDefinition,
    pub baseline_ms: u64,
    pub candidate_ms: Option<u64>,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionOutcome {
    /// A verified improving rewrite, with its improvement over the original
    /// baseline.
    Accepted {
        definition: QueryDefinition,
        improvement: f64,
    },
    /// No safe improving rewrite was found.
    Exhausted,
}

/// Full report handed back to the caller, serializable for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub outcome: SessionOutcome,
    pub baseline_ms: u64,
    pub attempts: Vec<OptimizationAttempt>,
    /// Static findings with no corroborating trace pattern; listed for
    /// manual review, never auto-applied.
    pub unconfirmed: Vec<Finding>,
    /// Layout/parallelism findings outside this controller's power to fix.
    pub report_only: Vec<Finding>,
}

pub struct OptimizationController<'a, E: AnalyticsEngine> {
    engine: &'a mut E,
    cfg: &'a AnalyzerConfig,
    cancel: &'a CancelToken,
    catalog: PatternCatalog,
    state: ControllerState,
}

impl<'a, E: AnalyticsEngine> OptimizationController<'a, E> {
    pub fn new(engine: &'a mut E, cfg: &'a AnalyzerConfig, cancel: &'a CancelToken) -> Self {
        OptimizationController {
            engine,
            cfg,
            cancel,
            catalog: PatternCatalog::standard(),
            state: ControllerState::Baselined,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Drives the state machine over the confirmed-finding queue derived
    /// from the baseline run.
    pub fn optimize(
        &mut self,
        definition: &QueryDefinition,
        baseline: ExecutionRun,
    ) -> Result<OptimizationReport, AnalyzerError> {
        let findings = if baseline.degraded {
            // a duration-only baseline supports no classification at all:
            // without a trace even static findings cannot be corroborated
            warn!("degraded baseline: skipping classification");
            Vec::new()
        } else {
            self.catalog.classify(definition, &baseline.events, self.cfg)
        };
        let mut queue = Vec::new();
        let mut unconfirmed = Vec::new();
        let mut report_only = Vec::new();
        for finding in findings {
            if !finding.remediation.auto_applicable() {
                report_only.push(finding);
            } else if finding.confirmed {
                queue.push(finding);
            } else {
                unconfirmed.push(finding);
            }
        }
        info!(
            "baseline {} ms: {} confirmed finding(s), {} unconfirmed, {} report-only",
            baseline.total_duration_ms,
            queue.len(),
            unconfirmed.len(),
            report_only.len()
        );

        let original_ms = baseline.total_duration_ms;
        let mut current_baseline = baseline;
        let mut current_definition = definition.clone();
        let mut attempts: Vec<OptimizationAttempt> = Vec::new();
        let mut accepted: Option<QueryDefinition> = None;
        self.state = ControllerState::Baselined;

        for finding in queue {
            if self.cancel.is_cancelled() {
                return Err(AnalyzerError::Cancelled);
            }
            self.state = ControllerState::Proposing;
            debug!("proposing {:?} on [{}]", finding.remediation, finding.measure);
            let candidate_definition = match rewrite::apply(&finding, &current_definition) {
                Some(candidate) => candidate,
                None => {
                    attempts.push(OptimizationAttempt {
                        finding,
                        candidate: current_definition.clone(),
                        baseline_ms: current_baseline.total_duration_ms,
                        candidate_ms: None,
                        outcome: AttemptOutcome::Rejected(RejectionReason::RewriteNotApplicable),
                        at: Utc::now(),
                    });
                    self.state = ControllerState::Baselined;
                    continue;
                }
            };

            self.state = ControllerState::Verifying;
            let candidate_run = match run_baseline(
                self.engine,
                &candidate_definition,
                self.cfg.baseline_repetitions,
                self.cfg,
                self.cancel,
            ) {
                Ok(run) => run,
                Err(AnalyzerError::BaselineFailed) => {
                    warn!("candidate for [{}] failed to execute", finding.measure);
                    attempts.push(OptimizationAttempt {
                        finding,
                        candidate: candidate_definition,
                        baseline_ms: current_baseline.total_duration_ms,
                        candidate_ms: None,
                        outcome: AttemptOutcome::Rejected(RejectionReason::CandidateFailed),
                        at: Utc::now(),
                    });
                    self.state = ControllerState::Baselined;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let baseline_ms = current_baseline.total_duration_ms;
            // a 0 ms baseline cannot be improved on; the ratio must stay finite
            let improvement = (baseline_ms as f64 - candidate_run.total_duration_ms as f64)
                / baseline_ms.max(1) as f64;
            let verdict = equivalence::compare(
                &current_baseline.result,
                &candidate_run.result,
                self.cfg.float_tolerance,
            );
            // equivalence is never skipped: a fast but wrong candidate is
            // a rejection, not a win
            let outcome = match verdict {
                Verdict::NotEqual(diff) => {
                    AttemptOutcome::Rejected(RejectionReason::NotEquivalent(diff))
                }
                Verdict::Equal if improvement >= self.cfg.acceptance_threshold => {
                    AttemptOutcome::Accepted { improvement }
                }
                Verdict::Equal => {
                    AttemptOutcome::Rejected(RejectionReason::BelowThreshold { improvement })
                }
            };
            let is_accepted = matches!(outcome, AttemptOutcome::Accepted { .. });
            attempts.push(OptimizationAttempt {
                finding,
                candidate: candidate_definition.clone(),
                baseline_ms,
                candidate_ms: Some(candidate_run.total_duration_ms),
                outcome,
                at: Utc::now(),
            });

            if is_accepted {
                info!(
                    "accepted: {} ms -> {} ms ({:.1}%)",
                    baseline_ms,
                    candidate_run.total_duration_ms,
                    improvement * 100.0
                );
                accepted = Some(candidate_definition.clone());
                if self.cfg.continue_after_accept {
                    // the accepted candidate becomes the new baseline
                    current_baseline = candidate_run;
                    current_definition = candidate_definition;
                    self.state = ControllerState::Baselined;
                } else {
                    self.state = ControllerState::Accepted;
                    break;
                }
            } else {
                debug!("rejected candidate for [{}]", attempts[attempts.len() - 1].finding.measure);
                // discard the candidate; the original baseline stays canonical
                self.state = ControllerState::Baselined;
            }
        }

        let outcome = match accepted {
            Some(definition) => {
                self.state = ControllerState::Accepted;
                let final_ms = attempts
                    .iter()
                    .rev()
                    .find_map(|a| match a.outcome {
                        AttemptOutcome::Accepted { .. } => a.candidate_ms,
                        _ => None,
                    })
                    .unwrap_or(original_ms);
                SessionOutcome::Accepted {
                    definition,
                    improvement: (original_ms as f64 - final_ms as f64) / original_ms.max(1) as f64,
                }
            }
            None => {
                self.state = ControllerState::Exhausted;
                info!("exhausted: {} attempt(s), none accepted", attempts.len());
                SessionOutcome::Exhausted
            }
        };

        Ok(OptimizationReport {
            outcome,
            baseline_ms: original_ms,
            attempts,
            unconfirmed,
            report_only,
        })
    }
}
