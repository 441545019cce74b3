/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Query definitions and measure reference resolution.
//!
//! A query plus the closed set of measure bodies it transitively references.
//! Resolution chases bare `[Measure]` references through a catalog to a fixed
//! point; a reference that resolves to nothing is a dangling-reference error
//! and a loop in the reference graph is a cycle error. `Table[Column]` forms
//! are base data columns and terminate resolution.

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("measure [{from}] references undefined measure [{to}]")]
    DanglingReference { from: String, to: String },
    #[error("cyclic measure references: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },
}

/// A named sub-expression included in a query definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub body: String,
}

/// An executable query together with every measure it transitively uses.
///
/// Built once per optimization attempt and treated as immutable; rewrites
/// produce a new definition via [`QueryDefinition::with_measure_body`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub query: String,
    /// Dependency-ordered: a measure always appears after the measures its
    /// body references.
    pub measures: Vec<Measure>,
}

impl QueryDefinition {
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    /// Clone of this definition with one measure body replaced. The query and
    /// every other measure are untouched, so the output shape is held fixed.
    pub fn with_measure_body(&self, name: &str, body: &str) -> QueryDefinition {
        let measures = self
            .measures
            .iter()
            .map(|m| {
                if m.name == name {
                    Measure {
                        name: m.name.clone(),
                        body: body.to_string(),
                    }
                } else {
                    m.clone()
                }
            })
            .collect();
        QueryDefinition {
            query: self.query.clone(),
            measures,
        }
    }

    /// Executable text: `DEFINE MEASURE` blocks followed by the query.
    pub fn full_text(&self) -> String {
        if self.measures.is_empty() {
            return self.query.clone();
        }
        let mut out = String::from("DEFINE\n");
        for m in &self.measures {
            out.push_str("MEASURE _[");
            out.push_str(&m.name);
            out.push_str("] = ");
            out.push_str(&m.body);
            out.push('\n');
        }
        out.push_str(&self.query);
        out
    }
}

/// Extracts bare measure references (`[Name]`) from an expression, skipping
/// `Table[Column]` forms where the bracket follows an identifier or a quoted
/// table name.
pub fn measure_refs(text: &str) -> Vec<String> {
    static BRACKET: OnceLock<Regex> = OnceLock::new();
    let re = BRACKET.get_or_init(|| Regex::new(r"\[([^\[\]]+)\]").expect("bracket pattern"));
    let mut refs = Vec::new();
    for cap in re.captures_iter(text) {
        let (whole, name) = match (cap.get(0), cap.get(1)) {
            (Some(w), Some(n)) => (w, n),
            _ => continue,
        };
        let preceding = text[..whole.start()].chars().next_back();
        let is_column = matches!(
            preceding,
            Some(c) if c.is_alphanumeric() || c == '_' || c == '\'' || c == ']'
        );
        if !is_column {
            refs.push(name.as_str().to_string());
        }
    }
    refs
}

/// Resolves a query's measure reference graph against a catalog of measure
/// bodies, producing a self-contained [`QueryDefinition`].
pub fn resolve(
    query: &str,
    catalog: &FxHashMap<String, String>,
) -> Result<QueryDefinition, DefinitionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Visit {
        InProgress,
        Done,
    }

    fn visit(
        name: &str,
        referenced_from: &str,
        catalog: &FxHashMap<String, String>,
        state: &mut FxHashMap<String, Visit>,
        stack: &mut Vec<String>,
        out: &mut Vec<Measure>,
    ) -> Result<(), DefinitionError> {
        match state.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let first = stack.iter().position(|n| n == name).unwrap_or(0);
                let mut chain: Vec<String> = stack[first..].to_vec();
                chain.push(name.to_string());
                return Err(DefinitionError::CyclicReference { chain });
            }
            None => {}
        }
        let body = match catalog.get(name) {
            Some(body) => body.clone(),
            None => {
                return Err(DefinitionError::DanglingReference {
                    from: referenced_from.to_string(),
                    to: name.to_string(),
                })
            }
        };
        state.insert(name.to_string(), Visit::InProgress);
        stack.push(name.to_string());
        for child in measure_refs(&body) {
            visit(&child, name, catalog, state, stack, out)?;
        }
        stack.pop();
        state.insert(name.to_string(), Visit::Done);
        out.push(Measure {
            name: name.to_string(),
            body,
        });
        Ok(())
    }

    let mut state = FxHashMap::default();
    let mut stack = Vec::new();
    let mut measures = Vec::new();
    for root in measure_refs(query) {
        visit(&root, "query", catalog, &mut state, &mut stack, &mut measures)?;
    }
    Ok(QueryDefinition {
        query: query.to_string(),
        measures,
    })
}
