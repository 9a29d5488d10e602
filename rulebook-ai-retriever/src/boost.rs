//! Soft document boosts inferred from the question text.
//!
//! A rule pairs a case-insensitive pattern with a document and a multiplier.
//! Boosts only ever scale scores; they never exclude a document.

use crate::error::{Result, RetrieverError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocBoostRule {
    pub pattern: String,
    pub doc_id: String,
    pub boost: f32,
}

impl DocBoostRule {
    pub fn new<P: Into<String>, D: Into<String>>(pattern: P, doc_id: D, boost: f32) -> Self {
        Self {
            pattern: pattern.into(),
            doc_id: doc_id.into(),
            boost,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.boost.is_finite() && self.boost > 0.0) {
            return Err(RetrieverError::config(format!(
                "boost for {} must be a positive number, got {}",
                self.doc_id, self.boost
            )));
        }
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<Regex> {
        RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RetrieverError::config(format!("invalid boost pattern {:?}: {e}", self.pattern)))
    }
}

/// Multipliers per document id. Documents not listed have a boost of 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocBoosts(HashMap<String, f32>);

impl DocBoosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Into<String>>(mut self, doc_id: S, boost: f32) -> Self {
        self.apply(doc_id.into(), boost);
        self
    }

    /// Matching rules for the same document multiply.
    fn apply(&mut self, doc_id: String, boost: f32) {
        *self.0.entry(doc_id).or_insert(1.0) *= boost;
    }

    pub fn factor(&self, doc_id: &str) -> f32 {
        self.0.get(doc_id).copied().unwrap_or(1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compiled set of [`DocBoostRule`]s.
#[derive(Debug, Clone, Default)]
pub struct DocBooster {
    rules: Vec<(Regex, String, f32)>,
}

impl DocBooster {
    pub fn new(rules: &[DocBoostRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                rule.validate()?;
                Ok((rule.compile()?, rule.doc_id.clone(), rule.boost))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn boosts_for(&self, question: &str) -> DocBoosts {
        let mut boosts = DocBoosts::new();
        for (pattern, doc_id, boost) in &self.rules {
            if pattern.is_match(question) {
                boosts.apply(doc_id.clone(), *boost);
            }
        }
        boosts
    }
}
