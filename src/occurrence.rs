//! Occurrence counters: leaves of the invocation tree, one per concrete call
//! shape actually seen.

use std::collections::BTreeSet;

use crate::arrangement::ArrangementId;
use crate::call_pattern::CallPattern;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct OccurrenceCounter {
    pattern: CallPattern,
    args: Vec<Value>,
    count: usize,
    arrangements: BTreeSet<ArrangementId>,
}

impl OccurrenceCounter {
    pub fn new(pattern: CallPattern) -> Self {
        let args = pattern.arg_values();
        Self {
            pattern,
            args,
            count: 0,
            arrangements: BTreeSet::new(),
        }
    }

    /// Count one call, crediting `winner` if an arrangement handled it.
    pub fn record(&mut self, winner: Option<ArrangementId>) {
        self.count += 1;
        if let Some(id) = winner {
            self.arrangements.insert(id);
        }
    }

    pub fn pattern(&self) -> &CallPattern {
        &self.pattern
    }

    /// The recorded argument values (receiver excluded).
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Arrangements ever credited for this call shape, by id.
    pub fn arrangements(&self) -> &BTreeSet<ArrangementId> {
        &self.arrangements
    }
}
