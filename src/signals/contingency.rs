//! 2x2 contingency table construction.
//!
//! Tables are rebuilt fresh from the pool indexes on every query; they are
//! never a source of truth. Zero cells are valid inputs to the statistics
//! layer, not errors.

use std::collections::HashSet;

use serde::Serialize;

use crate::cases::CasePool;

/// Comparator slice a table is drawn against.
#[derive(Debug, Clone)]
pub enum Comparator {
    /// The whole canonical pool.
    WholeDataset,
    /// An explicit set of arena ordinals.
    Subset(Vec<usize>),
}

/// Exposure/outcome cell counts for a (drug, reaction) pair.
///
/// `a` exposed with event, `b` exposed without, `c` unexposed with event,
/// `d` the remainder. Invariant: `a + b + c + d` equals the comparator size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    /// Build a table for `(drug, reaction)` against a comparator slice.
    pub fn from_pool(
        pool: &CasePool,
        drug: &str,
        reaction: &str,
        comparator: &Comparator,
    ) -> Self {
        match comparator {
            Comparator::WholeDataset => {
                let drug_set: HashSet<usize> =
                    pool.cases_with_drug(drug).iter().copied().collect();
                let reaction_set: HashSet<usize> =
                    pool.cases_with_reaction(reaction).iter().copied().collect();
                let a = drug_set.intersection(&reaction_set).count() as u64;
                let b = drug_set.len() as u64 - a;
                let c = reaction_set.len() as u64 - a;
                let d = pool.len() as u64 - a - b - c;
                Self { a, b, c, d }
            }
            Comparator::Subset(indices) => Self::from_ordinals(pool, drug, reaction, indices),
        }
    }

    /// Build a table from an explicit slice of arena ordinals, used for
    /// subgroup strata and custom comparator pools.
    pub fn from_ordinals(pool: &CasePool, drug: &str, reaction: &str, ordinals: &[usize]) -> Self {
        let mut table = Self {
            a: 0,
            b: 0,
            c: 0,
            d: 0,
        };
        for &idx in ordinals {
            let case = &pool.case(idx).case;
            let exposed = case.drugs.iter().any(|d| d == drug);
            let with_event = case.reactions.iter().any(|r| r == reaction);
            match (exposed, with_event) {
                (true, true) => table.a += 1,
                (true, false) => table.b += 1,
                (false, true) => table.c += 1,
                (false, false) => table.d += 1,
            }
        }
        table
    }

    pub fn total(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }

    pub fn has_zero_cell(&self) -> bool {
        self.a == 0 || self.b == 0 || self.c == 0 || self.d == 0
    }

    /// Cell counts as floats with the Haldane-Anscombe correction applied
    /// when any cell is zero. Callers flag corrected results `low_confidence`.
    pub fn corrected_cells(&self) -> (f64, f64, f64, f64) {
        let (a, b, c, d) = (
            self.a as f64,
            self.b as f64,
            self.c as f64,
            self.d as f64,
        );
        if self.has_zero_cell() {
            (a + 0.5, b + 0.5, c + 0.5, d + 0.5)
        } else {
            (a, b, c, d)
        }
    }
}
