//! The subsumption table and the `subsumed` check itself (SPEC_FULL.md §4.3),
//! the largest single component of this crate.

use std::time::Duration;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::dependency::{AllocationGraph, Dependency, ValueId};
use crate::error::EngineError;
use crate::expr::simplify::simplify_exists_expr;
use crate::expr::{Array, Expr};
use crate::itree::NodeId;
use crate::path_condition::{commit_markers, make_marker_map, PathCondition};
use crate::solver::{Solver, Validity};

/// Captured at node removal: the alpha-renamed interpolant plus the shadowed
/// memory snapshots needed to re-derive "does the current state entail this"
/// without re-walking the tree (SPEC_FULL.md §3).
#[derive(Debug, Clone)]
pub struct SubsumptionTableEntry {
    pub node_id: NodeId,
    pub interpolant: Option<Expr>,
    pub singleton_store: IndexMap<ValueId, Expr>,
    pub composite_store: IndexMap<ValueId, Vec<Expr>>,
    pub existentials: Vec<Array>,
    /// The removed node's handle into the observer `SearchTree`, if the
    /// observer is enabled. Used to draw a dashed subsumption edge back to
    /// this entry's origin when it later subsumes a state (SPEC_FULL.md §6).
    pub observer_handle: Option<petgraph::graph::NodeIndex>,
}

impl SubsumptionTableEntry {
    /// Assembles an entry from its already alpha-renamed pieces.
    ///
    /// The interpolant comes from the removed node's own path condition, but
    /// `singleton_store`/`composite_store` must come from the *parent* node's
    /// dependency: the program-point index names the first statement of a
    /// basic block, and the state at that instant is the parent's (klee
    /// `ITree.cpp`'s `getLatestCoreExpressions`/`getCompositeCoreExpressions`,
    /// SPEC_FULL.md §4.4). Resolving that parent handle requires the tree
    /// structure, which this module doesn't have, so the caller builds all
    /// four pieces (sharing one `replacements` alpha-renaming table across
    /// them) and hands them over already computed.
    pub fn capture(
        node_id: NodeId,
        interpolant: Option<Expr>,
        singleton_store: IndexMap<ValueId, Expr>,
        composite_store: IndexMap<ValueId, Vec<Expr>>,
        existentials: Vec<Array>,
        observer_handle: Option<petgraph::graph::NodeIndex>,
    ) -> Self {
        Self {
            node_id,
            interpolant,
            singleton_store,
            composite_store,
            existentials,
            observer_handle,
        }
    }

    fn is_empty(&self) -> bool {
        self.interpolant.is_none() && self.singleton_store.is_empty() && self.composite_store.is_empty()
    }

    /// A read-only view of the execution state being tested for subsumption:
    /// its program point, its own path condition (used to build the marker
    /// map that the solver's unsat core indexes into), and the current values
    /// bound to the program-values this entry's stores reference.
    pub fn subsumed(
        &self,
        solver: &mut dyn Solver,
        state: &StateView<'_>,
        dependency: &Dependency,
        allocations: &mut AllocationGraph,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        if state.node_id != self.node_id {
            return Ok(false);
        }
        if self.is_empty() {
            return Ok(true);
        }

        let Some(state_eq) = self.build_state_equalities(state) else {
            return Ok(false);
        };

        let query = match (&self.interpolant, state_eq) {
            (Some(interpolant), Some(eq)) => Expr::and(interpolant.clone(), eq),
            (Some(interpolant), None) => interpolant.clone(),
            (None, Some(eq)) => eq,
            (None, None) => return Ok(true),
        };

        let query = if self.existentials.is_empty() {
            query
        } else {
            simplify_exists_expr(&self.existentials, query)
        };

        if let Some(value) = query.as_constant_bool() {
            return Ok(value);
        }

        solver.set_timeout(timeout);
        let assumptions = path_condition_assumptions(state.path_condition);
        let result = if query.is_exists() {
            solver.direct_compute_validity(&assumptions, &query)?
        } else {
            solver.evaluate(&assumptions, &query)?
        };
        solver.set_timeout(Duration::ZERO);

        let (validity, success) = result;
        if !success || validity != Validity::True {
            return Ok(false);
        }

        let core = solver.unsat_core();
        let marker_map = make_marker_map(state.path_condition);
        for atom in &core {
            if let Some(marker) = marker_map.get(atom) {
                marker.may_include_in_interpolant();
            }
        }
        commit_markers(&marker_map, dependency, allocations);
        let _ = dependency.compute_interpolant_allocations(allocations);
        Ok(true)
    }

    /// Builds the conjunction of `Eq(shadowLhs, stateRhs)` atoms for every
    /// singleton-store key, and an OR-over-cross-product atom for every
    /// composite-store key, per SPEC_FULL.md §4.3.1. Returns `None` if the
    /// state is missing a value for any key (fail fast, no solver call).
    fn build_state_equalities(&self, state: &StateView<'_>) -> Option<Option<Expr>> {
        let mut atoms = Vec::new();

        for (key, shadow_value) in &self.singleton_store {
            let Some(state_value) = state.values.get(key) else {
                return None;
            };
            atoms.push(Expr::eq(shadow_value.clone(), state_value.clone()));
        }

        for (key, shadow_candidates) in &self.composite_store {
            let Some(state_candidates) = state.composite_values.get(key) else {
                return None;
            };
            if state_candidates.is_empty() {
                return None;
            }
            let mut pair_terms = shadow_candidates
                .iter()
                .cartesian_product(state_candidates.iter())
                .map(|(shadow, actual)| Expr::eq(shadow.clone(), actual.clone()));
            let Some(first) = pair_terms.next() else {
                return None;
            };
            let disjunction = pair_terms.fold(first, Expr::or);
            atoms.push(disjunction);
        }

        let mut iter = atoms.into_iter();
        let Some(first) = iter.next() else {
            return Some(None);
        };
        Some(Some(iter.fold(first, Expr::and)))
    }
}

fn path_condition_assumptions(head: &PathCondition) -> Vec<Expr> {
    let mut assumptions = Vec::new();
    let mut cursor = head.clone();
    while let Some(atom) = cursor {
        assumptions.push(atom.constraint.clone());
        cursor = atom.tail.clone();
    }
    assumptions
}

/// The execution state presented to a subsumption check: its program point,
/// its own path-condition chain, and the current values bound to the
/// program-values a tabled entry's stores may reference.
pub struct StateView<'a> {
    pub node_id: NodeId,
    pub path_condition: &'a PathCondition,
    pub values: &'a IndexMap<ValueId, Expr>,
    pub composite_values: &'a IndexMap<ValueId, Vec<Expr>>,
}
