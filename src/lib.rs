//! Interpolation-tree-based subsumption checking for symbolic execution
//! engines: a Craig-interpolant cache that lets a symbolic executor recognize
//! when the current state is already covered by a previously explored (and
//! proven infeasible-to-continue) state, and skip re-exploring it.
//!
//! This crate does not perform symbolic execution itself, nor does it embed
//! an SMT solver. It owns the path-condition bookkeeping, the existential
//! simplification of captured interpolants, and the subsumption-table
//! lifecycle; callers supply their own [`solver::Solver`] and drive
//! [`itree::ITree`] from their own interpreter loop.

pub mod config;
pub mod dependency;
pub mod error;
pub mod expr;
pub mod itree;
pub mod path_condition;
pub mod search_tree;
pub mod solver;
pub mod subsumption;

use std::time::Duration;

use config::EngineConfig;
use dependency::{AllocationGraph, ValueId};
use error::EngineError;
use expr::{Array, Expr};
use indexmap::IndexMap;
use itree::{ITree, NodeHandle, NodeId};
use search_tree::SearchTree;
use solver::Solver;

/// The top-level handle a caller holds: an `ITree` plus the configuration it
/// was built from. Most callers only ever touch this type; the module-level
/// types remain public for callers who want to manage an `ITree` directly or
/// inspect a captured [`subsumption::SubsumptionTableEntry`].
pub struct Engine {
    tree: ITree,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig, root_node_id: NodeId) -> Self {
        let tree = ITree::new(config.clone(), root_node_id);
        Self { tree, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn root(&self) -> NodeHandle {
        self.tree.root()
    }

    pub fn observer(&self) -> Option<&SearchTree> {
        self.tree.observer()
    }

    pub fn set_current_inode(&mut self, handle: NodeHandle, node_id: NodeId) {
        self.tree.set_current_inode(handle, node_id);
    }

    pub fn add_constraint(
        &mut self,
        handle: NodeHandle,
        constraint: Expr,
        condition: dependency::VersionedValue,
    ) {
        if !self.config.interpolation_enabled {
            return;
        }
        self.tree.add_constraint(handle, constraint, condition);
    }

    pub fn split(&mut self, handle: NodeHandle) -> Result<(NodeHandle, NodeHandle), EngineError> {
        self.tree.split(handle)
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Result<(), EngineError> {
        self.tree.remove(handle)
    }

    /// Checks `handle`'s current state against every entry tabled so far,
    /// using the engine's configured default timeout. Always returns `false`
    /// without consulting the solver when interpolation is disabled
    /// (SPEC_FULL.md §4.3, §9 design note on the disabled-subsystem path).
    pub fn check_current_state_subsumption(
        &mut self,
        handle: NodeHandle,
        solver: &mut dyn Solver,
        values: &IndexMap<ValueId, Expr>,
        composite_values: &IndexMap<ValueId, Vec<Expr>>,
    ) -> Result<bool, EngineError> {
        if !self.config.interpolation_enabled {
            return Ok(false);
        }
        let mut allocations = AllocationGraph::new();
        self.tree.check_current_state_subsumption(
            handle,
            solver,
            values,
            composite_values,
            &mut allocations,
            self.config.default_solver_timeout,
        )
    }

    pub fn mark_path_condition(
        &mut self,
        handle: NodeHandle,
        unsat_core: &[Expr],
        branch_condition: Option<ValueId>,
    ) {
        self.tree.mark_path_condition(handle, unsat_core, branch_condition);
    }

    pub fn get_interpolant(&self, handle: NodeHandle) -> (Option<Expr>, Vec<Array>) {
        self.tree.get_interpolant(handle)
    }

    pub fn render_observer(&self) -> Result<String, EngineError> {
        self.tree.observer().map(SearchTree::render).ok_or(EngineError::ObserverDisabled)
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.default_solver_timeout
    }
}
