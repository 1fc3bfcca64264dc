//! The abstract dependency graph: value-flow / points-to tracking that
//! determines which symbolic values a proof of infeasibility depends on
//! (SPEC_FULL.md §4.7). A full alias/points-to analysis is explicitly out of
//! scope (Non-goals); this module ships a concrete, directed-graph-backed
//! implementation of the contract the core consumes, so the rest of the crate
//! is exercised end-to-end without requiring a caller-supplied points-to
//! engine.
//!
//! The underlying graph uses `petgraph::graph::DiGraph`, matching how this
//! codebase represents other directed, queryable graphs elsewhere (see
//! DESIGN.md).

use derive_more::Display;
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::expr::Expr;

/// Identifies a program-value (an SSA-like "instruction result" slot) that a
/// symbolic expression can flow through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct ValueId(pub u64);

/// A (program-value, expression) pair: the symbolic value flowing through a
/// given instruction at a given point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: ValueId,
    pub expr: Expr,
}

impl VersionedValue {
    pub fn new(value: ValueId, expr: Expr) -> Self {
        Self { value, expr }
    }
}

/// Records which memory allocations' values flowed into a proof, so future
/// queries can limit attention to them.
#[derive(Debug, Default)]
pub struct AllocationGraph {
    graph: DiGraph<ValueId, ()>,
    index_of: IndexMap<ValueId, NodeIndex>,
}

impl AllocationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_for(&mut self, value: ValueId) -> NodeIndex {
        *self
            .index_of
            .entry(value)
            .or_insert_with(|| self.graph.add_node(value))
    }

    /// Marks `value`, and (transitively, via `flow`) everything that flows
    /// into it, as reachable in this allocation graph.
    pub fn mark_reachable(&mut self, value: ValueId, flow: &DiGraph<ValueId, ()>, index_of: &IndexMap<ValueId, NodeIndex>) {
        let Some(&start) = index_of.get(&value) else {
            self.node_for(value);
            return;
        };
        let mut stack = vec![start];
        let mut visited = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let current_value = flow[current];
            self.node_for(current_value);
            for predecessor in flow.neighbors_directed(current, petgraph::Direction::Incoming) {
                stack.push(predecessor);
            }
        }
    }

    pub fn allocations(&self) -> Vec<ValueId> {
        self.index_of.keys().copied().collect()
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.index_of.contains_key(&value)
    }
}

/// The value-flow / points-to state that tracks which symbolic values
/// participate in which instructions. Each `ITreeNode` exclusively owns one
/// instance; children derive a fresh instance from their parent's via
/// [`Dependency::child`] (SPEC_FULL.md §5).
#[derive(Debug, Default, Clone)]
pub struct Dependency {
    flow: DiGraph<ValueId, ()>,
    index_of: IndexMap<ValueId, NodeIndex>,
    /// The current value bound to each program-value.
    latest: IndexMap<ValueId, Expr>,
    /// Candidate values for a program-value that could hold one of several
    /// values along merged paths. Populated only when a caller explicitly
    /// records a merge via [`Dependency::add_composite_candidate`]; nothing in
    /// this crate's own `ITree::split` produces merges automatically, since
    /// splitting creates two independent children rather than rejoining them.
    composite: IndexMap<ValueId, Vec<Expr>>,
}

impl Dependency {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh `Dependency` for a child node, inheriting the parent's
    /// value-flow graph and latest bindings (siblings do not share instances).
    pub fn child(&self) -> Self {
        self.clone()
    }

    fn node_for(&mut self, value: ValueId) -> NodeIndex {
        *self
            .index_of
            .entry(value)
            .or_insert_with(|| self.flow.add_node(value))
    }

    pub fn get_latest_value(&self, value: ValueId) -> Option<&Expr> {
        self.latest.get(&value)
    }

    /// Records that `value` now holds `expr`, with no recorded dependency on
    /// any other program-value (`execute` in the original source).
    pub fn execute(&mut self, value: ValueId, expr: Expr) {
        self.node_for(value);
        self.latest.insert(value, expr);
    }

    /// Records that `result` was computed from `lhs` and `rhs`, creating flow
    /// edges from both operands.
    pub fn execute_binary(&mut self, result: ValueId, result_expr: Expr, lhs: ValueId, rhs: ValueId) {
        let result_node = self.node_for(result);
        let lhs_node = self.node_for(lhs);
        let rhs_node = self.node_for(rhs);
        self.flow.add_edge(lhs_node, result_node, ());
        self.flow.add_edge(rhs_node, result_node, ());
        self.latest.insert(result, result_expr);
    }

    /// Records that `value`, read or written through `address`, flows from the
    /// memory cell `address` names.
    pub fn execute_memory_operation(&mut self, value: ValueId, value_expr: Expr, address: ValueId) {
        let value_node = self.node_for(value);
        let address_node = self.node_for(address);
        self.flow.add_edge(address_node, value_node, ());
        self.latest.insert(value, value_expr);
    }

    /// Binds each call argument's value-flow to the corresponding callee
    /// parameter.
    pub fn bind_call_arguments(&mut self, params: &[ValueId], args: &[ValueId]) {
        for (&param, &arg) in params.iter().zip(args) {
            let param_node = self.node_for(param);
            let arg_node = self.node_for(arg);
            self.flow.add_edge(arg_node, param_node, ());
        }
    }

    /// Binds a callee's return value-flow back into the caller's result slot.
    pub fn bind_return_value(&mut self, callee_result: ValueId, caller_result: ValueId) {
        let callee_node = self.node_for(callee_result);
        let caller_node = self.node_for(caller_result);
        self.flow.add_edge(callee_node, caller_node, ());
    }

    /// Declares an additional candidate value `value` could hold along some
    /// merged path, populating the composite store path.
    pub fn add_composite_candidate(&mut self, value: ValueId, expr: Expr) {
        self.node_for(value);
        self.composite.entry(value).or_default().push(expr);
    }

    /// Marks every value that flows into `value` as reachable in `graph`
    /// (`markAllValues` in the original source).
    pub fn mark_all_values(&self, graph: &mut AllocationGraph, value: ValueId) {
        graph.mark_reachable(value, &self.flow, &self.index_of);
    }

    /// The singleton store: current value for every tracked program-value,
    /// unrenamed.
    pub fn singleton_values(&self) -> &IndexMap<ValueId, Expr> {
        &self.latest
    }

    /// The composite store: candidate values for every program-value that has
    /// recorded more than one, unrenamed.
    pub fn composite_values(&self) -> &IndexMap<ValueId, Vec<Expr>> {
        &self.composite
    }

    /// The singleton store with every array occurrence alpha-renamed to its
    /// shadow counterpart, sharing `replacements` with the interpolant so the
    /// same array maps to the same shadow name (SPEC_FULL.md §4.3 step 2).
    pub fn shadowed_singleton_values(
        &self,
        replacements: &mut IndexMap<crate::expr::Array, crate::expr::Array>,
    ) -> IndexMap<ValueId, Expr> {
        self.latest
            .iter()
            .map(|(value, expr)| (*value, crate::expr::rename_arrays_to_shadow(expr, replacements)))
            .collect()
    }

    /// The composite store, alpha-renamed the same way.
    pub fn shadowed_composite_values(
        &self,
        replacements: &mut IndexMap<crate::expr::Array, crate::expr::Array>,
    ) -> IndexMap<ValueId, Vec<Expr>> {
        self.composite
            .iter()
            .map(|(value, candidates)| {
                (
                    *value,
                    candidates
                        .iter()
                        .map(|expr| crate::expr::rename_arrays_to_shadow(expr, replacements))
                        .collect(),
                )
            })
            .collect()
    }

    /// Returns the allocations recorded in `graph` that this dependency
    /// instance actually tracks (`computeInterpolantAllocations`).
    pub fn compute_interpolant_allocations(&self, graph: &AllocationGraph) -> Vec<ValueId> {
        graph
            .allocations()
            .into_iter()
            .filter(|value| self.index_of.contains_key(value))
            .collect()
    }
}
