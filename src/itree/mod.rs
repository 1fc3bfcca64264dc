//! `ITreeNode` and `ITree`: the binary tree of exploration nodes that owns the
//! path condition and dependency instances, and drives split/remove/traversal
//! (SPEC_FULL.md §4.4, §4.5).
//!
//! Nodes live in a flat arena (`IndexMap<NodeHandle, ITreeNodeData>`) rather
//! than behind raw parent/left/right pointers, matching the arena-of-handles
//! design note in SPEC_FULL.md §9: a `NodeHandle` is a stable key into the
//! arena, so removing one node never invalidates another node's handle.

use std::time::Duration;

use derive_more::Display;
use indexmap::IndexMap;

use crate::config::EngineConfig;
use crate::dependency::{AllocationGraph, Dependency, ValueId, VersionedValue};
use crate::error::EngineError;
use crate::expr::{Array, Expr};
use crate::path_condition::{PathCondition, PathConditionAtom};
use crate::search_tree::{Branch, SearchTree};
use crate::solver::Solver;
use crate::subsumption::{StateView, SubsumptionTableEntry};

/// The identity of a program point. Distinct ITreeNodes created along
/// different paths may share a `NodeId` when they represent the same program
/// location; subsumption is only ever checked between entries and states that
/// share one (SPEC_FULL.md invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct NodeId(pub u64);

/// A stable arena handle for an `ITreeNode`. Not to be confused with
/// [`NodeId`]: many nodes (at different handles) can carry the same `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub struct NodeHandle(u64);

struct ITreeNodeData {
    node_id: NodeId,
    parent: Option<NodeHandle>,
    left: Option<NodeHandle>,
    right: Option<NodeHandle>,
    path_condition: PathCondition,
    dependency: Dependency,
    is_subsumed: bool,
    observer_handle: Option<petgraph::graph::NodeIndex>,
}

pub struct ITree {
    nodes: IndexMap<NodeHandle, ITreeNodeData>,
    next_handle: u64,
    root: NodeHandle,
    subsumption_table: Vec<SubsumptionTableEntry>,
    config: EngineConfig,
    observer: Option<SearchTree>,
}

impl ITree {
    pub fn new(config: EngineConfig, root_node_id: NodeId) -> Self {
        let mut nodes = IndexMap::new();
        let root = NodeHandle(0);
        let observer = config.observer_enabled.then(|| SearchTree::new(root_node_id));
        let observer_handle = observer.as_ref().map(|tree| tree.root());
        nodes.insert(
            root,
            ITreeNodeData {
                node_id: root_node_id,
                parent: None,
                left: None,
                right: None,
                path_condition: None,
                dependency: Dependency::new(),
                is_subsumed: false,
                observer_handle,
            },
        );
        Self {
            nodes,
            next_handle: 1,
            root,
            subsumption_table: Vec::new(),
            config,
            observer,
        }
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn observer(&self) -> Option<&SearchTree> {
        self.observer.as_ref()
    }

    fn fresh_handle(&mut self) -> NodeHandle {
        let handle = NodeHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn node(&self, handle: NodeHandle) -> &ITreeNodeData {
        self.nodes.get(&handle).expect("invalid NodeHandle")
    }

    fn node_mut(&mut self, handle: NodeHandle) -> &mut ITreeNodeData {
        self.nodes.get_mut(&handle).expect("invalid NodeHandle")
    }

    pub fn node_id(&self, handle: NodeHandle) -> NodeId {
        self.node(handle).node_id
    }

    pub fn is_subsumed(&self, handle: NodeHandle) -> bool {
        self.node(handle).is_subsumed
    }

    /// Records that the interpreter has entered `handle` at program point
    /// `node_id` (`setCurrentINode` in the original source).
    pub fn set_current_inode(&mut self, handle: NodeHandle, node_id: NodeId) {
        self.node_mut(handle).node_id = node_id;
    }

    /// Prepends a new path-condition atom onto `handle`'s chain
    /// (`addConstraint`).
    pub fn add_constraint(&mut self, handle: NodeHandle, constraint: Expr, condition: VersionedValue) {
        let node = self.node_mut(handle);
        let atom = PathConditionAtom::new(constraint.clone(), condition, node.path_condition.clone());
        node.path_condition = Some(atom);
        if let (Some(observer), Some(observer_handle)) = (self.observer.as_mut(), node.observer_handle) {
            observer.record_constraint(observer_handle, &constraint, false);
        }
    }

    /// Creates two new children of `handle`, inheriting its path-condition
    /// head and a fresh `Dependency` extending its own (SPEC_FULL.md §4.4).
    pub fn split(&mut self, handle: NodeHandle) -> Result<(NodeHandle, NodeHandle), EngineError> {
        {
            let node = self.node(handle);
            if node.left.is_some() || node.right.is_some() {
                return Err(EngineError::AlreadySplit(node.node_id));
            }
        }

        let left_handle = self.fresh_handle();
        let right_handle = self.fresh_handle();

        let (node_id, path_condition, dependency, observer_handle) = {
            let node = self.node(handle);
            (
                node.node_id,
                node.path_condition.clone(),
                node.dependency.child(),
                node.observer_handle,
            )
        };

        let left_observer = observer_handle.zip(self.observer.as_mut()).map(|(parent, observer)| {
            observer.add_child(parent, node_id, Branch::False)
        });
        let right_observer = observer_handle.zip(self.observer.as_mut()).map(|(parent, observer)| {
            observer.add_child(parent, node_id, Branch::True)
        });

        self.nodes.insert(
            left_handle,
            ITreeNodeData {
                node_id,
                parent: Some(handle),
                left: None,
                right: None,
                path_condition: path_condition.clone(),
                dependency: dependency.clone(),
                is_subsumed: false,
                observer_handle: left_observer,
            },
        );
        self.nodes.insert(
            right_handle,
            ITreeNodeData {
                node_id,
                parent: Some(handle),
                left: None,
                right: None,
                path_condition,
                dependency,
                is_subsumed: false,
                observer_handle: right_observer,
            },
        );

        let node = self.node_mut(handle);
        node.left = Some(left_handle);
        node.right = Some(right_handle);

        Ok((left_handle, right_handle))
    }

    /// `getLatestCoreExpressions` (SPEC_FULL.md §4.4): the alpha-renamed
    /// singleton store for `handle`, read from its **parent's** dependency —
    /// the program-point index names the first statement of a basic block,
    /// and the state at that instant is the parent's, not this node's own
    /// (which may already reflect instructions executed since entering the
    /// block). The root has no parent and falls back to its own dependency.
    pub fn get_latest_core_expressions(
        &self,
        handle: NodeHandle,
        replacements: &mut IndexMap<Array, Array>,
    ) -> IndexMap<ValueId, Expr> {
        self.core_dependency(handle).shadowed_singleton_values(replacements)
    }

    /// `getCompositeCoreExpressions` (SPEC_FULL.md §4.4): likewise for the
    /// composite store.
    pub fn get_composite_core_expressions(
        &self,
        handle: NodeHandle,
        replacements: &mut IndexMap<Array, Array>,
    ) -> IndexMap<ValueId, Vec<Expr>> {
        self.core_dependency(handle).shadowed_composite_values(replacements)
    }

    /// The dependency instance the two core-expression extractors above read
    /// from: `handle`'s parent, or `handle`'s own dependency at the root.
    fn core_dependency(&self, handle: NodeHandle) -> &Dependency {
        let node = self.node(handle);
        match node.parent {
            Some(parent) => &self.node(parent).dependency,
            None => &node.dependency,
        }
    }

    /// Walks up from `handle` while the current node is a leaf, tabling a
    /// `SubsumptionTableEntry` for each non-subsumed node it removes
    /// (SPEC_FULL.md §4.5).
    pub fn remove(&mut self, handle: NodeHandle) -> Result<(), EngineError> {
        let mut current = handle;
        loop {
            let node_id = self.node(current).node_id;
            {
                let node = self.node(current);
                if node.left.is_some() || node.right.is_some() {
                    return Err(EngineError::NodeHasChildren(node_id));
                }
            }

            // Gather everything `SubsumptionTableEntry::capture` needs while
            // `current` is still in the arena: `get_latest_core_expressions`/
            // `get_composite_core_expressions` above need to look up its parent.
            let captured = if self.node(current).is_subsumed {
                None
            } else {
                let path_condition = self.node(current).path_condition.clone();
                let observer_handle = self.node(current).observer_handle;
                let mut replacements: IndexMap<Array, Array> = IndexMap::new();
                let interpolant =
                    crate::path_condition::pack_interpolant(&path_condition, &mut replacements);
                let singleton_store = self.get_latest_core_expressions(current, &mut replacements);
                let composite_store = self.get_composite_core_expressions(current, &mut replacements);
                let existentials = replacements.into_values().collect();
                Some(SubsumptionTableEntry::capture(
                    node_id,
                    interpolant,
                    singleton_store,
                    composite_store,
                    existentials,
                    observer_handle,
                ))
            };

            let node = self.nodes.shift_remove(&current).expect("invalid NodeHandle");
            if let Some(entry) = captured {
                self.subsumption_table.push(entry);
            }

            let Some(parent_handle) = node.parent else {
                break; // removed the root; tree is now empty
            };

            let parent = self.node_mut(parent_handle);
            if parent.left == Some(current) {
                parent.left = None;
            } else if parent.right == Some(current) {
                parent.right = None;
            }

            if parent.left.is_some() || parent.right.is_some() {
                break; // sibling still present: parent is not (yet) a leaf
            }
            current = parent_handle;
        }
        Ok(())
    }

    /// Iterates the subsumption table in insertion order, stopping at the
    /// first entry that subsumes `state` (SPEC_FULL.md §4.5, §5).
    #[allow(clippy::too_many_arguments)]
    pub fn check_current_state_subsumption(
        &mut self,
        handle: NodeHandle,
        solver: &mut dyn Solver,
        values: &IndexMap<ValueId, Expr>,
        composite_values: &IndexMap<ValueId, Vec<Expr>>,
        allocations: &mut AllocationGraph,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        let node_id = self.node(handle).node_id;
        let path_condition = self.node(handle).path_condition.clone();
        let dependency = self.node(handle).dependency.clone();

        let state = StateView {
            node_id,
            path_condition: &path_condition,
            values,
            composite_values,
        };

        for entry in &self.subsumption_table {
            if entry.subsumed(solver, &state, &dependency, allocations, timeout)? {
                let node = self.node_mut(handle);
                node.is_subsumed = true;
                let observer_handle = node.observer_handle;
                if let (Some(observer), Some(observer_handle)) = (self.observer.as_mut(), observer_handle) {
                    observer.mark_subsumed(observer_handle);
                    if let Some(origin) = entry.observer_handle {
                        observer.add_subsumption_edge(observer_handle, origin);
                    }
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// If `handle`'s terminating instruction was a conditional branch, marks
    /// its condition in the dependency; then walks the unsat core in reverse
    /// against `handle`'s path condition from the head down, marking every
    /// atom whose constraint matches the current core element (SPEC_FULL.md
    /// §4.5).
    pub fn mark_path_condition(
        &mut self,
        handle: NodeHandle,
        unsat_core: &[Expr],
        branch_condition: Option<ValueId>,
    ) {
        let (path_condition, dependency, observer_handle) = {
            let node = self.node(handle);
            (node.path_condition.clone(), node.dependency.clone(), node.observer_handle)
        };
        let mut allocations = AllocationGraph::new();

        if let Some(condition) = branch_condition {
            dependency.mark_all_values(&mut allocations, condition);
        }

        let mut core_iter = unsat_core.iter().rev().peekable();
        let mut cursor = path_condition;
        while let Some(&target) = core_iter.peek() {
            let Some(atom) = cursor.clone() else {
                break; // path condition exhausted before the core
            };
            if &atom.constraint == target {
                atom.include_in_interpolant(&dependency, &mut allocations);
                if let (Some(observer), Some(observer_handle)) = (self.observer.as_mut(), observer_handle) {
                    observer.mark_constraint_in_interpolant(observer_handle, &atom.constraint);
                }
                core_iter.next();
            }
            cursor = atom.tail.clone();
        }

        let _ = dependency.compute_interpolant_allocations(&allocations);
    }

    /// Delegates to the path condition's `packInterpolant`
    /// (`getInterpolant`).
    pub fn get_interpolant(&self, handle: NodeHandle) -> (Option<Expr>, Vec<crate::expr::Array>) {
        let node = self.node(handle);
        let mut replacements = IndexMap::new();
        let interpolant = crate::path_condition::pack_interpolant(&node.path_condition, &mut replacements);
        (interpolant, replacements.into_values().collect())
    }

    pub fn dependency(&self, handle: NodeHandle) -> &Dependency {
        &self.node(handle).dependency
    }

    pub fn dependency_mut(&mut self, handle: NodeHandle) -> &mut Dependency {
        &mut self.node_mut(handle).dependency
    }

    pub fn path_condition(&self, handle: NodeHandle) -> &PathCondition {
        &self.node(handle).path_condition
    }

    pub fn subsumption_table(&self) -> &[SubsumptionTableEntry] {
        &self.subsumption_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::VersionedValue;
    use crate::expr::Array;
    use crate::solver::NaiveSolver;

    fn config() -> EngineConfig {
        EngineConfig::new()
    }

    #[test]
    fn split_requires_no_existing_children() {
        let mut tree = ITree::new(config(), NodeId(0));
        let root = tree.root();
        tree.split(root).unwrap();
        assert!(matches!(tree.split(root), Err(EngineError::AlreadySplit(_))));
    }

    #[test]
    fn remove_requires_both_children_null() {
        let mut tree = ITree::new(config(), NodeId(0));
        let root = tree.root();
        let (left, _right) = tree.split(root).unwrap();
        assert!(matches!(tree.remove(root), Err(EngineError::NodeHasChildren(_))));
        tree.remove(left).unwrap();
    }

    #[test]
    fn remove_walks_up_and_tables_entries_for_both_leaves() {
        let mut tree = ITree::new(config(), NodeId(0));
        let root = tree.root();
        let (left, right) = tree.split(root).unwrap();
        tree.remove(left).unwrap();
        assert_eq!(tree.subsumption_table().len(), 1);
        tree.remove(right).unwrap();
        // Removing the second leaf walks up through the (now childless) root.
        assert_eq!(tree.subsumption_table().len(), 2);
    }

    #[test]
    fn s1_single_node_empty_path_condition_is_subsumed() {
        // A node with an empty path condition removed from one tree tables a
        // trivial entry; a second, unrelated node at the same NodeId is then
        // subsumed by it with no solver call needed.
        let mut first = ITree::new(config(), NodeId(42));
        let first_root = first.root();
        first.remove(first_root).unwrap();

        let mut tree = ITree::new(config(), NodeId(42));
        tree.subsumption_table = first.subsumption_table;

        let mut solver = NaiveSolver::new();
        let mut allocations = AllocationGraph::new();
        let values = IndexMap::new();
        let composite_values = IndexMap::new();
        let subsumed = tree
            .check_current_state_subsumption(
                tree.root(),
                &mut solver,
                &values,
                &composite_values,
                &mut allocations,
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(subsumed);
    }

    #[test]
    fn remove_captures_stores_from_parent_dependency_not_own() {
        let mut tree = ITree::new(config(), NodeId(0));
        let root = tree.root();
        tree.dependency_mut(root).execute(ValueId(1), crate::expr::Expr::constant(1, 32));
        let (left, _right) = tree.split(root).unwrap();
        tree.dependency_mut(left).execute(ValueId(2), crate::expr::Expr::constant(2, 32));

        tree.remove(left).unwrap();
        let entry = &tree.subsumption_table()[0];
        assert!(entry.singleton_store.contains_key(&ValueId(1)));
        assert!(!entry.singleton_store.contains_key(&ValueId(2)));
    }

    #[test]
    fn mark_path_condition_flags_matching_atoms() {
        let mut tree = ITree::new(config(), NodeId(0));
        let root = tree.root();
        let x = crate::expr::Expr::read(Array::new("x", 4), crate::expr::Expr::constant(0, 32));
        let constraint = crate::expr::Expr::slt(x, crate::expr::Expr::constant(10, 32));
        tree.add_constraint(root, constraint.clone(), VersionedValue::new(ValueId(1), crate::expr::Expr::true_()));

        tree.mark_path_condition(root, std::slice::from_ref(&constraint), None);

        let atom = tree.path_condition(root).clone().unwrap();
        assert!(atom.in_interpolant.get());
    }

    #[test]
    fn mark_path_condition_marks_the_branch_condition_before_the_core_walk() {
        // A branch condition is supplied alongside the unsat core; the core walk
        // must still flag the matching atom, and supplying the branch condition
        // must not disturb that (SPEC_FULL.md §4.5's "if the terminating
        // instruction is a conditional branch, mark its condition" step runs
        // against the current node's dependency before the reverse core walk).
        let mut tree = ITree::new(config(), NodeId(0));
        let root = tree.root();
        tree.dependency_mut(root).execute(ValueId(9), crate::expr::Expr::true_());
        let x = crate::expr::Expr::read(Array::new("x", 4), crate::expr::Expr::constant(0, 32));
        let constraint = crate::expr::Expr::slt(x, crate::expr::Expr::constant(10, 32));
        tree.add_constraint(root, constraint.clone(), VersionedValue::new(ValueId(1), crate::expr::Expr::true_()));

        tree.mark_path_condition(root, std::slice::from_ref(&constraint), Some(ValueId(9)));

        let atom = tree.path_condition(root).clone().unwrap();
        assert!(atom.in_interpolant.get());
    }
}
