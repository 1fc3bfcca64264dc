//! `SearchTree`: an optional, purely diagnostic mirror of the `ITree`'s
//! shape, kept only so a caller can render the exploration tree for
//! inspection (SPEC_FULL.md §4.6). Disabling the observer must never change
//! any subsumption outcome (invariant 5) — nothing in this module is ever
//! read back by [`crate::itree::ITree`] or [`crate::subsumption`].
//!
//! The renderer hand-builds its `digraph` text rather than going through
//! `petgraph::dot::Dot`, the same way this codebase's own query-graph
//! emitter falls back to hand-formatted dot source once it needs record
//! shapes and ports `Dot`'s attr-getters can't express (see
//! `query_graph::output::to_dot_federated` and DESIGN.md).

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::expr::Expr;
use crate::itree::NodeId;

/// Which child edge a `SearchTree` node was reached by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    False,
    True,
}

#[derive(Debug, Clone)]
pub struct SearchTreeNode {
    pub node_id: NodeId,
    pub constraints: Vec<(Expr, bool)>,
    pub subsumed: bool,
}

/// A solid branch edge labeled by which side of the split it is, or a dashed
/// edge recording that the source node was found subsumed by the target
/// entry's origin (SPEC_FULL.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTreeEdge {
    Branch(Branch),
    Subsumption,
}

/// A `petgraph::graph::DiGraph`-backed record of the tree's shape, matching
/// this codebase's convention of representing directed, queryable structures
/// (see DESIGN.md). Node insertion order doubles as the `orderId` the
/// rendered label names, since nodes are only ever appended, never removed.
#[derive(Debug)]
pub struct SearchTree {
    graph: DiGraph<SearchTreeNode, SearchTreeEdge>,
    root: NodeIndex,
}

impl SearchTree {
    pub fn new(root_node_id: NodeId) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(SearchTreeNode {
            node_id: root_node_id,
            constraints: Vec::new(),
            subsumed: false,
        });
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Adds a child of `parent` reached via `branch`, recording `node_id` as
    /// the new node's program point.
    pub fn add_child(&mut self, parent: NodeIndex, node_id: NodeId, branch: Branch) -> NodeIndex {
        let child = self.graph.add_node(SearchTreeNode {
            node_id,
            constraints: Vec::new(),
            subsumed: false,
        });
        self.graph.add_edge(parent, child, SearchTreeEdge::Branch(branch));
        child
    }

    /// Appends a constraint to `handle`'s recorded list, flagged with whether
    /// it was ultimately folded into the node's interpolant.
    pub fn record_constraint(&mut self, handle: NodeIndex, constraint: &Expr, in_interpolant: bool) {
        if let Some(node) = self.graph.node_weight_mut(handle) {
            node.constraints.push((constraint.clone(), in_interpolant));
        }
    }

    /// Flags an already-recorded constraint as included in the interpolant,
    /// in place, rather than appending a second line for it. Used when
    /// `markPathCondition` later marks an atom that `record_constraint`
    /// already recorded when it was first added to the path condition.
    pub fn mark_constraint_in_interpolant(&mut self, handle: NodeIndex, constraint: &Expr) {
        if let Some(node) = self.graph.node_weight_mut(handle) {
            if let Some(entry) = node.constraints.iter_mut().find(|(c, _)| c == constraint) {
                entry.1 = true;
            }
        }
    }

    pub fn mark_subsumed(&mut self, handle: NodeIndex) {
        if let Some(node) = self.graph.node_weight_mut(handle) {
            node.subsumed = true;
        }
    }

    /// Records that `from` was found subsumed by the entry originally tabled
    /// from `to`'s observer node, rendered as a dashed edge (testable
    /// property 5).
    pub fn add_subsumption_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.graph.add_edge(from, to, SearchTreeEdge::Subsumption);
    }

    pub fn node(&self, handle: NodeIndex) -> Option<&SearchTreeNode> {
        self.graph.node_weight(handle)
    }

    pub fn children(&self, handle: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(handle, Direction::Outgoing)
            .filter(|edge| matches!(edge.weight(), SearchTreeEdge::Branch(_)))
            .map(|edge| edge.target())
            .collect()
    }

    fn branch_child(&self, handle: NodeIndex, branch: Branch) -> Option<NodeIndex> {
        self.graph
            .edges_directed(handle, Direction::Outgoing)
            .find(|edge| edge.weight() == &SearchTreeEdge::Branch(branch))
            .map(|edge| edge.target())
    }

    /// Renders the record-shaped label for one node:
    /// `"<orderId>: <programPoint>\l<each path-condition line> [(I)]\l[(subsumed)\l][|{<s0>F|<s1>T}]"`
    /// (SPEC_FULL.md §6).
    fn node_label(&self, handle: NodeIndex, node: &SearchTreeNode) -> String {
        let mut label = format!("{}: {}\\l", handle.index(), node.node_id);
        for (constraint, in_interpolant) in &node.constraints {
            label.push_str(&escape_label(&constraint.to_string()));
            if *in_interpolant {
                label.push_str(" (I)");
            }
            label.push_str("\\l");
        }
        if node.subsumed {
            label.push_str("(subsumed)\\l");
        }
        let has_false = self.branch_child(handle, Branch::False).is_some();
        let has_true = self.branch_child(handle, Branch::True).is_some();
        if has_false || has_true {
            label.push_str("|{<s0>F|<s1>T}");
        }
        label
    }

    /// Emits a single root `digraph` with one record-shaped node per
    /// search-tree node, solid edges from the `F`/`T` ports to children, and
    /// dashed edges for subsumption relations (SPEC_FULL.md §4.6, §6).
    pub fn render(&self) -> String {
        let mut out = String::from("digraph searchtree {\n  node [shape=record];\n");
        for handle in self.graph.node_indices() {
            let node = &self.graph[handle];
            out.push_str(&format!(
                "  {} [label=\"{}\"]\n",
                handle.index(),
                self.node_label(handle, node)
            ));
        }
        for edge in self.graph.edge_references() {
            match edge.weight() {
                SearchTreeEdge::Branch(Branch::False) => out.push_str(&format!(
                    "  {}:s0 -> {} [style=solid]\n",
                    edge.source().index(),
                    edge.target().index()
                )),
                SearchTreeEdge::Branch(Branch::True) => out.push_str(&format!(
                    "  {}:s1 -> {} [style=solid]\n",
                    edge.source().index(),
                    edge.target().index()
                )),
                SearchTreeEdge::Subsumption => out.push_str(&format!(
                    "  {} -> {} [style=dashed]\n",
                    edge.source().index(),
                    edge.target().index()
                )),
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape_label(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
