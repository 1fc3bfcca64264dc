//! The path-condition chain attached to each `ITreeNode`, and the two-phase
//! marker protocol used while checking subsumption (SPEC_FULL.md §3, §4.1,
//! §4.2).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dependency::{AllocationGraph, Dependency, VersionedValue};
use crate::expr::{rename_arrays_to_shadow, Array, Expr, ExprKind};

/// One atom of a path condition: a single branch constraint, plus the
/// bookkeeping needed to later fold it into a shadowed interpolant.
///
/// The chain is a singly-linked list shared with ancestors: an `ITreeNode`'s
/// head points at the deepest atom it owns, and `tail` points into the
/// parent's chain. In the original source this sharing requires a careful
/// "destroy up to but not past the parent's head" discipline; here it falls
/// out for free from `Rc`'s reference counting (SPEC_FULL.md §3).
pub struct PathConditionAtom {
    pub constraint: Expr,
    shadow_constraint: RefCell<Option<Expr>>,
    pub condition: VersionedValue,
    pub in_interpolant: Cell<bool>,
    pub tail: Option<Rc<PathConditionAtom>>,
}

/// The head of a path-condition chain; `None` denotes the empty chain.
pub type PathCondition = Option<Rc<PathConditionAtom>>;

impl PathConditionAtom {
    pub fn new(constraint: Expr, condition: VersionedValue, tail: PathCondition) -> Rc<Self> {
        Rc::new(Self {
            constraint,
            shadow_constraint: RefCell::new(None),
            condition,
            in_interpolant: Cell::new(false),
            tail,
        })
    }

    pub fn car(&self) -> &Expr {
        &self.constraint
    }

    pub fn cdr(&self) -> Option<&Rc<PathConditionAtom>> {
        self.tail.as_ref()
    }

    /// Builds (and memoizes) this atom's alpha-renamed constraint, extending
    /// `replacements` with any newly introduced shadow arrays so repeated
    /// arrays across atoms in one chain share a shadow name.
    fn shadow_constraint(&self, replacements: &mut IndexMap<Array, Array>) -> Expr {
        if let Some(existing) = self.shadow_constraint.borrow().as_ref() {
            return existing.clone();
        }
        let shadow = rename_arrays_to_shadow(&self.constraint, replacements);
        *self.shadow_constraint.borrow_mut() = Some(shadow.clone());
        shadow
    }

    /// Marks this atom as part of the interpolant and marks every value that
    /// flows into the branch predicate it was read from as reachable in `g`.
    pub fn include_in_interpolant(&self, dependency: &Dependency, g: &mut AllocationGraph) {
        self.in_interpolant.set(true);
        dependency.mark_all_values(g, self.condition.value);
    }
}

/// Walks the chain from `head` outward (i.e. in head-to-tail, meaning
/// most-recent-branch-first, order) and AND-combines the shadowed constraint
/// of every atom flagged `in_interpolant`, in that same order (testable
/// property 3). Returns `None` if no atom is marked.
pub fn pack_interpolant(head: &PathCondition, replacements: &mut IndexMap<Array, Array>) -> Option<Expr> {
    let mut atoms = Vec::new();
    let mut cursor = head.clone();
    while let Some(atom) = cursor {
        atoms.push(atom.clone());
        cursor = atom.tail.clone();
    }

    let mut result: Option<Expr> = None;
    for atom in &atoms {
        if !atom.in_interpolant.get() {
            continue;
        }
        let shadow = atom.shadow_constraint(replacements);
        result = Some(match result {
            None => shadow,
            Some(acc) => Expr::and(acc, shadow),
        });
    }
    result
}

/// A lightweight two-phase accept: `may_include_in_interpolant` raises a
/// tentative flag; `commit` only takes effect if the flag was raised. Used
/// while checking subsumption, where the solver's unsat core identifies which
/// atoms *could* justify subsumption, and commits only happen once the whole
/// proof is accepted (SPEC_FULL.md §4.2).
pub struct PathConditionMarker {
    atom: Rc<PathConditionAtom>,
    may_include: Cell<bool>,
}

impl PathConditionMarker {
    fn new(atom: Rc<PathConditionAtom>) -> Rc<Self> {
        Rc::new(Self {
            atom,
            may_include: Cell::new(false),
        })
    }

    pub fn may_include_in_interpolant(&self) {
        self.may_include.set(true);
    }

    pub fn commit(&self, dependency: &Dependency, g: &mut AllocationGraph) {
        if self.may_include.get() {
            self.atom.include_in_interpolant(dependency, g);
        }
    }
}

/// A map from every atom's constraint (and, for a top-level `Or`, each of its
/// disjuncts as well) to a marker shared with the owning atom (SPEC_FULL.md
/// §4.4 `makeMarkerMap`, scenario S5).
pub type MarkerMap = IndexMap<Expr, Rc<PathConditionMarker>>;

pub fn make_marker_map(head: &PathCondition) -> MarkerMap {
    let mut map = MarkerMap::new();
    let mut cursor = head.clone();
    while let Some(atom) = cursor {
        let marker = PathConditionMarker::new(atom.clone());
        map.insert(atom.constraint.clone(), marker.clone());
        if let ExprKind::Or = atom.constraint.kind() {
            map.insert(atom.constraint.kid(0).clone(), marker.clone());
            map.insert(atom.constraint.kid(1).clone(), marker.clone());
        }
        cursor = atom.tail.clone();
    }
    map
}

/// Commits every marker in `map` whose tentative flag was raised. Markers that
/// share the same underlying atom (an `Or` atom and its two disjuncts) are
/// deduplicated by pointer identity so a shared atom is only included once.
pub fn commit_markers(map: &MarkerMap, dependency: &Dependency, g: &mut AllocationGraph) {
    let mut committed = std::collections::HashSet::new();
    for marker in map.values() {
        let ptr = Rc::as_ptr(marker) as usize;
        if !committed.insert(ptr) {
            continue;
        }
        marker.commit(dependency, g);
    }
}
