//! End-to-end scenarios for the interpolation tree, exercised through the
//! public `Engine`/`ITree` surface rather than any module's internals.

use std::time::Duration;

use indexmap::IndexMap;
use itree_engine::config::EngineConfig;
use itree_engine::dependency::{ValueId, VersionedValue};
use itree_engine::error::EngineError;
use itree_engine::expr::{Array, Expr};
use itree_engine::itree::{ITree, NodeId};
use itree_engine::path_condition::make_marker_map;
use itree_engine::solver::{NaiveSolver, Validity};
use itree_engine::subsumption::StateView;
use itree_engine::Engine;

fn values(pairs: &[(ValueId, Expr)]) -> IndexMap<ValueId, Expr> {
    pairs.iter().cloned().collect()
}

/// S1 — a single node with an empty path condition, once removed and tabled,
/// subsumes a later state at the same program point with no solver call.
///
/// Both leaves of a split share their parent's `nodeId` and inherit its empty
/// path condition, so removing one tables an entry that the other's own
/// subsumption check — run through the same tree — must then satisfy.
#[test]
fn s1_trivial_empty_interpolant() {
    let mut engine = Engine::new(EngineConfig::new(), NodeId(7));
    let root = engine.root();
    let (left, right) = engine.split(root).unwrap();
    engine.remove(left).unwrap();

    let mut solver = NaiveSolver::new();
    let no_values = IndexMap::new();
    let no_composite = IndexMap::new();
    let subsumed = engine
        .check_current_state_subsumption(right, &mut solver, &no_values, &no_composite)
        .unwrap();
    assert!(subsumed);
}

/// S2 — a tabled singleton-store key with no matching current-state value
/// fails fast with no solver interaction.
#[test]
fn s2_singleton_store_mismatch_fails_without_solver() {
    use itree_engine::subsumption::SubsumptionTableEntry;

    let x = Expr::read(Array::new("A", 4), Expr::constant(0, 32));
    let entry = SubsumptionTableEntry {
        node_id: NodeId(3),
        interpolant: None,
        singleton_store: values(&[(ValueId(1), Expr::eq(x, Expr::constant(1, 32)))]),
        composite_store: IndexMap::new(),
        existentials: Vec::new(),
        observer_handle: None,
    };

    let mut solver = NaiveSolver::new();
    let dependency = itree_engine::dependency::Dependency::new();
    let mut allocations = itree_engine::dependency::AllocationGraph::new();
    let pc = None;
    let state_values = IndexMap::new(); // no value bound for ValueId(1)
    let composite = IndexMap::new();
    let state = StateView {
        node_id: NodeId(3),
        path_condition: &pc,
        values: &state_values,
        composite_values: &composite,
    };
    let subsumed = entry
        .subsumed(&mut solver, &state, &dependency, &mut allocations, Duration::from_secs(1))
        .unwrap();
    assert!(!subsumed);
}

/// S5 — a disjunctive path-condition atom shares one marker across both of
/// its disjuncts; an unsat core naming only one disjunct still commits the
/// whole `Or` atom into the interpolant, via the shared
/// `PathConditionMarker` rather than `markPathCondition`'s exact-match walk.
#[test]
fn s5_disjunctive_atom_shares_marker_across_disjuncts() {
    use itree_engine::path_condition::commit_markers;

    let p = Expr::slt(Expr::constant(1, 32), Expr::constant(2, 32));
    let q = Expr::slt(Expr::constant(3, 32), Expr::constant(4, 32));
    let or_atom = Expr::or(p.clone(), q);

    let mut tree = ITree::new(EngineConfig::new(), NodeId(0));
    let root = tree.root();
    tree.add_constraint(root, or_atom.clone(), VersionedValue::new(ValueId(1), Expr::true_()));

    // The solver's unsat core names only the left disjunct.
    let core = vec![p];
    let map = make_marker_map(tree.path_condition(root));
    for atom in &core {
        if let Some(marker) = map.get(atom) {
            marker.may_include_in_interpolant();
        }
    }
    let dependency = tree.dependency(root).clone();
    let mut allocations = itree_engine::dependency::AllocationGraph::new();
    commit_markers(&map, &dependency, &mut allocations);

    let (interpolant, _) = tree.get_interpolant(root);
    // Committing through the shared marker must have included the whole Or
    // atom, not just the named disjunct.
    assert_eq!(interpolant, Some(or_atom));
}

/// S6 — a query that remains quantified after simplification dispatches to
/// the direct-quantified-validity path; when the naive solver cannot decide
/// it, the result is "not subsumed", not an error.
#[test]
fn s6_quantified_branch_reports_not_subsumed_on_unknown() {
    use itree_engine::subsumption::SubsumptionTableEntry;

    let shadow_array = Array::new("x", 4).to_shadow(0);
    let shadow_x = Expr::read(shadow_array.clone(), Expr::constant(0, 32));
    let other_shadow = Array::new("z", 4).to_shadow(1);
    let other = Expr::read(other_shadow.clone(), Expr::constant(0, 32));

    let entry = SubsumptionTableEntry {
        node_id: NodeId(9),
        interpolant: Some(Expr::slt(shadow_x, other)),
        singleton_store: IndexMap::new(),
        composite_store: IndexMap::new(),
        existentials: vec![shadow_array, other_shadow],
        observer_handle: None,
    };

    let mut solver = NaiveSolver::new();
    let dependency = itree_engine::dependency::Dependency::new();
    let mut allocations = itree_engine::dependency::AllocationGraph::new();
    let pc = None;
    let state_values = IndexMap::new();
    let composite = IndexMap::new();
    let state = StateView {
        node_id: NodeId(9),
        path_condition: &pc,
        values: &state_values,
        composite_values: &composite,
    };
    let subsumed = entry
        .subsumed(&mut solver, &state, &dependency, &mut allocations, Duration::from_secs(1))
        .unwrap();
    assert!(!subsumed);
}

/// Invariant 1 — `remove` on a node with children is rejected; removing a
/// leaf always succeeds.
#[test]
fn invariant_1_remove_requires_childless_node() {
    let mut tree = ITree::new(EngineConfig::new(), NodeId(0));
    let root = tree.root();
    let (left, right) = tree.split(root).unwrap();
    assert!(matches!(tree.remove(root), Err(EngineError::NodeHasChildren(_))));
    tree.remove(left).unwrap();
    tree.remove(right).unwrap();
}

/// Invariant 3 — `packInterpolant` preserves head-to-tail traversal order.
#[test]
fn invariant_3_pack_interpolant_preserves_order() {
    let mut tree = ITree::new(EngineConfig::new(), NodeId(0));
    let root = tree.root();
    let c1 = Expr::slt(Expr::constant(1, 32), Expr::constant(2, 32));
    let c2 = Expr::slt(Expr::constant(3, 32), Expr::constant(4, 32));
    tree.add_constraint(root, c1.clone(), VersionedValue::new(ValueId(1), Expr::true_()));
    tree.add_constraint(root, c2.clone(), VersionedValue::new(ValueId(2), Expr::true_()));
    tree.mark_path_condition(root, &[c1.clone(), c2.clone()], None);

    let (interpolant, _) = tree.get_interpolant(root);
    // c2 was added last (closer to head) so it is combined first.
    assert_eq!(interpolant, Some(Expr::and(c2, c1)));
}

/// Invariant 6 — `simplifyExistsExpr` is idempotent on an output that is
/// still existentially quantified.
#[test]
fn invariant_6_simplify_exists_is_idempotent_when_still_quantified() {
    use itree_engine::expr::simplify::simplify_exists_expr;

    let shadow_array = Array::new("x", 4).to_shadow(0);
    let shadow_x = Expr::read(shadow_array.clone(), Expr::constant(0, 32));
    let other_shadow = Array::new("z", 4).to_shadow(1);
    let other = Expr::read(other_shadow.clone(), Expr::constant(0, 32));
    let interpolant = Expr::slt(shadow_x.clone(), other);
    let equality = Expr::eq(shadow_x, Expr::read(Array::new("y", 4), Expr::constant(0, 32)));
    let body = Expr::and(interpolant, equality);

    let once = simplify_exists_expr(&[shadow_array, other_shadow], body);
    if once.is_exists() {
        let twice = simplify_exists_expr(&[], once.clone());
        assert_eq!(once, twice);
    }
}

/// Invariant 9 — `containShadowExpr` (`contains_expr`) finds a needle
/// anywhere in the haystack's structure, including at the root.
#[test]
fn invariant_9_contains_expr_matches_structurally() {
    use itree_engine::expr::contains_expr;

    let x = Expr::read(Array::new("x", 4), Expr::constant(0, 32));
    let expr = Expr::and(Expr::slt(x.clone(), Expr::constant(10, 32)), Expr::true_());
    assert!(contains_expr(&expr, &x));
    assert!(contains_expr(&expr, &expr));
    assert!(!contains_expr(&expr, &Expr::read(Array::new("y", 4), Expr::constant(0, 32))));
}

/// A disabled observer never prevents subsumption checks from running; it
/// only withholds the diagnostic rendering (invariant 5).
#[test]
fn observer_disabled_does_not_affect_subsumption_outcome() {
    let config = EngineConfig::new().with_observer_enabled(false);
    let mut engine = Engine::new(config, NodeId(0));
    let root = engine.root();
    engine.remove(root).unwrap();

    assert!(matches!(engine.render_observer(), Err(EngineError::ObserverDisabled)));
}

/// `Validity::Unknown` from the solver is propagated rather than treated as
/// an error: the neutral "not subsumed" outcome of §7.
#[test]
fn naive_solver_reports_unknown_rather_than_failing() {
    let mut solver = NaiveSolver::new();
    let query = Expr::slt(
        Expr::read(Array::new("y", 4), Expr::constant(0, 32)),
        Expr::constant(10, 32),
    );
    let (validity, success) = solver.evaluate(&[], &query).unwrap();
    assert_eq!(validity, Validity::Unknown);
    assert!(!success);
}

#[test]
fn marker_map_covers_both_disjuncts_and_the_parent_atom() {
    let p = Expr::slt(Expr::constant(1, 32), Expr::constant(2, 32));
    let q = Expr::slt(Expr::constant(3, 32), Expr::constant(4, 32));
    let mut tree = ITree::new(EngineConfig::new(), NodeId(0));
    let root = tree.root();
    tree.add_constraint(root, Expr::or(p.clone(), q.clone()), VersionedValue::new(ValueId(1), Expr::true_()));

    let map = make_marker_map(tree.path_condition(root));
    assert_eq!(map.len(), 3);
    assert!(map.contains_key(&p));
    assert!(map.contains_key(&q));
}

/// Invariant 5 — a successful `checkCurrentStateSubsumption` marks the
/// current node subsumed in the observer and draws at least one dashed
/// subsumption edge back to the entry's origin.
#[test]
fn invariant_5_subsumption_marks_node_and_draws_dashed_edge() {
    let mut engine = Engine::new(EngineConfig::new(), NodeId(7));
    let root = engine.root();
    let (left, right) = engine.split(root).unwrap();
    engine.remove(left).unwrap();

    let mut solver = NaiveSolver::new();
    let no_values = IndexMap::new();
    let no_composite = IndexMap::new();
    let subsumed = engine
        .check_current_state_subsumption(right, &mut solver, &no_values, &no_composite)
        .unwrap();
    assert!(subsumed);

    let rendered = engine.render_observer().unwrap();
    assert!(rendered.contains("(subsumed)"));
    assert!(rendered.contains("[style=dashed]"));
}
