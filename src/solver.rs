//! The solver gateway: the query/validity/unsat-core interface this crate
//! consumes from an SMT solver (SPEC_FULL.md §6). The real solver is an
//! external collaborator; this module defines the trait boundary plus one
//! small in-memory reference implementation adequate for this crate's own
//! tests.

use std::time::Duration;

use crate::error::SolverError;
use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Validity {
    True,
    False,
    Unknown,
}

/// The interpreter-facing solver interface consumed by `SubsumptionTableEntry::subsumed`.
pub trait Solver {
    fn set_timeout(&mut self, timeout: Duration);

    /// Standard, quantifier-free evaluation of `query` under `assumptions`.
    fn evaluate(
        &mut self,
        assumptions: &[Expr],
        query: &Expr,
    ) -> Result<(Validity, bool), SolverError>;

    /// The unsat core from the most recent `evaluate`/`direct_compute_validity` call.
    fn unsat_core(&self) -> Vec<Expr>;

    /// Bypasses pre-solving optimizations that do not handle quantifiers; used
    /// when the query still contains an existential after simplification.
    fn direct_compute_validity(
        &mut self,
        assumptions: &[Expr],
        query: &Expr,
    ) -> Result<(Validity, bool), SolverError>;
}

/// A small, deliberately naive reference solver: it resolves a query to a
/// constant by substituting variable/array-read positions using equalities
/// found among the assumptions and folding the result. It makes no attempt at
/// full decision-procedure completeness — real callers are expected to supply
/// their own `Solver` backed by an actual SMT process.
#[derive(Debug, Default)]
pub struct NaiveSolver {
    timeout: Duration,
    last_core: Vec<Expr>,
}

impl NaiveSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Solver for NaiveSolver {
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn evaluate(
        &mut self,
        assumptions: &[Expr],
        query: &Expr,
    ) -> Result<(Validity, bool), SolverError> {
        let substitutions = equality_substitutions(assumptions);
        let known_atoms = flatten_known_atoms(assumptions);
        self.last_core = assumptions.to_vec();
        match fold_under(query, &substitutions, &known_atoms) {
            Some(true) => Ok((Validity::True, true)),
            Some(false) => Ok((Validity::False, true)),
            None => Ok((Validity::Unknown, false)),
        }
    }

    fn unsat_core(&self) -> Vec<Expr> {
        self.last_core.clone()
    }

    fn direct_compute_validity(
        &mut self,
        assumptions: &[Expr],
        query: &Expr,
    ) -> Result<(Validity, bool), SolverError> {
        // The naive solver has no real quantifier support; it folds what it can
        // and otherwise reports unknown, which is the conservative behavior
        // SPEC_FULL.md §7 specifies for a solver that cannot decide a query.
        self.evaluate(assumptions, query)
    }
}

fn equality_substitutions(assumptions: &[Expr]) -> indexmap::IndexMap<Expr, i64> {
    use crate::expr::ExprKind;
    let mut map = indexmap::IndexMap::new();
    for assumption in assumptions {
        if let ExprKind::Eq = assumption.kind() {
            let (lhs, rhs) = (assumption.kid(0), assumption.kid(1));
            match (lhs.as_constant(), rhs.as_constant()) {
                (None, Some(value)) => {
                    map.insert(lhs.clone(), value);
                }
                (Some(value), None) => {
                    map.insert(rhs.clone(), value);
                }
                _ => {}
            }
        }
    }
    map
}

fn resolve(expr: &Expr, substitutions: &indexmap::IndexMap<Expr, i64>) -> Option<i64> {
    if let Some(value) = expr.as_constant() {
        return Some(value);
    }
    substitutions.get(expr).copied()
}

/// Flattens the top-level `And` structure of every assumption into a flat set
/// of atoms the naive solver may treat as directly known to hold.
fn flatten_known_atoms(assumptions: &[Expr]) -> std::collections::HashSet<Expr> {
    use crate::expr::ExprKind;
    fn flatten_into(expr: &Expr, out: &mut std::collections::HashSet<Expr>) {
        if let ExprKind::And = expr.kind() {
            flatten_into(expr.kid(0), out);
            flatten_into(expr.kid(1), out);
        } else {
            out.insert(expr.clone());
        }
    }
    let mut out = std::collections::HashSet::new();
    for assumption in assumptions {
        flatten_into(assumption, &mut out);
    }
    out
}

fn fold_under(
    expr: &Expr,
    substitutions: &indexmap::IndexMap<Expr, i64>,
    known_atoms: &std::collections::HashSet<Expr>,
) -> Option<bool> {
    use crate::expr::ExprKind;
    if let Some(value) = expr.as_constant_bool() {
        return Some(value);
    }
    if known_atoms.contains(expr) {
        return Some(true);
    }
    match expr.kind() {
        ExprKind::And => {
            let lhs = fold_under(expr.kid(0), substitutions, known_atoms);
            if lhs == Some(false) {
                return Some(false);
            }
            let rhs = fold_under(expr.kid(1), substitutions, known_atoms);
            if rhs == Some(false) {
                return Some(false);
            }
            match (lhs, rhs) {
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }
        }
        ExprKind::Or => {
            let lhs = fold_under(expr.kid(0), substitutions, known_atoms);
            if lhs == Some(true) {
                return Some(true);
            }
            let rhs = fold_under(expr.kid(1), substitutions, known_atoms);
            if rhs == Some(true) {
                return Some(true);
            }
            match (lhs, rhs) {
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }
        }
        ExprKind::Not => fold_under(expr.kid(0), substitutions, known_atoms).map(|b| !b),
        ExprKind::Eq => {
            let (a, b) = (resolve(expr.kid(0), substitutions), resolve(expr.kid(1), substitutions));
            Some(a? == b?)
        }
        ExprKind::Ne => {
            let (a, b) = (resolve(expr.kid(0), substitutions), resolve(expr.kid(1), substitutions));
            Some(a? != b?)
        }
        ExprKind::Slt => {
            let (a, b) = (resolve(expr.kid(0), substitutions), resolve(expr.kid(1), substitutions));
            Some(a? < b?)
        }
        ExprKind::Sle => {
            let (a, b) = (resolve(expr.kid(0), substitutions), resolve(expr.kid(1), substitutions));
            Some(a? <= b?)
        }
        ExprKind::Sgt => {
            let (a, b) = (resolve(expr.kid(0), substitutions), resolve(expr.kid(1), substitutions));
            Some(a? > b?)
        }
        ExprKind::Sge => {
            let (a, b) = (resolve(expr.kid(0), substitutions), resolve(expr.kid(1), substitutions));
            Some(a? >= b?)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Array;

    fn var(name: &str) -> Expr {
        Expr::read(Array::new(name, 4), Expr::constant(0, 32))
    }

    #[test]
    fn resolves_query_entailed_by_assumed_equality() {
        let mut solver = NaiveSolver::new();
        let assumptions = vec![Expr::eq(var("y"), Expr::constant(3, 32))];
        let query = Expr::slt(var("y"), Expr::constant(10, 32));
        let (validity, success) = solver.evaluate(&assumptions, &query).unwrap();
        assert_eq!(validity, Validity::True);
        assert!(success);
    }

    #[test]
    fn reports_unknown_when_it_cannot_decide() {
        let mut solver = NaiveSolver::new();
        let query = Expr::slt(var("y"), Expr::constant(10, 32));
        let (validity, success) = solver.evaluate(&[], &query).unwrap();
        assert_eq!(validity, Validity::Unknown);
        assert!(!success);
    }
}
