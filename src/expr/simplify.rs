//! Existential simplification (`simplifyExistsExpr` and its helpers in the
//! original source). This is the one corner of the subsystem with no direct
//! analog in the teacher codebase's own modules; it is grounded directly in
//! `lib/Core/ITree.cpp`'s `simplifyArithmeticBody`/`simplifyEqualityExpr`/
//! `simplifyInterpolantExpr` family (see DESIGN.md).

use super::{contains_expr, Array, Expr, ExprKind};

/// Folds `Eq`/`And`/`Or` shapes over constants. Per the original source's
/// unreachable-assert on any other top-level shape (open question (b) in
/// SPEC_FULL.md §9), callers must only ever pass one of these three kinds; we
/// enforce that with a debug assertion rather than a runtime `Result`, since
/// violating it is a bug in this module's own call sites, not in caller data.
pub fn simplify_equality_expr(expr: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::Eq => {
            if let (Some(a), Some(b)) = (expr.kid(0).as_constant(), expr.kid(1).as_constant()) {
                return if a == b { Expr::true_() } else { Expr::false_() };
            }
            expr.clone()
        }
        ExprKind::And => {
            let lhs = simplify_equality_expr(expr.kid(0));
            if lhs.as_constant_bool() == Some(false) {
                return Expr::false_();
            }
            let rhs = simplify_equality_expr(expr.kid(1));
            if rhs.as_constant_bool() == Some(false) {
                return Expr::false_();
            }
            match (lhs.as_constant_bool(), rhs.as_constant_bool()) {
                (Some(true), Some(true)) => Expr::true_(),
                (Some(true), None) => rhs,
                (None, Some(true)) => lhs,
                _ => expr.with_operands(lhs, rhs),
            }
        }
        ExprKind::Or => {
            let lhs = simplify_equality_expr(expr.kid(0));
            let rhs = simplify_equality_expr(expr.kid(1));
            match (lhs.as_constant_bool(), rhs.as_constant_bool()) {
                (Some(true), _) | (_, Some(true)) => Expr::true_(),
                (Some(false), Some(false)) => Expr::false_(),
                (Some(false), None) => rhs,
                (None, Some(false)) => lhs,
                _ => expr.with_operands(lhs, rhs),
            }
        }
        _ => {
            debug_assert!(
                false,
                "simplify_equality_expr called on a non-And/Or/Eq shape: {expr}"
            );
            expr.clone()
        }
    }
}

/// Normalizes `Eq(false, cmp)` into the negation of `cmp` by rewriting the
/// comparison kind (`Slt<->Sge`, `Sle<->Sgt`), folds constant (dis)equalities
/// for both `Eq` and `Ne`, and otherwise leaves the atom as-is (SPEC_FULL.md
/// §4.3.2 step 5).
fn simplify_interpolant_atom(atom: &Expr) -> Expr {
    match atom.kind() {
        ExprKind::Eq => {
            let (lhs, rhs) = (atom.kid(0), atom.kid(1));
            if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
                return if a == b { Expr::true_() } else { Expr::false_() };
            }
            if lhs.as_constant_bool() == Some(false) {
                if let Some(negated) = rhs.kind().negated_comparison() {
                    return Expr::binary(negated, rhs.kid(0).clone(), rhs.kid(1).clone(), rhs.width());
                }
            }
        }
        ExprKind::Ne => {
            let (lhs, rhs) = (atom.kid(0), atom.kid(1));
            if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
                return if a != b { Expr::true_() } else { Expr::false_() };
            }
        }
        _ => {}
    }
    atom.clone()
}

/// Flattens a right- or left-leaning chain of `And` nodes into its leaf atoms.
fn flatten_and(expr: &Expr) -> Vec<Expr> {
    match expr.kind() {
        ExprKind::And => {
            let mut atoms = flatten_and(expr.kid(0));
            atoms.extend(flatten_and(expr.kid(1)));
            atoms
        }
        _ => vec![expr.clone()],
    }
}

fn and_all(atoms: &[Expr]) -> Expr {
    let mut iter = atoms.iter().cloned();
    let Some(first) = iter.next() else {
        return Expr::true_();
    };
    iter.fold(first, Expr::and)
}

/// Collects atomic equalities from `equality_part`, folding constant equalities
/// and skipping (but still constant-folding) nested disjunctions, per
/// SPEC_FULL.md §4.3.2 step 4. Returns `None` if the whole conjunction
/// collapses to `false`.
fn collect_equality_pack(equality_part: &Expr) -> Option<Vec<Expr>> {
    let mut pack = Vec::new();
    for atom in flatten_and(equality_part) {
        match atom.kind() {
            ExprKind::Eq => {
                if let (Some(a), Some(b)) = (atom.kid(0).as_constant(), atom.kid(1).as_constant())
                {
                    if a != b {
                        return None; // false short-circuits the whole conjunction
                    }
                    // true: drop the atom
                } else {
                    pack.push(atom);
                }
            }
            ExprKind::Or => {
                // Disjuncts are not used for substitution, but we still fold constants
                // inside them so an all-false disjunction is caught.
                let _ = simplify_equality_expr(&atom);
            }
            _ => pack.push(atom),
        }
    }
    Some(pack)
}

/// Collects atoms from `interpolant_part`, applying the `Eq(false, cmp)`
/// normalization and constant folding (SPEC_FULL.md §4.3.2 step 5). Returns
/// `None` if the interpolant part resolves to a constant.
fn collect_interpolant_pack(interpolant_part: &Expr) -> (Vec<Expr>, Option<bool>) {
    let mut pack = Vec::new();
    let mut folded_to_constant = None;
    for atom in flatten_and(interpolant_part) {
        let normalized = simplify_interpolant_atom(&atom);
        match normalized.as_constant_bool() {
            Some(false) => {
                folded_to_constant = Some(false);
            }
            Some(true) => {}
            None => pack.push(normalized),
        }
    }
    if pack.is_empty() && folded_to_constant.is_none() {
        folded_to_constant = Some(true);
    }
    (pack, folded_to_constant)
}

/// `simplifyExistsExpr(exists existentials. body)` (SPEC_FULL.md §4.3.2).
///
/// `body` is expected to be the conjunction `interpolant ∧ stateEq` built by
/// [`crate::subsumption::SubsumptionTableEntry::subsumed`]; the left child is
/// treated as the interpolant part and the right child as the equality part,
/// matching how that query is assembled.
pub fn simplify_exists_expr(existentials: &[Array], body: Expr) -> Expr {
    if let Some(value) = body.as_constant_bool() {
        return Expr::constant(value as i64, 1);
    }
    let ExprKind::And = body.kind() else {
        return Expr::exists(existentials.to_vec(), body);
    };
    let interpolant_part = body.kid(0).clone();
    let equality_part = body.kid(1).clone();

    if let ExprKind::Or = equality_part.kind() {
        return Expr::exists(existentials.to_vec(), body);
    }

    let Some(equality_pack) = collect_equality_pack(&equality_part) else {
        return Expr::false_();
    };

    let (mut interpolant_pack, folded) = collect_interpolant_pack(&interpolant_part);
    if let Some(value) = folded {
        if !value {
            return Expr::false_();
        }
        // The interpolant collapsed to `true`; what remains concerns only concrete
        // current-state values, so no existential wrapper is needed.
        return and_all(&equality_pack);
    }

    let mut consumed = vec![false; equality_pack.len()];
    let mut rewritten_atoms = Vec::with_capacity(interpolant_pack.len());
    for interpolant_atom in &interpolant_pack {
        if !interpolant_atom.kind().is_binary() {
            rewritten_atoms.push(interpolant_atom.clone());
            continue;
        }
        let mut rewritten = interpolant_atom.clone();
        // Mirrors the original's single forward pass over equalityPack: every
        // successful substitution reassigns the working atom, and later
        // equalities are matched against that updated atom rather than the
        // original one, so a chain (C -> B1 via one equality, B1 -> B2 via the
        // next) fully resolves instead of stopping after the first hit.
        for (i, equality) in equality_pack.iter().enumerate() {
            if !rewritten.kind().is_binary() {
                continue;
            }
            let (a, b) = (equality.kid(0), equality.kid(1));
            let a_has_shadow = existentials.iter().any(|array| array_mentioned_in(a, array));
            if !a_has_shadow {
                continue;
            }
            let c = rewritten.kid(0).clone();
            if contains_expr(a, &c) {
                let d = rewritten.kid(1).clone();
                let new_rhs = if a.kids().is_empty() {
                    d.clone()
                } else {
                    super::replace_expr(a, &c, &d)
                };
                rewritten = fold_comparison(&rewritten.with_operands(b.clone(), new_rhs));
                consumed[i] = true;
            }
        }
        rewritten_atoms.push(rewritten);
    }

    let mut folded_interpolant_pack = Vec::new();
    for atom in rewritten_atoms {
        match atom.as_constant_bool() {
            Some(false) => return Expr::false_(),
            Some(true) => {}
            None => folded_interpolant_pack.push(atom),
        }
    }

    let remaining_equality_pack: Vec<Expr> = equality_pack
        .into_iter()
        .zip(consumed)
        .filter_map(|(atom, was_consumed)| if was_consumed { None } else { Some(atom) })
        .collect();

    let rewritten_interpolant = and_all(&folded_interpolant_pack);
    let rewritten_equality = and_all(&remaining_equality_pack);
    let combined = match (
        folded_interpolant_pack.is_empty(),
        remaining_equality_pack.is_empty(),
    ) {
        (true, true) => Expr::true_(),
        (true, false) => rewritten_equality,
        (false, true) => rewritten_interpolant,
        (false, false) => Expr::and(rewritten_interpolant, rewritten_equality),
    };

    let remaining_existentials: Vec<Array> = existentials
        .iter()
        .filter(|array| expr_mentions_array(&combined, array))
        .cloned()
        .collect();

    let result = if remaining_existentials.is_empty() {
        combined
    } else {
        Expr::exists(remaining_existentials, combined)
    };
    simplify_with_fourier_motzkin(result)
}

/// Folds a comparison expression (`Eq`/`Ne`/`Slt`/`Sle`/`Sgt`/`Sge`) whose
/// operands are both constants down to a boolean constant; returns `expr`
/// unchanged otherwise. Used after substitution collapses a shadow variable
/// to a concrete value (scenario S3).
fn fold_comparison(expr: &Expr) -> Expr {
    if !expr.kind().is_binary() {
        return expr.clone();
    }
    let (Some(a), Some(b)) = (expr.kid(0).as_constant(), expr.kid(1).as_constant()) else {
        return expr.clone();
    };
    let value = match expr.kind() {
        ExprKind::Eq => a == b,
        ExprKind::Ne => a != b,
        ExprKind::Slt => a < b,
        ExprKind::Sle => a <= b,
        ExprKind::Sgt => a > b,
        ExprKind::Sge => a >= b,
        _ => return expr.clone(),
    };
    Expr::constant(value as i64, 1)
}

fn array_mentioned_in(expr: &Expr, array: &Array) -> bool {
    match expr.kind() {
        ExprKind::Read(a) | ExprKind::Write(a) => {
            a == array || expr.kids().iter().any(|k| array_mentioned_in(k, array))
        }
        _ => expr.kids().iter().any(|k| array_mentioned_in(k, array)),
    }
}

fn expr_mentions_array(expr: &Expr, array: &Array) -> bool {
    array_mentioned_in(expr, array)
}

/// Pluggable arithmetic elimination step run after substitution
/// (SPEC_FULL.md §4.3.2 step 8). The baseline, as in the original source's
/// design space, is identity: Fourier-Motzkin elimination over the remaining
/// linear arithmetic atoms is a further optimization this crate does not
/// implement, and is explicitly out of scope (see Non-goals).
pub fn simplify_with_fourier_motzkin(expr: Expr) -> Expr {
    expr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shadow_var(array: &Array) -> Expr {
        Expr::read(array.clone(), Expr::constant(0, 32))
    }

    #[test]
    fn constant_eq_folds_both_ways() {
        assert_eq!(
            simplify_equality_expr(&Expr::eq(Expr::constant(3, 32), Expr::constant(3, 32))),
            Expr::true_()
        );
        assert_eq!(
            simplify_equality_expr(&Expr::eq(Expr::constant(3, 32), Expr::constant(4, 32))),
            Expr::false_()
        );
    }

    #[test]
    fn constant_ne_folds_both_ways() {
        assert_eq!(
            simplify_interpolant_atom(&Expr::ne(Expr::constant(3, 32), Expr::constant(4, 32))),
            Expr::true_()
        );
        assert_eq!(
            simplify_interpolant_atom(&Expr::ne(Expr::constant(3, 32), Expr::constant(3, 32))),
            Expr::false_()
        );
    }

    #[test]
    fn and_short_circuits_on_false() {
        let expr = Expr::and(
            Expr::eq(Expr::constant(1, 32), Expr::constant(2, 32)),
            Expr::eq(Expr::constant(5, 32), Expr::constant(5, 32)),
        );
        assert_eq!(simplify_equality_expr(&expr), Expr::false_());
    }

    #[test]
    fn substitution_collapses_to_constant_s3() {
        // Entry interpolant: Slt(shadow_x, 10); state equality: Eq(shadow_x, 5).
        let shadow_array = Array::new("x", 4).to_shadow(0);
        let shadow_x = shadow_var(&shadow_array);
        let interpolant = Expr::slt(shadow_x.clone(), Expr::constant(10, 32));
        let equality = Expr::eq(shadow_x, Expr::constant(5, 32));
        let body = Expr::and(interpolant, equality);
        let result = simplify_exists_expr(&[shadow_array], body);
        assert_eq!(result, Expr::true_());
    }

    #[test]
    fn substitution_yields_quantifier_free_formula_s4() {
        // Entry interpolant: Slt(shadow_x, 10); state equality: Eq(shadow_x, y).
        let shadow_array = Array::new("x", 4).to_shadow(0);
        let shadow_x = shadow_var(&shadow_array);
        let y = Expr::read(Array::new("y", 4), Expr::constant(0, 32));
        let interpolant = Expr::slt(shadow_x.clone(), Expr::constant(10, 32));
        let equality = Expr::eq(shadow_x, y.clone());
        let body = Expr::and(interpolant, equality);
        let result = simplify_exists_expr(&[shadow_array], body);
        assert!(!result.is_exists());
        assert_eq!(result, Expr::slt(y, Expr::constant(10, 32)));
    }

    #[test]
    fn substitution_chains_through_multiple_equalities() {
        // Entry interpolant: Slt(shadow_x, 10); equalities: Eq(shadow_x, shadow_y),
        // Eq(shadow_y, 5). Neither equality alone ties shadow_x to a constant, but
        // chaining through both (shadow_x -> shadow_y -> 5) must still collapse
        // the atom to a constant and eliminate both existentials.
        let shadow_x_array = Array::new("x", 4).to_shadow(0);
        let shadow_y_array = Array::new("y", 4).to_shadow(1);
        let shadow_x = shadow_var(&shadow_x_array);
        let shadow_y = shadow_var(&shadow_y_array);
        let interpolant = Expr::slt(shadow_x.clone(), Expr::constant(10, 32));
        let equalities = Expr::and(
            Expr::eq(shadow_x, shadow_y.clone()),
            Expr::eq(shadow_y, Expr::constant(5, 32)),
        );
        let body = Expr::and(interpolant, equalities);
        let result = simplify_exists_expr(&[shadow_x_array, shadow_y_array], body);
        assert_eq!(result, Expr::true_());
    }

    #[test]
    fn idempotent_when_still_existential() {
        let shadow_array = Array::new("x", 4).to_shadow(0);
        let shadow_x = shadow_var(&shadow_array);
        let other_shadow = Array::new("z", 4).to_shadow(1);
        let other = shadow_var(&other_shadow);
        let interpolant = Expr::slt(shadow_x.clone(), other);
        let equality = Expr::eq(shadow_x, Expr::read(Array::new("y", 4), Expr::constant(0, 32)));
        let body = Expr::and(interpolant, equality);
        let once = simplify_exists_expr(&[shadow_array, other_shadow], body);
        if once.is_exists() {
            let twice = simplify_exists_expr(&[], once.clone());
            assert_eq!(once, twice);
        }
    }
}
