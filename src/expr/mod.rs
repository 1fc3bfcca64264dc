//! The symbolic expression term model.
//!
//! SPEC_FULL.md treats the real expression language as external to the core
//! ITree algorithms, but a buildable, independently testable crate needs a
//! concrete representation at that seam. This module provides one: an
//! immutable, hash-consing-friendly term type matched exhaustively by a tagged
//! [`ExprKind`] rather than any RTTI-style open dispatch (design note, §9).

pub mod simplify;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub type Width = u32;

/// A named symbolic byte array. A "shadow" array is a freshly named copy
/// introduced for alpha-renaming of existentially quantified variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Array {
    pub name: Rc<str>,
    pub size: u64,
    pub is_shadow: bool,
}

impl Array {
    pub fn new(name: impl Into<Rc<str>>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_shadow: false,
        }
    }

    /// Produces a fresh alpha-renamed copy of this array, tagged as shadow.
    pub fn to_shadow(&self, disambiguator: usize) -> Array {
        Array {
            name: Rc::from(format!("{}__shadow{}", self.name, disambiguator)),
            size: self.size,
            is_shadow: true,
        }
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The tag distinguishing one kind of term from another. Matched exhaustively
/// everywhere in this crate; there is no open extension point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::IntoStaticStr)]
pub enum ExprKind {
    Constant(i64),
    /// A read from a symbolic array at the (single) child index.
    Read(Array),
    /// A write to a symbolic array: child 0 is the index, child 1 the stored value.
    Write(Array),
    Not,
    And,
    Or,
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Add,
    Sub,
    Mul,
    /// An existentially-quantified body; the bound arrays are the shadow arrays
    /// introduced during alpha-renaming.
    Exists(Vec<Array>),
}

impl ExprKind {
    /// The negated comparison kind, used by the `Eq(false, cmp)` normalization
    /// rule in `simplify_exists_expr` (design note, §9; SPEC_FULL.md §4.3.2 step 5).
    pub fn negated_comparison(&self) -> Option<ExprKind> {
        match self {
            ExprKind::Slt => Some(ExprKind::Sge),
            ExprKind::Sge => Some(ExprKind::Slt),
            ExprKind::Sle => Some(ExprKind::Sgt),
            ExprKind::Sgt => Some(ExprKind::Sle),
            _ => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            ExprKind::And
                | ExprKind::Or
                | ExprKind::Eq
                | ExprKind::Ne
                | ExprKind::Slt
                | ExprKind::Sle
                | ExprKind::Sgt
                | ExprKind::Sge
                | ExprKind::Add
                | ExprKind::Sub
                | ExprKind::Mul
        )
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct ExprData {
    kind: ExprKind,
    kids: Vec<Expr>,
    width: Width,
}

/// An immutable algebraic term. Cheap to clone (an `Rc` bump) and compared by
/// structural equality of kind and children, not by pointer identity.
#[derive(Clone)]
pub struct Expr(Rc<ExprData>);

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl Expr {
    fn leaf(kind: ExprKind, width: Width) -> Self {
        Self(Rc::new(ExprData {
            kind,
            kids: Vec::new(),
            width,
        }))
    }

    fn node(kind: ExprKind, kids: Vec<Expr>, width: Width) -> Self {
        Self(Rc::new(ExprData { kind, kids, width }))
    }

    pub fn constant(value: i64, width: Width) -> Self {
        Self::leaf(ExprKind::Constant(value), width)
    }

    pub fn true_() -> Self {
        Self::constant(1, 1)
    }

    pub fn false_() -> Self {
        Self::constant(0, 1)
    }

    pub fn read(array: Array, index: Expr) -> Self {
        Self::node(ExprKind::Read(array), vec![index], 8)
    }

    pub fn write(array: Array, index: Expr, value: Expr) -> Self {
        Self::node(ExprKind::Write(array), vec![index, value], 8)
    }

    pub fn not(operand: Expr) -> Self {
        Self::node(ExprKind::Not, vec![operand], 1)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::And, lhs, rhs, 1)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Or, lhs, rhs, 1)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Eq, lhs, rhs, 1)
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Ne, lhs, rhs, 1)
    }

    pub fn slt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Slt, lhs, rhs, 1)
    }

    pub fn sle(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Sle, lhs, rhs, 1)
    }

    pub fn sgt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Sgt, lhs, rhs, 1)
    }

    pub fn sge(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(ExprKind::Sge, lhs, rhs, 1)
    }

    pub fn add(lhs: Expr, rhs: Expr, width: Width) -> Self {
        Self::binary(ExprKind::Add, lhs, rhs, width)
    }

    pub fn sub(lhs: Expr, rhs: Expr, width: Width) -> Self {
        Self::binary(ExprKind::Sub, lhs, rhs, width)
    }

    pub fn mul(lhs: Expr, rhs: Expr, width: Width) -> Self {
        Self::binary(ExprKind::Mul, lhs, rhs, width)
    }

    pub fn binary(kind: ExprKind, lhs: Expr, rhs: Expr, width: Width) -> Self {
        debug_assert!(kind.is_binary(), "{kind} is not a binary expression kind");
        Self::node(kind, vec![lhs, rhs], width)
    }

    pub fn exists(bound: Vec<Array>, body: Expr) -> Self {
        if bound.is_empty() {
            return body;
        }
        let width = body.width();
        Self::node(ExprKind::Exists(bound), vec![body], width)
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn kids(&self) -> &[Expr] {
        &self.0.kids
    }

    pub fn kid(&self, i: usize) -> &Expr {
        &self.0.kids[i]
    }

    pub fn width(&self) -> Width {
        self.0.width
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self.0.kind {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_constant_bool(&self) -> Option<bool> {
        self.as_constant().map(|value| value != 0)
    }

    pub fn is_exists(&self) -> bool {
        matches!(self.0.kind, ExprKind::Exists(_))
    }

    /// Rebuilds this binary expression with the same top-level kind but new
    /// operands (`createBinaryOfSameKind` in the original source).
    pub fn with_operands(&self, lhs: Expr, rhs: Expr) -> Expr {
        debug_assert!(
            self.0.kind.is_binary(),
            "with_operands called on a non-binary expression"
        );
        Self::node(self.0.kind.clone(), vec![lhs, rhs], self.0.width)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            ExprKind::Constant(value) => write!(f, "{value}"),
            ExprKind::Read(array) => write!(f, "{}[{}]", array, self.0.kids[0]),
            ExprKind::Write(array) => {
                write!(f, "{}[{} := {}]", array, self.0.kids[0], self.0.kids[1])
            }
            ExprKind::Not => write!(f, "!{}", self.0.kids[0]),
            ExprKind::Exists(bound) => {
                let names = bound
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "(exists ({names}) {})", self.0.kids[0])
            }
            kind => write!(f, "({} {kind} {})", self.0.kids[0], self.0.kids[1]),
        }
    }
}

/// Renames every array occurrence within `expr` to its shadow counterpart,
/// recording the original→shadow mapping in `replacements` so that repeated
/// occurrences of the same array across a single `packInterpolant` call share
/// one shadow name (SPEC_FULL.md §3, §4.3.2).
pub fn rename_arrays_to_shadow(
    expr: &Expr,
    replacements: &mut indexmap::IndexMap<Array, Array>,
) -> Expr {
    match expr.kind() {
        ExprKind::Read(array) => {
            let shadow = shadow_for(array, replacements);
            Expr::read(shadow, rename_arrays_to_shadow(expr.kid(0), replacements))
        }
        ExprKind::Write(array) => {
            let shadow = shadow_for(array, replacements);
            Expr::write(
                shadow,
                rename_arrays_to_shadow(expr.kid(0), replacements),
                rename_arrays_to_shadow(expr.kid(1), replacements),
            )
        }
        ExprKind::Constant(_) => expr.clone(),
        ExprKind::Not => Expr::not(rename_arrays_to_shadow(expr.kid(0), replacements)),
        ExprKind::Exists(bound) => {
            let bound = bound.clone();
            Expr::exists(
                bound,
                rename_arrays_to_shadow(expr.kid(0), replacements),
            )
        }
        kind if kind.is_binary() => expr.with_operands(
            rename_arrays_to_shadow(expr.kid(0), replacements),
            rename_arrays_to_shadow(expr.kid(1), replacements),
        ),
        _ => expr.clone(),
    }
}

fn shadow_for(array: &Array, replacements: &mut indexmap::IndexMap<Array, Array>) -> Array {
    if array.is_shadow {
        return array.clone();
    }
    if let Some(existing) = replacements.get(array) {
        return existing.clone();
    }
    let shadow = array.to_shadow(replacements.len());
    replacements.insert(array.clone(), shadow.clone());
    shadow
}

/// True iff `needle` occurs anywhere structurally within `haystack`
/// (`containShadowExpr` in the original source; testable property 9).
pub fn contains_expr(haystack: &Expr, needle: &Expr) -> bool {
    if haystack == needle {
        return true;
    }
    haystack.kids().iter().any(|kid| contains_expr(kid, needle))
}

/// Replaces every occurrence of `from` within `expr` by `to`
/// (`replaceExpr` in the original source; testable property 8). Returns `expr`
/// unchanged (by structural equality) when `from` does not occur.
pub fn replace_expr(expr: &Expr, from: &Expr, to: &Expr) -> Expr {
    if expr == from {
        return to.clone();
    }
    if expr.kids().is_empty() {
        return expr.clone();
    }
    let new_kids: Vec<Expr> = expr
        .kids()
        .iter()
        .map(|kid| replace_expr(kid, from, to))
        .collect();
    match expr.kind() {
        ExprKind::Not => Expr::not(new_kids[0].clone()),
        ExprKind::Exists(bound) => Expr::exists(bound.clone(), new_kids[0].clone()),
        ExprKind::Read(array) => Expr::read(array.clone(), new_kids[0].clone()),
        ExprKind::Write(array) => {
            Expr::write(array.clone(), new_kids[0].clone(), new_kids[1].clone())
        }
        kind if kind.is_binary() => expr.with_operands(new_kids[0].clone(), new_kids[1].clone()),
        _ => expr.clone(),
    }
}
