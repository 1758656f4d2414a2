//! The expression language shared by guards, invariants, and contracts.
//!
//! Parsing and the full type system are front-end concerns; this module only
//! provides the operations the lowering passes need: constructor helpers,
//! substitution of program variables (binder-aware), and rewriting of
//! `old(...)` contexts when a postcondition is transplanted to a call site.

use rustc_hash::FxHashMap;

use crate::ty::Type;

/// Substitution from variable names to replacement expressions.
pub type ExprSubst = FxHashMap<String, Expr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lit {
    Bool(bool),
    Int(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Imp,
    Iff,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    /// Whether the operator produces a boolean, independent of operand types.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            BinOp::And
                | BinOp::Or
                | BinOp::Imp
                | BinOp::Iff
                | BinOp::Eq
                | BinOp::Neq
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantKind {
    Forall,
    Exists,
}

/// A quantifier-bound variable.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundVar {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Lit),
    Var(String),
    /// The value of the operand in the pre-state of the enclosing procedure.
    Old(Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Quant(QuantKind, Vec<BoundVar>, Box<Expr>),
    /// Application of a declared (uninterpreted) function.
    FnApp(String, Vec<Expr>),
}

impl Expr {
    pub fn bool(value: bool) -> Expr {
        Expr::Lit(Lit::Bool(value))
    }

    pub fn int(value: i64) -> Expr {
        Expr::Lit(Lit::Int(value))
    }

    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn not(operand: Expr) -> Expr {
        Expr::Unary(UnOp::Not, Box::new(operand))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs))
    }

    pub fn imp(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(BinOp::Imp, Box::new(lhs), Box::new(rhs))
    }

    /// Conjunction of all the given expressions; `true` when there are none.
    pub fn and_all(conjuncts: impl IntoIterator<Item = Expr>) -> Expr {
        let mut iter = conjuncts.into_iter();
        match iter.next() {
            None => Expr::bool(true),
            Some(first) => iter.fold(first, Expr::and),
        }
    }

    /// `forall vars :: body`, or just `body` when `vars` is empty.
    pub fn forall(vars: Vec<BoundVar>, body: Expr) -> Expr {
        Expr::quant(QuantKind::Forall, vars, body)
    }

    /// `exists vars :: body`, or just `body` when `vars` is empty.
    pub fn exists(vars: Vec<BoundVar>, body: Expr) -> Expr {
        Expr::quant(QuantKind::Exists, vars, body)
    }

    fn quant(kind: QuantKind, vars: Vec<BoundVar>, body: Expr) -> Expr {
        if vars.is_empty() {
            body
        } else {
            Expr::Quant(kind, vars, Box::new(body))
        }
    }

    /// Whether the expression can be boolean-valued at its root. This is the
    /// only typing question lowering ever asks about a predicate; variables
    /// and function applications are accepted because their types are not
    /// known here.
    pub fn is_boolean(&self) -> bool {
        match self {
            Expr::Lit(Lit::Bool(_)) => true,
            Expr::Lit(Lit::Int(_)) => false,
            Expr::Var(_) | Expr::FnApp(..) => true,
            Expr::Old(inner) => inner.is_boolean(),
            Expr::Unary(UnOp::Not, _) => true,
            Expr::Unary(UnOp::Neg, _) => false,
            Expr::Binary(op, ..) => op.is_predicate(),
            Expr::Quant(..) => true,
        }
    }

    /// Substitute free occurrences of variables according to `map`.
    /// Quantifier binders shadow: bound names are not replaced underneath
    /// their binder.
    pub fn substitute(&self, map: &ExprSubst) -> Expr {
        match self {
            Expr::Lit(_) => self.clone(),
            Expr::Var(name) => match map.get(name) {
                Some(replacement) => replacement.clone(),
                None => self.clone(),
            },
            Expr::Old(inner) => Expr::Old(Box::new(inner.substitute(map))),
            Expr::Unary(op, operand) => Expr::Unary(*op, Box::new(operand.substitute(map))),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(lhs.substitute(map)),
                Box::new(rhs.substitute(map)),
            ),
            Expr::Quant(kind, vars, body) => {
                let shadowed: Vec<&String> = vars
                    .iter()
                    .map(|v| &v.name)
                    .filter(|n| map.contains_key(*n))
                    .collect();
                if shadowed.is_empty() {
                    Expr::Quant(*kind, vars.clone(), Box::new(body.substitute(map)))
                } else {
                    let mut inner = map.clone();
                    for name in shadowed {
                        inner.remove(name);
                    }
                    Expr::Quant(*kind, vars.clone(), Box::new(body.substitute(&inner)))
                }
            }
            Expr::FnApp(name, args) => Expr::FnApp(
                name.clone(),
                args.iter().map(|a| a.substitute(map)).collect(),
            ),
        }
    }

    /// Substitute with a separate map for `old(...)` contexts, dropping the
    /// `old` wrapper. Used when a postcondition is transplanted to a call
    /// site: current-state occurrences go through `map` (formals to
    /// temporaries), while occurrences under `old` go through `old_map`
    /// (modified globals to their snapshots), falling back to `map` for
    /// everything else that appears under `old` (formals do not change, so
    /// their pre- and post-values coincide).
    pub fn substitute_old(&self, map: &ExprSubst, old_map: &ExprSubst) -> Expr {
        match self {
            Expr::Old(inner) => {
                let mut merged = map.clone();
                for (name, replacement) in old_map {
                    merged.insert(name.clone(), replacement.clone());
                }
                inner.substitute(&merged)
            }
            Expr::Lit(_) | Expr::Var(_) => self.substitute(map),
            Expr::Unary(op, operand) => {
                Expr::Unary(*op, Box::new(operand.substitute_old(map, old_map)))
            }
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(lhs.substitute_old(map, old_map)),
                Box::new(rhs.substitute_old(map, old_map)),
            ),
            Expr::Quant(kind, vars, body) => {
                let bound: Vec<String> = vars.iter().map(|v| v.name.clone()).collect();
                let strip = |m: &ExprSubst| {
                    let mut m = m.clone();
                    for name in &bound {
                        m.remove(name);
                    }
                    m
                };
                Expr::Quant(
                    *kind,
                    vars.clone(),
                    Box::new(body.substitute_old(&strip(map), &strip(old_map))),
                )
            }
            Expr::FnApp(name, args) => Expr::FnApp(
                name.clone(),
                args.iter()
                    .map(|a| a.substitute_old(map, old_map))
                    .collect(),
            ),
        }
    }
}
