//! Simple (straight-line) commands.
//!
//! These are the commands that survive lowering unchanged and make up the
//! bodies of flat basic blocks: assignment, assertion, assumption, havoc,
//! calls, and the scoped command a call desugars into. Control flow is not
//! here; structured and transfer commands live in `structured`.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::expr::Expr;
use crate::proc::Procedure;
use crate::span::Span;
use crate::ty::{Type, TypeSubst};

#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    Assign(AssignCmd),
    Assert(AssertCmd),
    Assume(AssumeCmd),
    Havoc(HavocCmd),
    Call(CallCmd),
    CallForall(CallForallCmd),
    State(StateCmd),
}

impl Cmd {
    pub fn span(&self) -> Span {
        match self {
            Cmd::Assign(c) => c.span,
            Cmd::Assert(c) => c.span,
            Cmd::Assume(c) => c.span,
            Cmd::Havoc(c) => c.span,
            Cmd::Call(c) => c.span,
            Cmd::CallForall(c) => c.span,
            Cmd::State(c) => c.span,
        }
    }

    /// `lhs := rhs`
    pub fn simple_assign(span: Span, lhs: impl Into<String>, rhs: Expr) -> Cmd {
        Cmd::Assign(AssignCmd {
            span,
            lhss: vec![lhs.into()],
            rhss: vec![rhs],
        })
    }

    pub fn assume(span: Span, condition: Expr) -> Cmd {
        Cmd::Assume(AssumeCmd {
            span,
            condition,
            partition: false,
        })
    }

    pub fn assert(span: Span, condition: Expr) -> Cmd {
        Cmd::Assert(AssertCmd {
            span,
            condition,
            provenance: None,
        })
    }

    pub fn havoc(span: Span, vars: Vec<String>) -> Cmd {
        Cmd::Havoc(HavocCmd { span, vars })
    }
}

/// Parallel assignment. All right-hand sides are evaluated before any
/// left-hand side is updated; the type checker rejects two left-hand sides
/// denoting the same variable.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignCmd {
    pub span: Span,
    pub lhss: Vec<String>,
    pub rhss: Vec<Expr>,
}

/// Where an assertion came from, for diagnostics about its failure.
#[derive(Debug, Clone, PartialEq)]
pub enum AssertProvenance {
    /// A callee precondition asserted at a call site.
    CallRequires { callee: String, clause: Span },
    /// A loop invariant asserted in the loop's head block.
    LoopInvariant { clause: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertCmd {
    pub span: Span,
    pub condition: Expr,
    pub provenance: Option<AssertProvenance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssumeCmd {
    pub span: Span,
    pub condition: Expr,
    /// Marks branch-guard assumptions synthesized during lowering, so that
    /// downstream abstract interpretation can recognize path filters.
    pub partition: bool,
}

/// Nondeterministic assignment to the listed variables, as one combined
/// command.
#[derive(Debug, Clone, PartialEq)]
pub struct HavocCmd {
    pub span: Span,
    pub vars: Vec<String>,
}

/// A local variable of a [`StateCmd`] scope.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    pub name: String,
    pub ty: Type,
    pub where_clause: Option<Expr>,
}

/// A fresh local-variable scope around a command sequence. This is the shape
/// of a computed call desugaring: the locals are the call's temporaries and
/// are invisible outside the scope.
#[derive(Debug, Clone, PartialEq)]
pub struct StateCmd {
    pub span: Span,
    pub locals: Vec<LocalVar>,
    pub cmds: Vec<Cmd>,
}

/// A procedure call with assignable outputs.
///
/// `None` entries in `ins` are wildcard arguments (nondeterministic input);
/// `None` entries in `outs` discard the corresponding result. The resolved
/// callee and its type-parameter instantiation are installed exactly once by
/// resolution and type checking; the desugaring is computed at most once and
/// cached for the lifetime of the command.
#[derive(Debug, Clone, PartialEq)]
pub struct CallCmd {
    pub span: Span,
    pub callee: String,
    pub ins: Vec<Option<Expr>>,
    pub outs: Vec<Option<String>>,
    pub is_async: bool,
    resolved: Option<Rc<Procedure>>,
    type_instantiation: Option<TypeSubst>,
    desugaring: OnceCell<StateCmd>,
}

impl CallCmd {
    pub fn new(
        span: Span,
        callee: impl Into<String>,
        ins: Vec<Option<Expr>>,
        outs: Vec<Option<String>>,
    ) -> Self {
        Self {
            span,
            callee: callee.into(),
            ins,
            outs,
            is_async: false,
            resolved: None,
            type_instantiation: None,
            desugaring: OnceCell::new(),
        }
    }

    pub fn into_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Install the resolved callee. May be called at most once.
    pub fn resolve(&mut self, callee: Rc<Procedure>) {
        assert!(
            self.resolved.is_none(),
            "call to `{}` resolved twice",
            self.callee
        );
        self.resolved = Some(callee);
    }

    pub fn resolved(&self) -> Option<&Rc<Procedure>> {
        self.resolved.as_ref()
    }

    /// Install the type-parameter instantiation. May be called at most once.
    pub fn set_type_instantiation(&mut self, subst: TypeSubst) {
        assert!(
            self.type_instantiation.is_none(),
            "call to `{}` instantiated twice",
            self.callee
        );
        self.type_instantiation = Some(subst);
    }

    pub fn type_instantiation(&self) -> Option<&TypeSubst> {
        self.type_instantiation.as_ref()
    }

    /// The memoized desugaring: the first caller computes, later callers see
    /// the same cached value.
    pub fn cached_desugaring(&self, compute: impl FnOnce() -> StateCmd) -> &StateCmd {
        self.desugaring.get_or_init(compute)
    }

    /// The desugaring, if it has been computed already.
    pub fn desugaring_if_computed(&self) -> Option<&StateCmd> {
        self.desugaring.get()
    }
}

/// A universally quantified ghost call: `call forall p(e, *);`.
///
/// No outputs, and the callee must have an empty modifies frame; desugaring
/// injects a single assumed axiom instead of mutating any state.
#[derive(Debug, Clone, PartialEq)]
pub struct CallForallCmd {
    pub span: Span,
    pub callee: String,
    pub ins: Vec<Option<Expr>>,
    resolved: Option<Rc<Procedure>>,
    type_instantiation: Option<TypeSubst>,
    desugaring: OnceCell<StateCmd>,
}

impl CallForallCmd {
    pub fn new(span: Span, callee: impl Into<String>, ins: Vec<Option<Expr>>) -> Self {
        Self {
            span,
            callee: callee.into(),
            ins,
            resolved: None,
            type_instantiation: None,
            desugaring: OnceCell::new(),
        }
    }

    /// Install the resolved callee. May be called at most once.
    pub fn resolve(&mut self, callee: Rc<Procedure>) {
        assert!(
            self.resolved.is_none(),
            "call forall to `{}` resolved twice",
            self.callee
        );
        self.resolved = Some(callee);
    }

    pub fn resolved(&self) -> Option<&Rc<Procedure>> {
        self.resolved.as_ref()
    }

    /// Install the type-parameter instantiation. May be called at most once.
    pub fn set_type_instantiation(&mut self, subst: TypeSubst) {
        assert!(
            self.type_instantiation.is_none(),
            "call forall to `{}` instantiated twice",
            self.callee
        );
        self.type_instantiation = Some(subst);
    }

    pub fn type_instantiation(&self) -> Option<&TypeSubst> {
        self.type_instantiation.as_ref()
    }

    pub fn cached_desugaring(&self, compute: impl FnOnce() -> StateCmd) -> &StateCmd {
        self.desugaring.get_or_init(compute)
    }

    pub fn desugaring_if_computed(&self) -> Option<&StateCmd> {
        self.desugaring.get()
    }
}
