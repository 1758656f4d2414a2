//! Modular call desugaring.
//!
//! A call is expanded from its callee's contract alone, never from its
//! body. For `call y := p(e)` against
//!
//! ```text
//! proc p(x) returns (r)
//!   requires Pre; modifies g; ensures Post
//! ```
//!
//! the expansion is a fresh scope around:
//!
//! ```text
//! x#cin := e;                        // or havoc for a wildcard input
//! assert Pre[x := x#cin];            // existential over bound temps when
//!                                    // any input is a wildcard
//! g#old := g;                        // snapshots for old() in Post
//! havoc g, r#cout;                   // one combined havoc
//! assume Post[x := x#cin, r := r#cout, old(g) := g#old];
//! y := r#cout;
//! ```
//!
//! `call forall` injects a single assumed axiom instead and touches no
//! state at all.
//!
//! Both expansions require an already resolved and type-checked callee;
//! anything else is an internal invariant violation. Results are memoized
//! on the call command: the first request computes, every later request
//! sees the identical cached structure.

use veil_ast::cmd::{
    AssertCmd, AssertProvenance, AssignCmd, CallCmd, CallForallCmd, Cmd, LocalVar, StateCmd,
};
use veil_ast::expr::{BoundVar, Expr, ExprSubst};

/// The desugaring of a call with assignable outputs, computed on first
/// request and cached on the command.
pub fn desugar_call(call: &CallCmd) -> &StateCmd {
    call.cached_desugaring(|| compute_call(call))
}

/// The desugaring of a universally quantified ghost call, computed on first
/// request and cached on the command.
pub fn desugar_call_forall(call: &CallForallCmd) -> &StateCmd {
    call.cached_desugaring(|| compute_call_forall(call))
}

/// Fresh temporary names for one call site. The `#` separator cannot occur
/// in surface identifiers, so temporaries never collide with program
/// variables; the counter keeps them distinct from each other.
struct TempNames {
    next: usize,
}

impl TempNames {
    fn new() -> Self {
        Self { next: 0 }
    }

    fn fresh(&mut self, base: &str, role: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{base}#{role}{n}")
    }
}

fn compute_call(call: &CallCmd) -> StateCmd {
    let proc = call
        .resolved()
        .expect("call desugared before resolution")
        .clone();
    let tsubst = call
        .type_instantiation()
        .expect("call desugared before type checking")
        .clone();
    assert_eq!(
        call.ins.len(),
        proc.in_params.len(),
        "input arity checked before desugaring"
    );
    assert_eq!(
        call.outs.len(),
        proc.out_params.len(),
        "output arity checked before desugaring"
    );

    tracing::debug!(callee = %call.callee, "desugaring call");
    let span = call.span;

    let mut names = TempNames::new();
    let mut locals: Vec<LocalVar> = Vec::new();
    let mut cmds: Vec<Cmd> = Vec::new();
    let mut subst = ExprSubst::default();
    let mut old_subst = ExprSubst::default();
    let mut bound_subst = ExprSubst::default();
    let mut wildcard_bounds: Vec<BoundVar> = Vec::new();

    // copy or havoc the inputs
    for (formal, actual) in proc.in_params.iter().zip(&call.ins) {
        let ty = formal.ty.substitute(&tsubst);
        let cin = names.fresh(&formal.name, "cin");
        subst.insert(formal.name.clone(), Expr::var(cin.clone()));
        let where_clause = formal.where_clause.as_ref().map(|w| w.substitute(&subst));
        locals.push(LocalVar {
            name: cin.clone(),
            ty: ty.clone(),
            where_clause,
        });
        match actual {
            Some(expr) => cmds.push(Cmd::simple_assign(span, cin, expr.clone())),
            None => {
                cmds.push(Cmd::havoc(span, vec![cin]));
                // a second, bound temporary that only ever appears inside
                // the precondition existential
                let bound = names.fresh(&formal.name, "bound");
                bound_subst.insert(formal.name.clone(), Expr::var(bound.clone()));
                wildcard_bounds.push(BoundVar { name: bound, ty });
            }
        }
    }

    // precondition obligations
    if wildcard_bounds.is_empty() {
        for req in proc.checked_requires() {
            cmds.push(Cmd::Assert(AssertCmd {
                span,
                condition: req.condition.substitute(&subst),
                provenance: Some(AssertProvenance::CallRequires {
                    callee: proc.name.clone(),
                    clause: req.span,
                }),
            }));
        }
    } else {
        // with an unconstrained input, the caller's obligation is that the
        // preconditions hold for SOME choice of it
        let mut merged = subst.clone();
        for (formal, bound) in &bound_subst {
            merged.insert(formal.clone(), bound.clone());
        }
        let conjunction =
            Expr::and_all(proc.checked_requires().map(|r| r.condition.substitute(&merged)));
        cmds.push(Cmd::Assert(AssertCmd {
            span,
            condition: Expr::exists(wildcard_bounds.clone(), conjunction),
            provenance: Some(AssertProvenance::CallRequires {
                callee: proc.name.clone(),
                clause: proc.span,
            }),
        }));
        // make the preconditions' content available to later reasoning over
        // the havoced inputs without re-proving it
        for req in proc.checked_requires() {
            cmds.push(Cmd::assume(span, req.condition.substitute(&subst)));
        }
    }

    // snapshot the frame for old() in the postcondition, before any havoc
    for global in &proc.modifies {
        let old_temp = names.fresh(&global.name, "old");
        old_subst.insert(global.name.clone(), Expr::var(old_temp.clone()));
        locals.push(LocalVar {
            name: old_temp.clone(),
            ty: global.ty.clone(),
            where_clause: None,
        });
        cmds.push(Cmd::simple_assign(
            span,
            old_temp,
            Expr::var(global.name.clone()),
        ));
    }

    // fresh temporaries for the outputs
    let mut couts: Vec<String> = Vec::new();
    for formal in &proc.out_params {
        let ty = formal.ty.substitute(&tsubst);
        let cout = names.fresh(&formal.name, "cout");
        subst.insert(formal.name.clone(), Expr::var(cout.clone()));
        let where_clause = formal.where_clause.as_ref().map(|w| w.substitute(&subst));
        locals.push(LocalVar {
            name: cout.clone(),
            ty,
            where_clause,
        });
        couts.push(cout);
    }

    // one combined havoc of the modified globals and the output temps
    let mut havoced: Vec<String> = proc.modifies.iter().map(|g| g.name.clone()).collect();
    havoced.extend(couts.iter().cloned());
    cmds.push(Cmd::havoc(span, havoced));

    // assume the postcondition in terms of the temporaries
    for ens in &proc.ensures {
        cmds.push(Cmd::assume(
            span,
            ens.condition.substitute_old(&subst, &old_subst),
        ));
    }

    // copy out the results the caller asked for
    for (formal, actual) in proc.out_params.iter().zip(&call.outs) {
        if let Some(target) = actual {
            let cout = subst
                .get(&formal.name)
                .cloned()
                .expect("out-formal temporary recorded");
            cmds.push(Cmd::Assign(AssignCmd {
                span,
                lhss: vec![target.clone()],
                rhss: vec![cout],
            }));
        }
    }

    StateCmd { span, locals, cmds }
}

fn compute_call_forall(call: &CallForallCmd) -> StateCmd {
    let proc = call
        .resolved()
        .expect("call forall desugared before resolution")
        .clone();
    let tsubst = call
        .type_instantiation()
        .expect("call forall desugared before type checking")
        .clone();
    assert_eq!(
        call.ins.len(),
        proc.in_params.len(),
        "input arity checked before desugaring"
    );
    assert!(
        proc.modifies.is_empty(),
        "call forall callee with a modifies clause passed type checking"
    );

    tracing::debug!(callee = %call.callee, "desugaring call forall");
    let span = call.span;

    let mut names = TempNames::new();
    let mut subst = ExprSubst::default();
    let mut wildcard_bounds: Vec<BoundVar> = Vec::new();

    // given inputs substitute directly; wildcards become bound variables
    for (formal, actual) in proc.in_params.iter().zip(&call.ins) {
        match actual {
            Some(expr) => {
                subst.insert(formal.name.clone(), expr.clone());
            }
            None => {
                let bound = names.fresh(&formal.name, "bound");
                subst.insert(formal.name.clone(), Expr::var(bound.clone()));
                wildcard_bounds.push(BoundVar {
                    name: bound,
                    ty: formal.ty.substitute(&tsubst),
                });
            }
        }
    }

    // every output becomes an existentially bound witness
    let mut out_bounds: Vec<BoundVar> = Vec::new();
    for formal in &proc.out_params {
        let bound = names.fresh(&formal.name, "bound");
        subst.insert(formal.name.clone(), Expr::var(bound.clone()));
        out_bounds.push(BoundVar {
            name: bound,
            ty: formal.ty.substitute(&tsubst),
        });
    }

    // with an empty frame, old(e) and e coincide
    let no_olds = ExprSubst::default();
    let pre = Expr::and_all(proc.checked_requires().map(|r| r.condition.substitute(&subst)));
    let post = Expr::and_all(
        proc.ensures
            .iter()
            .map(|e| e.condition.substitute_old(&subst, &no_olds)),
    );

    let axiom = Expr::forall(wildcard_bounds, Expr::imp(pre, Expr::exists(out_bounds, post)));
    StateCmd {
        span,
        locals: Vec::new(),
        cmds: vec![Cmd::assume(span, axiom)],
    }
}
