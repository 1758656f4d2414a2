//! Call resolution and the type checks that must precede desugaring.
//!
//! Everything here reports into the shared diagnostic sink and keeps going;
//! a call that fails any of these checks is never desugared. The checks are
//! deliberately shallow: expression typing belongs to the front end, and the
//! only type questions asked are the ones the desugaring engine depends on
//! (arity, the async handle type, an empty modifies frame for ghost calls).
//!
//! Generic callees must have their type-parameter instantiation supplied by
//! the front end's inference before type checking; for non-generic callees
//! the identity instantiation is installed here.

use rustc_hash::{FxHashMap, FxHashSet};
use veil_ast::cmd::{AssignCmd, CallCmd, CallForallCmd};
use veil_ast::diagnostics::{DiagnosticKind, Diagnostics};
use veil_ast::ty::{Type, TypeSubst};

use crate::proc_db::ProcedureDb;

/// Declared types of the variables visible at a call site. Supplied by the
/// resolution collaborator; only consulted for the async-handle check.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    types: FxHashMap<String, Type>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: Type) {
        self.types.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }
}

/// Bind a call to its callee's declaration. Returns false (and reports) when
/// the callee is not registered.
pub fn resolve_call(call: &mut CallCmd, db: &ProcedureDb, diags: &mut Diagnostics) -> bool {
    match db.get(&call.callee) {
        Some(proc) => {
            call.resolve(proc.clone());
            true
        }
        None => {
            diags.report(
                DiagnosticKind::UnresolvedCallee,
                call.span,
                format!("call to undeclared procedure `{}`", call.callee),
            );
            false
        }
    }
}

/// Bind a `call forall` to its callee's declaration.
pub fn resolve_call_forall(
    call: &mut CallForallCmd,
    db: &ProcedureDb,
    diags: &mut Diagnostics,
) -> bool {
    match db.get(&call.callee) {
        Some(proc) => {
            call.resolve(proc.clone());
            true
        }
        None => {
            diags.report(
                DiagnosticKind::UnresolvedCallee,
                call.span,
                format!("call forall to undeclared procedure `{}`", call.callee),
            );
            false
        }
    }
}

/// Check a resolved call's arity and async shape. On success, installs the
/// identity type instantiation for non-generic callees, making the call
/// ready for desugaring.
pub fn typecheck_call(call: &mut CallCmd, vars: &VarTable, diags: &mut Diagnostics) -> bool {
    let proc = call
        .resolved()
        .expect("call type-checked before resolution")
        .clone();
    let start_errors = diags.error_count();

    if call.ins.len() != proc.in_params.len() {
        diags.report(
            DiagnosticKind::ArityMismatch,
            call.span,
            format!(
                "call to `{}` has {} inputs, expected {}",
                call.callee,
                call.ins.len(),
                proc.in_params.len()
            ),
        );
    }
    if call.outs.len() != proc.out_params.len() {
        diags.report(
            DiagnosticKind::ArityMismatch,
            call.span,
            format!(
                "call to `{}` has {} outputs, expected {}",
                call.callee,
                call.outs.len(),
                proc.out_params.len()
            ),
        );
    }

    if call.is_async {
        check_async_outputs(call, vars, diags);
    }

    let ok = diags.error_count() == start_errors;
    if ok && !proc.is_generic() && call.type_instantiation().is_none() {
        call.set_type_instantiation(TypeSubst::default());
    }
    tracing::debug!(callee = %call.callee, ok, "type-checked call");
    ok
}

fn check_async_outputs(call: &CallCmd, vars: &VarTable, diags: &mut Diagnostics) {
    if call.outs.len() > 1 {
        diags.report(
            DiagnosticKind::AsyncArityOrTypeError,
            call.span,
            format!(
                "async call to `{}` has {} outputs, at most one is allowed",
                call.callee,
                call.outs.len()
            ),
        );
        return;
    }
    if let Some(Some(out)) = call.outs.first() {
        // the variable's declared type comes from the resolution
        // collaborator; an absent entry means the variable itself failed to
        // resolve, which is reported elsewhere
        if let Some(ty) = vars.get(out) {
            if *ty != Type::async_handle() {
                diags.report(
                    DiagnosticKind::AsyncArityOrTypeError,
                    call.span,
                    format!(
                        "output `{out}` of async call to `{}` must be an async handle",
                        call.callee
                    ),
                );
            }
        }
    }
}

/// Check a resolved `call forall`: input arity and the empty-modifies
/// requirement. On success, installs the identity instantiation for
/// non-generic callees.
pub fn typecheck_call_forall(call: &mut CallForallCmd, diags: &mut Diagnostics) -> bool {
    let proc = call
        .resolved()
        .expect("call forall type-checked before resolution")
        .clone();
    let start_errors = diags.error_count();

    if call.ins.len() != proc.in_params.len() {
        diags.report(
            DiagnosticKind::ArityMismatch,
            call.span,
            format!(
                "call forall to `{}` has {} inputs, expected {}",
                call.callee,
                call.ins.len(),
                proc.in_params.len()
            ),
        );
    }
    if !proc.modifies.is_empty() {
        diags.report(
            DiagnosticKind::ModifiesClauseViolation,
            call.span,
            format!(
                "call forall to `{}`, which modifies {}",
                call.callee,
                proc.modifies
                    .iter()
                    .map(|g| format!("`{}`", g.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }

    let ok = diags.error_count() == start_errors;
    if ok && !proc.is_generic() && call.type_instantiation().is_none() {
        call.set_type_instantiation(TypeSubst::default());
    }
    ok
}

/// Reject parallel assignments whose left-hand sides collide.
pub fn typecheck_assign(assign: &AssignCmd, diags: &mut Diagnostics) -> bool {
    let mut seen = FxHashSet::default();
    let mut ok = true;
    for lhs in &assign.lhss {
        if !seen.insert(lhs.as_str()) {
            diags.report(
                DiagnosticKind::DuplicateParallelAssignmentTarget,
                assign.span,
                format!("variable `{lhs}` is assigned more than once"),
            );
            ok = false;
        }
    }
    ok
}
