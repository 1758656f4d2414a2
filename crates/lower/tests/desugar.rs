//! End-to-end tests of modular call desugaring: register a callee, resolve
//! and type-check a call against it, and check the expanded command
//! sequence.

use veil_ast::cmd::{AssertProvenance, CallCmd, CallForallCmd, Cmd};
use veil_ast::diagnostics::Diagnostics;
use veil_ast::expr::{BinOp, BoundVar, Expr, QuantKind};
use veil_ast::proc::{Ensures, Formal, GlobalRef, Procedure, Requires};
use veil_ast::span::Span;
use veil_ast::ty::Type;
use veil_lower::check::{resolve_call, resolve_call_forall, typecheck_call, typecheck_call_forall, VarTable};
use veil_lower::desugar::{desugar_call, desugar_call_forall};
use veil_lower::proc_db::ProcedureDb;

fn sp() -> Span {
    Span::dummy()
}

fn gt(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(BinOp::Gt, Box::new(lhs), Box::new(rhs))
}

fn eq(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(BinOp::Eq, Box::new(lhs), Box::new(rhs))
}

fn add(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs))
}

fn requires(condition: Expr) -> Requires {
    Requires {
        span: sp(),
        condition,
        is_free: false,
    }
}

fn ensures(condition: Expr) -> Ensures {
    Ensures {
        span: sp(),
        condition,
        is_free: false,
    }
}

/// proc p(x: int) returns (y: int)
///   requires x > 0; modifies g; ensures y == x + old(g)
fn contract_proc() -> Procedure {
    let mut proc = Procedure::new("p");
    proc.in_params.push(Formal::new("x", Type::Int));
    proc.out_params.push(Formal::new("y", Type::Int));
    proc.requires.push(requires(gt(Expr::var("x"), Expr::int(0))));
    proc.modifies.push(GlobalRef::new("g", Type::Int));
    proc.ensures.push(ensures(eq(
        Expr::var("y"),
        add(Expr::var("x"), Expr::Old(Box::new(Expr::var("g")))),
    )));
    proc
}

fn checked_call(proc: Procedure, ins: Vec<Option<Expr>>, outs: Vec<Option<String>>) -> CallCmd {
    let mut db = ProcedureDb::new();
    db.insert(proc);
    let mut diags = Diagnostics::new();
    let mut call = CallCmd::new(sp(), "p", ins, outs);
    assert!(resolve_call(&mut call, &db, &mut diags));
    assert!(typecheck_call(&mut call, &VarTable::new(), &mut diags));
    call
}

#[test]
fn concrete_call_expands_in_contract_order() {
    let call = checked_call(
        contract_proc(),
        vec![Some(Expr::var("e"))],
        vec![Some("z".to_string())],
    );
    let state = desugar_call(&call);

    // temporaries: input copy, old snapshot, output
    let names: Vec<&str> = state.locals.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["x#cin0", "g#old1", "y#cout2"]);
    assert!(state.locals.iter().all(|l| l.ty == Type::Int));

    assert_eq!(state.cmds.len(), 6);

    // x#cin0 := e
    match &state.cmds[0] {
        Cmd::Assign(a) => {
            assert_eq!(a.lhss, vec!["x#cin0".to_string()]);
            assert_eq!(a.rhss, vec![Expr::var("e")]);
        }
        other => panic!("expected input copy, got {other:?}"),
    }

    // assert x#cin0 > 0, tagged with its origin
    match &state.cmds[1] {
        Cmd::Assert(a) => {
            assert_eq!(a.condition, gt(Expr::var("x#cin0"), Expr::int(0)));
            assert!(matches!(
                &a.provenance,
                Some(AssertProvenance::CallRequires { callee, .. }) if callee == "p"
            ));
        }
        other => panic!("expected precondition assert, got {other:?}"),
    }

    // g#old1 := g, before the havoc
    match &state.cmds[2] {
        Cmd::Assign(a) => {
            assert_eq!(a.lhss, vec!["g#old1".to_string()]);
            assert_eq!(a.rhss, vec![Expr::var("g")]);
        }
        other => panic!("expected old snapshot, got {other:?}"),
    }

    // havoc g, y#cout2 — one combined command
    match &state.cmds[3] {
        Cmd::Havoc(h) => {
            assert_eq!(h.vars, vec!["g".to_string(), "y#cout2".to_string()]);
        }
        other => panic!("expected combined havoc, got {other:?}"),
    }

    // assume y#cout2 == x#cin0 + g#old1 (old(g) rewritten to the snapshot)
    match &state.cmds[4] {
        Cmd::Assume(a) => {
            assert_eq!(
                a.condition,
                eq(
                    Expr::var("y#cout2"),
                    add(Expr::var("x#cin0"), Expr::var("g#old1"))
                )
            );
        }
        other => panic!("expected postcondition assume, got {other:?}"),
    }

    // z := y#cout2
    match &state.cmds[5] {
        Cmd::Assign(a) => {
            assert_eq!(a.lhss, vec!["z".to_string()]);
            assert_eq!(a.rhss, vec![Expr::var("y#cout2")]);
        }
        other => panic!("expected output copy, got {other:?}"),
    }
}

#[test]
fn wildcard_input_asserts_an_existential_and_assumes_the_preconditions() {
    let call = checked_call(contract_proc(), vec![None], vec![Some("z".to_string())]);
    let state = desugar_call(&call);

    assert_eq!(state.cmds.len(), 7);

    // havoc x#cin0
    match &state.cmds[0] {
        Cmd::Havoc(h) => assert_eq!(h.vars, vec!["x#cin0".to_string()]),
        other => panic!("expected input havoc, got {other:?}"),
    }

    // assert exists x#bound1 :: x#bound1 > 0
    match &state.cmds[1] {
        Cmd::Assert(a) => match &a.condition {
            Expr::Quant(QuantKind::Exists, vars, body) => {
                assert_eq!(
                    vars,
                    &vec![BoundVar {
                        name: "x#bound1".to_string(),
                        ty: Type::Int,
                    }]
                );
                assert_eq!(**body, gt(Expr::var("x#bound1"), Expr::int(0)));
            }
            other => panic!("expected existential, got {other:?}"),
        },
        other => panic!("expected existential assert, got {other:?}"),
    }

    // assume x#cin0 > 0: the precondition's content, available downstream
    match &state.cmds[2] {
        Cmd::Assume(a) => assert_eq!(a.condition, gt(Expr::var("x#cin0"), Expr::int(0))),
        other => panic!("expected precondition assume, got {other:?}"),
    }

    // the rest matches the concrete expansion
    assert!(matches!(&state.cmds[3], Cmd::Assign(_)));
    assert!(matches!(&state.cmds[4], Cmd::Havoc(_)));
    assert!(matches!(&state.cmds[5], Cmd::Assume(_)));
    assert!(matches!(&state.cmds[6], Cmd::Assign(_)));
}

#[test]
fn wildcard_output_is_discarded() {
    let call = checked_call(contract_proc(), vec![Some(Expr::var("e"))], vec![None]);
    let state = desugar_call(&call);
    // no output copy at the end
    assert_eq!(state.cmds.len(), 5);
    assert!(matches!(state.cmds.last(), Some(Cmd::Assume(_))));
    // but the output temp still exists and is havoced
    match &state.cmds[3] {
        Cmd::Havoc(h) => assert_eq!(h.vars, vec!["g".to_string(), "y#cout2".to_string()]),
        other => panic!("expected combined havoc, got {other:?}"),
    }
}

/// The command count follows the contract sizes exactly:
/// inputs + (existential or asserts) + (assumes when wildcarded) +
/// snapshots + 1 havoc + postconditions + output copies.
#[test]
fn command_count_matches_the_contract_shape() {
    let mut proc = Procedure::new("p");
    proc.in_params.push(Formal::new("a", Type::Int));
    proc.in_params.push(Formal::new("b", Type::Int));
    proc.out_params.push(Formal::new("r1", Type::Int));
    proc.out_params.push(Formal::new("r2", Type::Int));
    proc.requires.push(requires(Expr::var("A")));
    proc.requires.push(requires(Expr::var("B")));
    proc.modifies.push(GlobalRef::new("g", Type::Int));
    proc.modifies.push(GlobalRef::new("h", Type::Int));
    proc.ensures.push(ensures(Expr::var("E1")));
    proc.ensures.push(ensures(Expr::var("E2")));

    let call = checked_call(
        proc,
        vec![Some(Expr::var("e")), None],
        vec![Some("o1".to_string()), None],
    );
    let state = desugar_call(&call);

    // m0=2, wildcard present: 1 existential + p=2 assumes, q=2, 1 havoc,
    // r=2, k=1
    assert_eq!(state.cmds.len(), 2 + 1 + 2 + 2 + 1 + 2 + 1);

    let shape: Vec<&str> = state
        .cmds
        .iter()
        .map(|c| match c {
            Cmd::Assign(_) => "assign",
            Cmd::Assert(_) => "assert",
            Cmd::Assume(_) => "assume",
            Cmd::Havoc(_) => "havoc",
            other => panic!("unexpected command {other:?}"),
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            "assign", "havoc", // inputs
            "assert", // one existential over the wildcard
            "assume", "assume", // precondition contents
            "assign", "assign", // old snapshots
            "havoc",  // the combined havoc
            "assume", "assume", // postconditions
            "assign", // the one kept output
        ]
    );
}

#[test]
fn desugaring_is_memoized_per_call_site() {
    let call = checked_call(
        contract_proc(),
        vec![Some(Expr::var("e"))],
        vec![Some("z".to_string())],
    );
    assert!(call.desugaring_if_computed().is_none());
    let first = desugar_call(&call) as *const _;
    let second = desugar_call(&call) as *const _;
    assert_eq!(first, second);
    assert!(call.desugaring_if_computed().is_some());
}

#[test]
fn free_preconditions_impose_no_call_site_obligation() {
    let mut proc = contract_proc();
    proc.requires[0].is_free = true;
    let call = checked_call(proc, vec![Some(Expr::var("e"))], vec![Some("z".to_string())]);
    let state = desugar_call(&call);
    assert!(state.cmds.iter().all(|c| !matches!(c, Cmd::Assert(_))));
}

#[test]
fn where_clauses_follow_the_temporaries() {
    let mut proc = Procedure::new("p");
    proc.in_params
        .push(Formal::new("x", Type::Int).with_where(gt(Expr::var("x"), Expr::int(0))));
    proc.out_params
        .push(Formal::new("y", Type::Int).with_where(gt(Expr::var("y"), Expr::var("x"))));

    let call = checked_call(proc, vec![Some(Expr::var("e"))], vec![Some("z".to_string())]);
    let state = desugar_call(&call);

    assert_eq!(
        state.locals[0].where_clause,
        Some(gt(Expr::var("x#cin0"), Expr::int(0)))
    );
    // the out-formal's clause sees both its own temp and the input's
    assert_eq!(
        state.locals[1].where_clause,
        Some(gt(Expr::var("y#cout1"), Expr::var("x#cin0")))
    );
}

#[test]
fn type_parameters_instantiate_the_temporaries() {
    let mut proc = Procedure::new("p");
    proc.type_params.push("T".to_string());
    proc.in_params.push(Formal::new("x", Type::Var("T".to_string())));
    proc.out_params.push(Formal::new("y", Type::Var("T".to_string())));

    let mut db = ProcedureDb::new();
    db.insert(proc);
    let mut diags = Diagnostics::new();
    let mut call = CallCmd::new(
        sp(),
        "p",
        vec![Some(Expr::var("e"))],
        vec![Some("z".to_string())],
    );
    assert!(resolve_call(&mut call, &db, &mut diags));
    // the inference collaborator supplies the instantiation for generics
    call.set_type_instantiation([("T".to_string(), Type::Bool)].into_iter().collect());
    assert!(typecheck_call(&mut call, &VarTable::new(), &mut diags));

    let state = desugar_call(&call);
    assert!(state.locals.iter().all(|l| l.ty == Type::Bool));
}

#[test]
#[should_panic(expected = "desugared before resolution")]
fn desugaring_before_resolution_is_an_internal_error() {
    let call = CallCmd::new(sp(), "p", vec![], vec![]);
    desugar_call(&call);
}

// ====== call forall ======

fn checked_forall(proc: Procedure, ins: Vec<Option<Expr>>) -> CallForallCmd {
    let mut db = ProcedureDb::new();
    db.insert(proc);
    let mut diags = Diagnostics::new();
    let mut call = CallForallCmd::new(sp(), "p", ins);
    assert!(resolve_call_forall(&mut call, &db, &mut diags));
    assert!(typecheck_call_forall(&mut call, &mut diags));
    call
}

#[test]
fn call_forall_injects_one_axiom_and_nothing_else() {
    let mut proc = Procedure::new("p");
    proc.in_params.push(Formal::new("x", Type::Int));
    proc.requires.push(requires(gt(Expr::var("x"), Expr::int(0))));
    proc.ensures
        .push(ensures(gt(Expr::FnApp("f".to_string(), vec![Expr::var("x")]), Expr::int(0))));

    let call = checked_forall(proc, vec![None]);
    let state = desugar_call_forall(&call);

    assert!(state.locals.is_empty());
    assert_eq!(state.cmds.len(), 1);
    match &state.cmds[0] {
        Cmd::Assume(a) => match &a.condition {
            Expr::Quant(QuantKind::Forall, vars, body) => {
                assert_eq!(vars.len(), 1);
                assert_eq!(vars[0].name, "x#bound0");
                assert_eq!(
                    **body,
                    Expr::imp(
                        gt(Expr::var("x#bound0"), Expr::int(0)),
                        gt(
                            Expr::FnApp("f".to_string(), vec![Expr::var("x#bound0")]),
                            Expr::int(0)
                        ),
                    )
                );
            }
            other => panic!("expected universal axiom, got {other:?}"),
        },
        other => panic!("expected assume, got {other:?}"),
    }
}

#[test]
fn call_forall_outputs_become_existential_witnesses() {
    let mut proc = Procedure::new("p");
    proc.in_params.push(Formal::new("x", Type::Int));
    proc.out_params.push(Formal::new("y", Type::Int));
    proc.ensures.push(ensures(gt(Expr::var("y"), Expr::var("x"))));

    let call = checked_forall(proc, vec![None]);
    let state = desugar_call_forall(&call);

    match &state.cmds[0] {
        Cmd::Assume(a) => match &a.condition {
            Expr::Quant(QuantKind::Forall, ins, body) => {
                assert_eq!(ins[0].name, "x#bound0");
                // true ==> exists y#bound1 :: y#bound1 > x#bound0
                match &**body {
                    Expr::Binary(BinOp::Imp, pre, post) => {
                        assert_eq!(**pre, Expr::bool(true));
                        match &**post {
                            Expr::Quant(QuantKind::Exists, outs, inner) => {
                                assert_eq!(outs[0].name, "y#bound1");
                                assert_eq!(
                                    **inner,
                                    gt(Expr::var("y#bound1"), Expr::var("x#bound0"))
                                );
                            }
                            other => panic!("expected existential, got {other:?}"),
                        }
                    }
                    other => panic!("expected implication, got {other:?}"),
                }
            }
            other => panic!("expected universal axiom, got {other:?}"),
        },
        other => panic!("expected assume, got {other:?}"),
    }
}

#[test]
fn call_forall_without_wildcards_drops_the_universal() {
    let mut proc = Procedure::new("p");
    proc.in_params.push(Formal::new("x", Type::Int));
    proc.out_params.push(Formal::new("y", Type::Int));
    proc.ensures.push(ensures(gt(Expr::var("y"), Expr::var("x"))));

    let call = checked_forall(proc, vec![Some(Expr::var("e"))]);
    let state = desugar_call_forall(&call);

    match &state.cmds[0] {
        Cmd::Assume(a) => match &a.condition {
            // true ==> exists y#bound0 :: y#bound0 > e
            Expr::Binary(BinOp::Imp, pre, post) => {
                assert_eq!(**pre, Expr::bool(true));
                match &**post {
                    Expr::Quant(QuantKind::Exists, outs, inner) => {
                        assert_eq!(outs[0].name, "y#bound0");
                        assert_eq!(**inner, gt(Expr::var("y#bound0"), Expr::var("e")));
                    }
                    other => panic!("expected existential, got {other:?}"),
                }
            }
            other => panic!("expected bare implication, got {other:?}"),
        },
        other => panic!("expected assume, got {other:?}"),
    }
}

#[test]
fn call_forall_never_assigns_program_variables() {
    let mut proc = Procedure::new("p");
    proc.in_params.push(Formal::new("x", Type::Int));
    proc.ensures.push(ensures(gt(Expr::var("x"), Expr::int(0))));

    let call = checked_forall(proc, vec![None]);
    let state = desugar_call_forall(&call);

    assert!(state
        .cmds
        .iter()
        .all(|c| !matches!(c, Cmd::Assign(_) | Cmd::Havoc(_))));
    assert_eq!(
        state
            .cmds
            .iter()
            .filter(|c| matches!(c, Cmd::Assume(_)))
            .count(),
        1
    );
}
