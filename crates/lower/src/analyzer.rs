//! Legality and naming analysis over the structured tree.
//!
//! Three traversals, in order:
//!
//! 1. `link_and_check` — records each statement list's enclosing list and
//!    big block, validates every `goto` target against the lexical label
//!    scopes, and resolves every `break` to the big block it exits past.
//!    Errors accumulate in the sink and the walk keeps going.
//! 2. `name_anonymous_blocks` — gives every unlabeled big block a
//!    synthesized name built from a prefix no user label shares, so the
//!    names the builder later invents can never collide with anything.
//! 3. `record_successors` — threads each big block's textual successor, in
//!    reverse order per list; branch bodies inherit the successor of the
//!    whole compound statement, since falling off their end continues after
//!    it.
//!
//! The builder only runs when step 1 reported nothing; steps 2 and 3 never
//! report.

use rustc_hash::FxHashSet;
use veil_ast::diagnostics::{DiagnosticKind, Diagnostics};
use veil_ast::span::Span;
use veil_ast::structured::{
    BigBlockId, Body, ElseBranch, IfCmd, StmtListId, StructuredCmd, Terminator, TransferCmd,
};

/// The shared naming state: the collision-free prefix and the monotonic
/// counter, threaded from anonymous-block naming into block synthesis so
/// one body's synthesized names never repeat.
#[derive(Debug)]
pub struct Naming {
    prefix: String,
    next: usize,
}

impl Naming {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn bump(&mut self) -> usize {
        let n = self.next;
        self.next += 1;
        n
    }

    fn fresh_block_label(&mut self) -> String {
        let n = self.bump();
        format!("{}{}", self.prefix, n)
    }

    /// Labels for one synthesized loop: head, body, done.
    pub(crate) fn loop_labels(&mut self) -> (String, String, String) {
        let n = self.bump();
        (
            format!("{}{}_LoopHead", self.prefix, n),
            format!("{}{}_LoopBody", self.prefix, n),
            format!("{}{}_LoopDone", self.prefix, n),
        )
    }

    /// Labels for one link of an if/else-if chain: then, else.
    pub(crate) fn branch_labels(&mut self) -> (String, String) {
        let n = self.bump();
        (
            format!("{}{}_Then", self.prefix, n),
            format!("{}{}_Else", self.prefix, n),
        )
    }
}

/// Run the full analysis. Returns the naming state for the builder, or
/// `None` when legality errors were reported (in which case the tree must
/// not be lowered: break targets may be unset).
pub fn analyze(body: &mut Body, diags: &mut Diagnostics) -> Option<Naming> {
    let start_errors = diags.error_count();
    let root = body.root();

    let mut all_labels = FxHashSet::default();
    link_and_check(body, diags, &mut all_labels, root, None, None);

    let new_errors = diags.error_count() - start_errors;
    if new_errors > 0 {
        tracing::warn!(errors = new_errors, "legality analysis failed; body will not be lowered");
        return None;
    }

    let mut naming = Naming {
        prefix: choose_prefix(&all_labels),
        next: 0,
    };
    tracing::debug!(prefix = %naming.prefix, user_labels = all_labels.len(), "naming anonymous blocks");
    name_anonymous_blocks(body, &mut naming, root);
    record_successors(body, root, None);
    Some(naming)
}

/// Extend the default prefix until no user label anywhere in the body
/// starts with it. `prefix + counter + suffix` is then collision-free by
/// construction.
fn choose_prefix(labels: &FxHashSet<String>) -> String {
    let mut prefix = "anon".to_string();
    while labels.iter().any(|l| l.starts_with(&prefix)) {
        prefix.push('0');
    }
    prefix
}

/// The nested statement lists of a structured command, in textual order.
fn nested_lists(terminator: &Option<Terminator>) -> Vec<StmtListId> {
    let mut lists = Vec::new();
    if let Some(Terminator::Structured(sc)) = terminator {
        match sc {
            StructuredCmd::While(w) => lists.push(w.body),
            StructuredCmd::If(ifc) => collect_branches(ifc, &mut lists),
            StructuredCmd::Break(_) => {}
        }
    }
    lists
}

fn collect_branches(ifc: &IfCmd, out: &mut Vec<StmtListId>) {
    out.push(ifc.then);
    match &ifc.els {
        Some(ElseBranch::If(next)) => collect_branches(next, out),
        Some(ElseBranch::Block(els)) => out.push(*els),
        None => {}
    }
}

fn link_and_check(
    body: &mut Body,
    diags: &mut Diagnostics,
    all_labels: &mut FxHashSet<String>,
    list: StmtListId,
    parent_list: Option<StmtListId>,
    parent_block: Option<BigBlockId>,
) {
    {
        let stmt_list = &mut body.stmt_lists[list];
        stmt_list.parent_list = parent_list;
        stmt_list.parent_block = parent_block;
    }

    let block_ids = body.stmt_lists[list].blocks.clone();
    for bid in block_ids {
        if let Some(label) = body.big_blocks[bid].label() {
            all_labels.insert(label.to_string());
        }

        let mut goto_targets: Option<(Vec<String>, Span)> = None;
        let mut is_break = false;
        match &body.big_blocks[bid].terminator {
            Some(Terminator::Transfer(TransferCmd::Goto(g))) => {
                goto_targets = Some((g.labels.clone(), g.span));
            }
            Some(Terminator::Structured(StructuredCmd::Break(_))) => is_break = true,
            _ => {}
        }

        if let Some((labels, span)) = goto_targets {
            check_goto(body, diags, list, &labels, span);
        }
        if is_break {
            resolve_break(body, diags, list, bid);
        }

        for nested in nested_lists(&body.big_blocks[bid].terminator.clone()) {
            link_and_check(body, diags, all_labels, nested, Some(list), Some(bid));
        }
    }
}

/// A label is visible to a `goto` when some enclosing statement list
/// (including the current one) declares it directly. Forward references are
/// legal; references into nested or sibling scopes are not.
fn check_goto(
    body: &Body,
    diags: &mut Diagnostics,
    list: StmtListId,
    targets: &[String],
    span: Span,
) {
    for target in targets {
        let mut scope = Some(list);
        let mut found = false;
        while let Some(current) = scope {
            if body.stmt_lists[current].labels.contains(target) {
                found = true;
                break;
            }
            scope = body.stmt_lists[current].parent_list;
        }
        if !found {
            diags.report(
                DiagnosticKind::UndefinedOrOutOfReachLabel,
                span,
                format!("goto label `{target}` is undefined or out of reach"),
            );
        }
    }
}

/// Resolve a break to the big block it exits past, searching the enclosing
/// big blocks from the inside out.
///
/// An unlabeled break targets the nearest enclosing `while`. A labeled
/// break targets the first enclosing big block with that label, and that
/// first match ends the search even when it is invalid: a label on a block
/// with leading simple commands names the first of those commands, not the
/// compound statement, so breaking to it is an error rather than a reason
/// to keep looking outward.
fn resolve_break(body: &mut Body, diags: &mut Diagnostics, list: StmtListId, bid: BigBlockId) {
    let (label, span) = match &body.big_blocks[bid].terminator {
        Some(Terminator::Structured(StructuredCmd::Break(b))) => (b.label.clone(), b.span),
        _ => unreachable!("resolve_break called on a non-break block"),
    };

    let mut scope = list;
    let target = loop {
        let Some(enclosing) = body.stmt_lists[scope].parent_block else {
            match &label {
                Some(l) => diags.report(
                    DiagnosticKind::BreakLabelUndefined,
                    span,
                    format!("break label `{l}` is undefined"),
                ),
                None => diags.report(
                    DiagnosticKind::BreakOutsideLoop,
                    span,
                    "break statement is not inside a loop",
                ),
            }
            return;
        };

        let candidate = &body.big_blocks[enclosing];
        if let Some(l) = &label {
            if candidate.label() == Some(l.as_str()) {
                if !candidate.cmds.is_empty() {
                    diags.report(
                        DiagnosticKind::BreakTargetInvalid,
                        span,
                        format!("break label `{l}` must designate an enclosing statement"),
                    );
                    return;
                }
                break enclosing;
            }
        } else if matches!(
            candidate.terminator,
            Some(Terminator::Structured(StructuredCmd::While(_)))
        ) {
            break enclosing;
        }

        scope = body.stmt_lists[scope]
            .parent_list
            .expect("an enclosing big block implies an enclosing list");
    };

    if let Some(Terminator::Structured(StructuredCmd::Break(b))) =
        &mut body.big_blocks[bid].terminator
    {
        b.target = Some(target);
    }
}

fn name_anonymous_blocks(body: &mut Body, naming: &mut Naming, list: StmtListId) {
    let block_ids = body.stmt_lists[list].blocks.clone();
    for bid in block_ids {
        if body.big_blocks[bid].label().is_none() {
            let name = naming.fresh_block_label();
            body.big_blocks[bid].set_label(name);
        }
        for nested in nested_lists(&body.big_blocks[bid].terminator.clone()) {
            name_anonymous_blocks(body, naming, nested);
        }
    }
}

fn record_successors(body: &mut Body, list: StmtListId, after: Option<BigBlockId>) {
    let block_ids = body.stmt_lists[list].blocks.clone();
    let mut successor = after;
    for &bid in block_ids.iter().rev() {
        body.big_blocks[bid].successor = successor;
        for nested in nested_lists(&body.big_blocks[bid].terminator.clone()) {
            record_successors(body, nested, successor);
        }
        successor = Some(bid);
    }
}
