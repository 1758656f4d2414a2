//! Structured-to-CFG lowering.
//!
//! Walks a fully analyzed tree and emits flat blocks whose only transfers
//! are multi-target `goto` and `return`. Loops and branches dispatch
//! through synthesized blocks:
//!
//! ```text
//! while (G) invariant I { B }      if (G) { T } else { E }
//!
//!   entry:    ...; goto LoopHead     pred:  ...; goto Then, Else
//!   LoopHead: assert I;              Then:  assume G;  goto <T first>
//!             goto LoopDone,         Else:  assume !G; goto <E first>
//!                  LoopBody
//!   LoopBody: assume G; goto <B first>
//!   LoopDone: assume !G; <after the loop>
//! ```
//!
//! Guard assumptions are spliced into a branch's first block instead of
//! getting a separate block whenever that first block is anonymous: nothing
//! can jump to an anonymous block, so prepending commands to it cannot
//! change the meaning of any other path. A loop body's last block falls
//! through to the loop head via the threaded run-off-the-end label, closing
//! the back edge.
//!
//! Must not run on a tree with unresolved legality errors; a break target
//! that was never set is an internal invariant violation here, not a user
//! error.

use veil_ast::cmd::{AssertCmd, AssertProvenance, AssumeCmd, Cmd};
use veil_ast::expr::Expr;
use veil_ast::span::Span;
use veil_ast::structured::{
    BigBlockId, Block, Body, CfgBody, ElseBranch, GotoCmd, IfCmd, LoopInvariant, StmtListId,
    StructuredCmd, Terminator, TransferCmd, WhileCmd,
};

use crate::analyzer::Naming;

/// Lower an analyzed body into its flat block list.
pub fn build(body: &mut Body, naming: &mut Naming) -> CfgBody {
    let root = body.root();
    let mut builder = Builder {
        body,
        naming,
        blocks: Vec::new(),
    };
    builder.create_blocks(root, None);
    let cfg = CfgBody {
        blocks: builder.blocks,
    };
    tracing::debug!(blocks = cfg.blocks.len(), "lowered structured body");
    cfg
}

struct Builder<'a> {
    body: &'a mut Body,
    naming: &'a mut Naming,
    blocks: Vec<Block>,
}

impl Builder<'_> {
    /// Emit the blocks for one statement list. With `run_off_end` set, the
    /// list's last block falls through to that label instead of its textual
    /// successor; loop bodies use this to return to their head.
    fn create_blocks(&mut self, list: StmtListId, run_off_end: Option<&str>) {
        let mut prefix_to_apply = self.body.stmt_lists[list].take_prefix_cmds();
        let block_ids = self.body.stmt_lists[list].blocks.clone();
        let total = block_ids.len();

        for (i, &bid) in block_ids.iter().enumerate() {
            let is_last = i + 1 == total;

            // the one-shot prefix lands on the first emitted block
            let mut cmds = prefix_to_apply.take().unwrap_or_default();
            cmds.extend(self.body.big_blocks[bid].cmds.iter().cloned());

            let label = self.body.big_blocks[bid].name().to_string();
            let span = self.body.big_blocks[bid].span;

            match self.body.big_blocks[bid].terminator.clone() {
                Some(Terminator::Transfer(tc)) => {
                    self.emit(span, label, cmds, tc);
                }
                None => {
                    let tr = self.continue_after(span, bid, is_last, run_off_end);
                    self.emit(span, label, cmds, tr);
                }
                Some(Terminator::Structured(StructuredCmd::Break(bc))) => {
                    let target = bc.target.expect("break target resolved during analysis");
                    let tr = self.goto_successor(bc.span, target);
                    self.emit(span, label, cmds, tr);
                }
                Some(Terminator::Structured(StructuredCmd::While(w))) => {
                    self.lower_while(bid, span, label, cmds, &w, is_last, run_off_end);
                }
                Some(Terminator::Structured(StructuredCmd::If(ifc))) => {
                    self.lower_if_chain(bid, span, label, cmds, ifc, is_last, run_off_end);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_while(
        &mut self,
        bid: BigBlockId,
        span: Span,
        entry_label: String,
        entry_cmds: Vec<Cmd>,
        w: &WhileCmd,
        is_last: bool,
        run_off_end: Option<&str>,
    ) {
        let (head_label, mut body_label, done_label) = self.naming.loop_labels();

        let mut ss_body = Vec::new();
        let mut ss_done = Vec::new();
        if let Some(guard) = &w.guard {
            ss_body.push(partition_assume(w.span, guard.clone()));
            ss_done.push(partition_assume(w.span, Expr::not(guard.clone())));
        }

        // squeeze the guard assumption into the body's first block if legal
        let body_spliced = self.prefix_first_block(w.body, &mut ss_body, &mut body_label);
        tracing::trace!(head = %head_label, spliced = body_spliced, "lowering while loop");

        // entry: ...; goto LoopHead
        self.emit(
            span,
            entry_label,
            entry_cmds,
            TransferCmd::goto(w.span, head_label.clone()),
        );

        // LoopHead: assert/assume invariants; goto LoopDone, LoopBody
        let head_cmds = w.invariants.iter().map(invariant_cmd).collect();
        self.emit(
            w.span,
            head_label.clone(),
            head_cmds,
            TransferCmd::Goto(GotoCmd {
                span: w.span,
                labels: vec![done_label.clone(), body_label.clone()],
            }),
        );

        if !body_spliced {
            // LoopBody: assume G; goto <first body block>
            let first = self.body.first_block_name(w.body).to_string();
            self.emit(w.span, body_label, ss_body, TransferCmd::goto(w.span, first));
        }

        self.create_blocks(w.body, Some(&head_label));

        // LoopDone: assume !G; continue after the loop
        let tr = self.continue_after(w.span, bid, is_last, run_off_end);
        self.emit(w.span, done_label, ss_done, tr);
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_if_chain(
        &mut self,
        bid: BigBlockId,
        span: Span,
        label: String,
        cmds: Vec<Cmd>,
        mut current: IfCmd,
        is_last: bool,
        run_off_end: Option<&str>,
    ) {
        let mut pred_label = label;
        let mut pred_cmds = cmds;
        loop {
            let (mut then_label, mut else_label) = self.naming.branch_labels();

            let mut ss_then = Vec::new();
            let mut ss_else = Vec::new();
            if let Some(guard) = &current.guard {
                ss_then.push(partition_assume(current.span, guard.clone()));
                ss_else.push(partition_assume(current.span, Expr::not(guard.clone())));
            }

            let then_spliced = self.prefix_first_block(current.then, &mut ss_then, &mut then_label);
            let else_spliced = match &current.els {
                Some(ElseBranch::Block(els)) => {
                    self.prefix_first_block(*els, &mut ss_else, &mut else_label)
                }
                _ => false,
            };

            // predicate block: ...; goto Then, Else
            self.emit(
                span,
                pred_label,
                pred_cmds,
                TransferCmd::Goto(GotoCmd {
                    span: current.span,
                    labels: vec![then_label.clone(), else_label.clone()],
                }),
            );

            if !then_spliced {
                let first = self.body.first_block_name(current.then).to_string();
                self.emit(
                    current.span,
                    then_label,
                    ss_then,
                    TransferCmd::goto(current.span, first),
                );
            }
            // the branch only inherits the run-off-the-end label when the
            // whole if is the last statement of the list being lowered
            let branch_run_off = if is_last { run_off_end } else { None };
            self.create_blocks(current.then, branch_run_off);

            match current.els {
                Some(ElseBranch::Block(els)) => {
                    if !else_spliced {
                        let first = self.body.first_block_name(els).to_string();
                        self.emit(
                            current.span,
                            else_label,
                            ss_else,
                            TransferCmd::goto(current.span, first),
                        );
                    }
                    self.create_blocks(els, branch_run_off);
                    return;
                }
                Some(ElseBranch::If(next)) => {
                    // the chained `else if` becomes the next predicate
                    // block, guarded by the negated test
                    pred_label = else_label;
                    pred_cmds = Vec::new();
                    if let Some(guard) = &current.guard {
                        pred_cmds.push(partition_assume(current.span, Expr::not(guard.clone())));
                    }
                    current = *next;
                }
                None => {
                    // no else branch: a trivial skip block
                    let tr = self.continue_after(current.span, bid, is_last, run_off_end);
                    self.emit(current.span, else_label, ss_else, tr);
                    return;
                }
            }
        }
    }

    /// Glue `cmds` onto the front of a statement list's first block, giving
    /// it `suggested` as its label. Succeeds when that block is anonymous
    /// (nothing can jump to it) or when there is nothing to glue, in which
    /// case `suggested` is redirected to the block's existing label. Fails
    /// on a user-labeled first block: some goto may target it directly, and
    /// jumps that bypass the guard must not execute the guard's assumption.
    fn prefix_first_block(
        &mut self,
        list: StmtListId,
        cmds: &mut Vec<Cmd>,
        suggested: &mut String,
    ) -> bool {
        let first = self.body.stmt_lists[list].blocks[0];
        if self.body.big_blocks[first].is_anonymous() {
            self.body.big_blocks[first].set_label(suggested.clone());
            let moved = std::mem::take(cmds);
            self.body.stmt_lists[list].set_prefix_cmds(moved);
            true
        } else if cmds.is_empty() {
            *suggested = self.body.big_blocks[first].name().to_string();
            true
        } else {
            false
        }
    }

    /// The transfer for control that continues past a statement: to the
    /// run-off-the-end label when this is the last statement under one, and
    /// otherwise to the textual successor (or out of the body entirely).
    fn continue_after(
        &self,
        span: Span,
        bid: BigBlockId,
        is_last: bool,
        run_off_end: Option<&str>,
    ) -> TransferCmd {
        match (is_last, run_off_end) {
            (true, Some(target)) => TransferCmd::goto(span, target),
            _ => self.goto_successor(span, bid),
        }
    }

    /// `goto` the block's textual successor, or `return` when it has none.
    fn goto_successor(&self, span: Span, bid: BigBlockId) -> TransferCmd {
        match self.body.big_blocks[bid].successor {
            Some(next) => TransferCmd::goto(span, self.body.big_blocks[next].name()),
            None => TransferCmd::Return { span },
        }
    }

    fn emit(&mut self, span: Span, label: String, cmds: Vec<Cmd>, transfer: TransferCmd) {
        self.blocks.push(Block {
            span,
            label,
            cmds,
            transfer,
        });
    }
}

fn partition_assume(span: Span, guard: Expr) -> Cmd {
    Cmd::Assume(AssumeCmd {
        span,
        condition: guard,
        partition: true,
    })
}

fn invariant_cmd(inv: &LoopInvariant) -> Cmd {
    if inv.is_free {
        Cmd::Assume(AssumeCmd {
            span: inv.span,
            condition: inv.condition.clone(),
            partition: false,
        })
    } else {
        Cmd::Assert(AssertCmd {
            span: inv.span,
            condition: inv.condition.clone(),
            provenance: Some(AssertProvenance::LoopInvariant { clause: inv.span }),
        })
    }
}
