//! The structured statement tree and the flat block list it lowers to.
//!
//! A procedure body arrives from the parser as a tree of [`StmtList`]s:
//! ordered groups of [`BigBlock`]s, each an optionally labeled run of simple
//! commands terminated by at most one structured (`if`/`while`/`break`) or
//! transfer (`goto`/`return`) command. The analysis pass mutates the tree
//! exactly once (assigning labels, successors, and break targets); the
//! builder then reads it out into a flat, order-stable list of [`Block`]s
//! whose only control transfers are multi-target `goto` and `return`.
//!
//! All nodes live in arenas owned by [`Body`]; parent, successor, and break
//! links are plain ids.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::arena::Arena;
use crate::cmd::Cmd;
use crate::define_id;
use crate::expr::Expr;
use crate::span::Span;

define_id!(BigBlockId);
define_id!(StmtListId);

/// The terminating command of a big block. A big block carries at most one
/// of a structured or a transfer command; holding both behind one optional
/// enum makes the at-most-one invariant structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Structured(StructuredCmd),
    Transfer(TransferCmd),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructuredCmd {
    If(IfCmd),
    While(WhileCmd),
    Break(BreakCmd),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfCmd {
    pub span: Span,
    /// `None` is a nondeterministic branch: `if (*)`.
    pub guard: Option<Expr>,
    pub then: StmtListId,
    pub els: Option<ElseBranch>,
}

/// What follows an `if`'s then-branch: a chained `else if` or a final
/// `else` block. The two are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    If(Box<IfCmd>),
    Block(StmtListId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileCmd {
    pub span: Span,
    /// `None` is a nondeterministic loop: `while (*)`.
    pub guard: Option<Expr>,
    pub invariants: Vec<LoopInvariant>,
    pub body: StmtListId,
}

/// A loop invariant clause. Free invariants are assumed at the loop head;
/// checked ones are asserted there.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInvariant {
    pub span: Span,
    pub condition: Expr,
    pub is_free: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakCmd {
    pub span: Span,
    /// `None` breaks out of the nearest enclosing `while`.
    pub label: Option<String>,
    /// The big block the break exits past; resolved during legality
    /// analysis.
    pub target: Option<BigBlockId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferCmd {
    Goto(GotoCmd),
    Return { span: Span },
}

impl TransferCmd {
    pub fn goto(span: Span, label: impl Into<String>) -> TransferCmd {
        TransferCmd::Goto(GotoCmd {
            span,
            labels: vec![label.into()],
        })
    }

    /// Target labels, empty for `return`.
    pub fn targets(&self) -> &[String] {
        match self {
            TransferCmd::Goto(g) => &g.labels,
            TransferCmd::Return { .. } => &[],
        }
    }
}

/// Nondeterministic jump to one of the listed labels.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoCmd {
    pub span: Span,
    pub labels: Vec<String>,
}

/// One structured statement group: an optional label, a run of simple
/// commands, and at most one terminating command. With no terminator,
/// control falls through to the textual successor.
#[derive(Debug, Clone, PartialEq)]
pub struct BigBlock {
    pub span: Span,
    label: Option<String>,
    anonymous: bool,
    pub cmds: Vec<Cmd>,
    pub terminator: Option<Terminator>,
    /// The big block that follows this one in textual order; set during
    /// analysis, `None` at the end of the enclosing body.
    pub successor: Option<BigBlockId>,
}

impl BigBlock {
    fn new(span: Span, label: Option<String>, cmds: Vec<Cmd>, terminator: Option<Terminator>) -> Self {
        let anonymous = label.is_none();
        Self {
            span,
            label,
            anonymous,
            cmds,
            terminator,
            successor: None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The block's label after naming analysis.
    ///
    /// Panics when called on a block the analyzer has not named yet; the
    /// builder only runs on fully analyzed trees.
    pub fn name(&self) -> &str {
        self.label
            .as_deref()
            .expect("big block not named by analysis")
    }

    pub fn set_label(&mut self, name: String) {
        self.label = Some(name);
    }

    /// Whether the block had no user-written label. Anonymous blocks can
    /// never be the target of a `goto`, which is what makes prefix splicing
    /// into them sound; the flag survives the naming pass.
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// An ordered, non-empty sequence of big blocks: one compound-statement
/// body.
#[derive(Debug, Clone, PartialEq)]
pub struct StmtList {
    pub span: Span,
    pub blocks: Vec<BigBlockId>,
    /// Labels declared directly in this list (not in nested lists).
    pub labels: FxHashSet<String>,
    prefix_cmds: Option<Vec<Cmd>>,
    prefix_assigned: bool,
    /// Lexically enclosing statement list; `None` at the root.
    pub parent_list: Option<StmtListId>,
    /// The big block whose structured command contains this list; `None` at
    /// the root.
    pub parent_block: Option<BigBlockId>,
}

impl StmtList {
    /// Buffer commands to prepend to this list's first emitted block. The
    /// buffer is written at most once over the list's lifetime.
    pub fn set_prefix_cmds(&mut self, cmds: Vec<Cmd>) {
        assert!(
            !self.prefix_assigned,
            "statement list already carries prefix commands"
        );
        self.prefix_assigned = true;
        self.prefix_cmds = Some(cmds);
    }

    /// Consume the buffered prefix commands.
    pub fn take_prefix_cmds(&mut self) -> Option<Vec<Cmd>> {
        self.prefix_cmds.take()
    }

    pub fn has_prefix_cmds(&self) -> bool {
        self.prefix_cmds.is_some()
    }
}

/// One procedure body: the arenas owning every node of the structured tree,
/// plus the root statement list.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub big_blocks: Arena<BigBlockId, BigBlock>,
    pub stmt_lists: Arena<StmtListId, StmtList>,
    root: Option<StmtListId>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_big_block(
        &mut self,
        label: Option<String>,
        cmds: Vec<Cmd>,
        terminator: Option<Terminator>,
        span: Span,
    ) -> BigBlockId {
        self.big_blocks
            .push(BigBlock::new(span, label, cmds, terminator))
    }

    /// Create a statement list over the given blocks. An empty sequence is
    /// normalized to a single anonymous, empty big block, so lists are
    /// always non-empty.
    pub fn add_stmt_list(&mut self, mut blocks: Vec<BigBlockId>, span: Span) -> StmtListId {
        if blocks.is_empty() {
            blocks.push(self.add_big_block(None, Vec::new(), None, span));
        }
        let labels = blocks
            .iter()
            .filter_map(|&id| self.big_blocks[id].label().map(str::to_string))
            .collect();
        self.stmt_lists.push(StmtList {
            span,
            blocks,
            labels,
            prefix_cmds: None,
            prefix_assigned: false,
            parent_list: None,
            parent_block: None,
        })
    }

    pub fn set_root(&mut self, root: StmtListId) {
        self.root = Some(root);
    }

    /// The root statement list. Panics when the body was never finished
    /// with [`Body::set_root`].
    pub fn root(&self) -> StmtListId {
        self.root.expect("body has no root statement list")
    }

    /// The label of a statement list's first big block, once named.
    pub fn first_block_name(&self, list: StmtListId) -> &str {
        self.big_blocks[self.stmt_lists[list].blocks[0]].name()
    }
}

/// A flat basic block: a label, simple commands, and exactly one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub span: Span,
    pub label: String,
    pub cmds: Vec<Cmd>,
    pub transfer: TransferCmd,
}

/// The lowered form of a body: basic blocks in emission order. Order
/// carries no meaning beyond readability; all control flow is explicit in
/// the transfers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CfgBody {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    DuplicateLabel(String),
    DanglingGoto { from: String, target: String },
}

impl std::fmt::Display for CfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CfgError::DuplicateLabel(label) => {
                write!(f, "more than one block is named `{label}`")
            }
            CfgError::DanglingGoto { from, target } => {
                write!(f, "block `{from}` jumps to `{target}`, which does not exist")
            }
        }
    }
}

impl std::error::Error for CfgError {}

impl CfgBody {
    /// Map every label to its block index, verifying that labels are unique
    /// and that every `goto` targets an emitted block. A failure here on a
    /// legally analyzed body is an internal invariant violation, not a user
    /// error.
    pub fn resolve(&self) -> Result<FxHashMap<String, usize>, CfgError> {
        let mut by_label = FxHashMap::default();
        for (index, block) in self.blocks.iter().enumerate() {
            if by_label.insert(block.label.clone(), index).is_some() {
                return Err(CfgError::DuplicateLabel(block.label.clone()));
            }
        }
        for block in &self.blocks {
            for target in block.transfer.targets() {
                if !by_label.contains_key(target) {
                    return Err(CfgError::DanglingGoto {
                        from: block.label.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(by_label)
    }

    pub fn get(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }
}
