//! veil-lower: the middle-end passes of the veil intermediate verification
//! language.
//!
//! Two independent jobs live here:
//!
//! - **Lowering** ([`lower_body`]): legality and naming analysis over a
//!   structured body, then flattening to labeled basic blocks whose only
//!   transfers are multi-target `goto` and `return`.
//! - **Call desugaring** ([`desugar`]): expanding a resolved procedure call
//!   into its modular contract semantics (assert preconditions, snapshot
//!   olds, havoc the frame and outputs, assume postconditions, copy
//!   results) without ever looking at the callee's body.
//!
//! Both report user errors into the shared [`Diagnostics`] sink; the
//! builder refuses to produce blocks when analysis reported anything.

pub mod analyzer;
pub mod builder;
pub mod check;
pub mod desugar;
pub mod proc_db;

use veil_ast::diagnostics::Diagnostics;
use veil_ast::structured::{Body, CfgBody};

/// Analyze and lower one procedure body.
///
/// Returns `None` when legality analysis reported errors; the sink then
/// holds the details, and downstream consumers are guaranteed never to see
/// a partially built graph.
pub fn lower_body(body: &mut Body, diags: &mut Diagnostics) -> Option<CfgBody> {
    let mut naming = analyzer::analyze(body, diags)?;
    let cfg = builder::build(body, &mut naming);
    tracing::info!(blocks = cfg.blocks.len(), "body lowered to control-flow graph");
    Some(cfg)
}
