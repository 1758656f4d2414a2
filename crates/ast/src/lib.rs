//! veil-ast: the data language of the veil intermediate verification
//! language.
//!
//! This crate defines the structured statement tree a parser produces, the
//! flat basic-block form the lowering pass emits, the simple-command and
//! expression languages shared by both, procedure signatures with contracts,
//! and the accumulating diagnostic sink every pass reports into. The passes
//! themselves live in `veil-lower`.

pub mod arena;
pub mod cmd;
pub mod diagnostics;
pub mod expr;
pub mod proc;
pub mod span;
pub mod structured;
pub mod ty;
