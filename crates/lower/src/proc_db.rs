//! Database of procedure declarations for call resolution.
//!
//! When a body contains `call x := p(e)`, resolution looks `p` up here and
//! binds the call to the declaration's signature and contract. This is what
//! makes call handling modular: each call site is expanded from the
//! callee's contract alone, never from its body.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use veil_ast::proc::Procedure;

/// Maps procedure names to their resolved declarations.
#[derive(Debug, Clone, Default)]
pub struct ProcedureDb {
    procs: FxHashMap<String, Rc<Procedure>>,
}

impl ProcedureDb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self {
            procs: FxHashMap::default(),
        }
    }

    /// Register a procedure declaration. Contract clauses are expected to be
    /// predicates; the front end checks this, and we guard it here in debug
    /// builds.
    pub fn insert(&mut self, proc: Procedure) {
        debug_assert!(
            proc.requires.iter().all(|r| r.condition.is_boolean())
                && proc.ensures.iter().all(|e| e.condition.is_boolean()),
            "contract clauses of `{}` must be boolean-valued",
            proc.name
        );
        self.procs.insert(proc.name.clone(), Rc::new(proc));
    }

    /// Look up a declaration by procedure name.
    pub fn get(&self, name: &str) -> Option<&Rc<Procedure>> {
        self.procs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}
