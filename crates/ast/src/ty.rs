//! The fragment of the type language that signatures and temporaries need.
//!
//! The full expression type system lives in the front end; lowering and call
//! desugaring only instantiate declared types through a type-parameter
//! substitution and compare them structurally.

use rustc_hash::FxHashMap;

/// Substitution from type-parameter names to concrete types.
pub type TypeSubst = FxHashMap<String, Type>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int,
    /// Map type: argument types and result type.
    Map(Vec<Type>, Box<Type>),
    /// A declared type constructor, by name.
    Named(String),
    /// A type parameter, replaced during instantiation.
    Var(String),
}

impl Type {
    /// The declared type of an asynchronous call handle. An async call's
    /// single output, when present, must have exactly this type.
    pub fn async_handle() -> Type {
        Type::Named("async_handle".to_string())
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    /// Replace type parameters according to `subst`. Unbound parameters are
    /// left in place.
    pub fn substitute(&self, subst: &TypeSubst) -> Type {
        match self {
            Type::Bool | Type::Int | Type::Named(_) => self.clone(),
            Type::Map(args, result) => Type::Map(
                args.iter().map(|a| a.substitute(subst)).collect(),
                Box::new(result.substitute(subst)),
            ),
            Type::Var(name) => match subst.get(name) {
                Some(ty) => ty.clone(),
                None => self.clone(),
            },
        }
    }
}
