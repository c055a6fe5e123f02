//! Lexically-scoped symbol table.
//!
//! A parent-linked chain of maps. `define` writes to the innermost scope,
//! `assign` walks outward to the scope that owns the name (creating an
//! innermost binding when none does), `lookup` walks outward. Blocks fork a
//! child scope; values defined in an inner block are invisible outside it.

use crate::rust_type::RustType;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A value bound to an identifier during analysis.
#[derive(Debug, Clone)]
pub enum Value {
    /// A router group carrying a path prefix.
    RouteGroup(RouteGroup),
    /// A local whose static type was inferred.
    Variable(RustType),
    /// A router expression bound to a variable, walked when the variable is
    /// pushed into a parent router.
    Router(Box<syn::Expr>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGroup {
    pub prefix: String,
    /// Framework type of the bound variable, so call matching can treat
    /// the group as a typed receiver.
    pub receiver_type: String,
}

#[derive(Debug, Default)]
struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

/// Cheaply cloneable handle to a scope chain.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    scope: Rc<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forks a child scope. The parent remains visible for reads.
    pub fn block(&self) -> Self {
        Self {
            scope: Rc::new(Scope {
                vars: RefCell::new(HashMap::new()),
                parent: Some(self.scope.clone()),
            }),
        }
    }

    /// Binds a name in the innermost scope.
    pub fn define(&self, name: &str, value: Value) {
        self.scope.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Reassigns a name in the scope that owns it; defines it in the
    /// innermost scope when no enclosing scope does.
    pub fn assign(&self, name: &str, value: Value) {
        match self.resolve(name) {
            Some(owner) => owner.define(name, value),
            None => self.define(name, value),
        }
    }

    /// Walks outward for a binding.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(&self.scope);
        while let Some(current) = scope {
            if let Some(value) = current.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = current.parent.as_ref();
        }
        None
    }

    /// The environment owning a binding, if any.
    pub fn resolve(&self, name: &str) -> Option<Environment> {
        let mut scope = Some(self.scope.clone());
        while let Some(current) = scope {
            if current.vars.borrow().contains_key(name) {
                return Some(Environment { scope: current });
            }
            scope = current.parent.clone();
        }
        None
    }

    /// Convenience accessor for route-group bindings.
    pub fn route_group(&self, name: &str) -> Option<RouteGroup> {
        match self.lookup(name) {
            Some(Value::RouteGroup(group)) => Some(group),
            _ => None,
        }
    }

    /// Convenience accessor for typed locals.
    pub fn variable_type(&self, name: &str) -> Option<RustType> {
        match self.lookup(name) {
            Some(Value::Variable(ty)) => Some(ty),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(prefix: &str) -> Value {
        Value::RouteGroup(RouteGroup {
            prefix: prefix.to_string(),
            receiver_type: "tide::Route".to_string(),
        })
    }

    #[test]
    fn test_define_and_lookup() {
        let env = Environment::new();
        env.define("g", group("/api"));
        assert_eq!(env.route_group("g").unwrap().prefix, "/api");
        assert!(env.lookup("missing").is_none());
    }

    #[test]
    fn test_inner_scope_reads_outer() {
        let env = Environment::new();
        env.define("g", group("/api"));
        let inner = env.block();
        assert_eq!(inner.route_group("g").unwrap().prefix, "/api");
    }

    #[test]
    fn test_inner_definitions_invisible_outside() {
        let env = Environment::new();
        let inner = env.block();
        inner.define("v2", group("/api/v2"));
        assert!(env.lookup("v2").is_none());
        assert!(inner.lookup("v2").is_some());
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        let env = Environment::new();
        env.define("g", group("/api"));
        let inner = env.block();
        inner.define("g", group("/admin"));
        assert_eq!(inner.route_group("g").unwrap().prefix, "/admin");
        assert_eq!(env.route_group("g").unwrap().prefix, "/api");
    }

    #[test]
    fn test_assign_walks_to_owning_scope() {
        let env = Environment::new();
        env.define("g", group("/api"));
        let inner = env.block();
        inner.assign("g", group("/api/v2"));
        assert_eq!(env.route_group("g").unwrap().prefix, "/api/v2");
    }

    #[test]
    fn test_assign_without_owner_defines_innermost() {
        let env = Environment::new();
        let inner = env.block();
        inner.assign("fresh", group("/x"));
        assert!(inner.lookup("fresh").is_some());
        assert!(env.lookup("fresh").is_none());
    }

    #[test]
    fn test_variable_type_binding() {
        let env = Environment::new();
        env.define(
            "req",
            Value::Variable(crate::rust_type::RustType::new("tide::Request")),
        );
        assert_eq!(env.variable_type("req").unwrap().path, "tide::Request");
    }
}
