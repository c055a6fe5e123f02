//! Call-site pattern matching.
//!
//! A [`CallRule`] is a table of receiver types and the method names of
//! interest on each. The matcher unwraps an expression down to a method
//! call or an associated/free function call, infers the receiver's type
//! through the context, and invokes a callback per match. Plugins and the
//! custom-rule engine share this primitive instead of hand-rolling their
//! own pattern matching.

use crate::context::Context;

#[derive(Debug, Clone, Default)]
pub struct CallRule {
    rules: Vec<(String, Vec<String>)>,
}

impl CallRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a receiver type with its interesting methods.
    pub fn with_rule(mut self, type_path: &str, methods: &[&str]) -> Self {
        self.rules.push((
            type_path.to_string(),
            methods.iter().map(|m| m.to_string()).collect(),
        ));
        self
    }

    /// Whether `(type, method)` is covered by any rule. Types compare
    /// exactly or by path suffix, so a partially-resolved receiver still
    /// matches its fully-qualified rule.
    pub fn matches(&self, type_path: &str, method: &str) -> bool {
        self.rules.iter().any(|(rule_type, methods)| {
            type_matches(rule_type, type_path) && methods.iter().any(|m| m == method)
        })
    }
}

fn type_matches(rule_type: &str, type_path: &str) -> bool {
    rule_type == type_path
        || rule_type.ends_with(&format!("::{}", type_path))
        || type_path.ends_with(&format!("::{}", rule_type))
}

/// A matched call site: a method call or a path-call (free function,
/// associated function).
#[derive(Debug, Clone, Copy)]
pub enum CallSite<'e> {
    Method(&'e syn::ExprMethodCall),
    Func(&'e syn::ExprCall),
}

impl<'e> CallSite<'e> {
    pub fn args(&self) -> Vec<&'e syn::Expr> {
        match self {
            CallSite::Method(call) => call.args.iter().collect(),
            CallSite::Func(call) => call.args.iter().collect(),
        }
    }

    pub fn method_call(&self) -> Option<&'e syn::ExprMethodCall> {
        match self {
            CallSite::Method(call) => Some(call),
            CallSite::Func(_) => None,
        }
    }
}

/// Strips awaits, try operators, parentheses and references.
pub fn unwrap_expr(expr: &syn::Expr) -> &syn::Expr {
    match expr {
        syn::Expr::Await(inner) => unwrap_expr(&inner.base),
        syn::Expr::Try(inner) => unwrap_expr(&inner.expr),
        syn::Expr::Paren(inner) => unwrap_expr(&inner.expr),
        syn::Expr::Group(inner) => unwrap_expr(&inner.expr),
        syn::Expr::Reference(inner) => unwrap_expr(&inner.expr),
        _ => expr,
    }
}

/// Matches a single expression against a rule table. The callback receives
/// the call site, the resolved receiver type and the method name.
pub fn match_call<'e>(
    ctx: &Context,
    expr: &'e syn::Expr,
    rule: &CallRule,
    mut callback: impl FnMut(CallSite<'e>, &str, &str),
) {
    match unwrap_expr(expr) {
        syn::Expr::MethodCall(call) => {
            let method = call.method.to_string();
            let Some(receiver) = ctx.type_of_expr(&call.receiver) else {
                return;
            };
            if rule.matches(&receiver.path, &method) {
                callback(CallSite::Method(call), &receiver.path, &method);
            }
        }
        syn::Expr::Call(call) => {
            let syn::Expr::Path(func) = &*call.func else {
                return;
            };
            let resolved = ctx.resolve_path_name(&func.path);
            let Some((type_path, method)) = resolved.rsplit_once("::") else {
                return;
            };
            if rule.matches(type_path, method) {
                callback(CallSite::Func(call), type_path, method);
            }
        }
        _ => {}
    }
}
