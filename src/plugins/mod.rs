//! Framework plugins.
//!
//! Each plugin teaches the analyzer one web framework: which router types
//! and methods register routes, which context methods bind requests, read
//! parameters and emit responses. The analyzer feeds every interesting
//! node to every mounted plugin; the plugins match with [`CallRule`]s and
//! populate APIs.
//!
//! # Supported frameworks
//!
//! - **tide**: see [`tide::TidePlugin`]
//! - **salvo**: see [`salvo::SalvoPlugin`]

pub mod salvo;
pub mod tide;

use crate::config::Config;
use crate::context::Context;
use crate::rust_type::RustType;
use anyhow::Result;

/// A node the analyzer hands to plugins while walking function bodies.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// A `let` statement.
    Local(&'a syn::Local),
    /// A plain assignment expression.
    Assign(&'a syn::ExprAssign),
    /// Any other expression.
    Expr(&'a syn::Expr),
}

pub trait Plugin {
    fn name(&self) -> &str;

    /// Called once before analysis with the merged configuration.
    fn mount(&mut self, _config: &Config) -> Result<()> {
        Ok(())
    }

    /// Framework method return types used by receiver-type inference.
    fn method_signatures(&self) -> Vec<(&'static str, &'static str, RustType)> {
        Vec::new()
    }

    /// Inspects one node. Route registration and handler interpretation
    /// both start here.
    fn analyze(&self, ctx: &Context, node: &Node);
}

/// All built-in plugins.
pub fn registry() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(tide::TidePlugin::new()),
        Box::new(salvo::SalvoPlugin::new()),
    ]
}

/// Resolves the handler argument of a route registration: a bare path to
/// an indexed function, possibly wrapped in adapter calls whose first
/// argument is the real handler.
pub fn resolve_handler_key(ctx: &Context, expr: &syn::Expr) -> Option<String> {
    match crate::call_rule::unwrap_expr(expr) {
        syn::Expr::Path(path) => Some(ctx.resolve_path_name(&path.path)),
        syn::Expr::Call(call) => {
            let inner = call.args.first()?;
            resolve_handler_key(ctx, inner)
        }
        syn::Expr::MethodCall(call) => resolve_handler_key(ctx, &call.receiver),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_for, fixture};

    #[test]
    fn test_registry_names() {
        let names: Vec<String> = registry().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["tide".to_string(), "salvo".to_string()]);
    }

    #[test]
    fn test_resolve_handler_key_unwraps_wrappers() {
        let fx = fixture(&[(
            "src/shop.rs",
            "pub fn goods_info() {}\npub fn wrap<F>(f: F) -> F { f }\n",
        )]);
        let ctx = context_for(&fx, "server::shop");

        let bare: syn::Expr = syn::parse_str("goods_info").unwrap();
        assert_eq!(
            resolve_handler_key(&ctx, &bare).as_deref(),
            Some("server::shop::goods_info")
        );

        let wrapped: syn::Expr = syn::parse_str("wrap(goods_info)").unwrap();
        assert_eq!(
            resolve_handler_key(&ctx, &wrapped).as_deref(),
            Some("server::shop::goods_info")
        );
    }
}
