//! Top-level analysis orchestration.
//!
//! The analyzer owns the shared state (document, definitions, diagnostics,
//! route table), mounts plugins, loads the project and drives the walk:
//! files, then function declarations, then statements and expressions,
//! feeding every interesting node to the mounted plugins. Documentation
//! comments stack along the way and `@ignore` gates whole subtrees.

use crate::comment::Comment;
use crate::context::{Context, Shared};
use crate::custom_rules::CustomRules;
use crate::definitions::index_package_group;
use crate::diagnostics::Diagnostics;
use crate::environment::{Environment, Value};
use crate::loader::{PackageLoader, SourceFile};
use crate::plugins::{Node, Plugin};
use crate::schema::Document;
use anyhow::{bail, Result};
use log::{debug, info};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

pub struct Analyzer {
    plugins: Vec<Box<dyn Plugin>>,
    depends: Vec<String>,
    shared: Shared,
    global_env: Environment,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            depends: Vec::new(),
            shared: Shared::default(),
            global_env: Environment::new(),
        }
    }

    /// Registers a plugin and its framework method signatures.
    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        for (type_path, method, ret) in plugin.method_signatures() {
            self.shared
                .method_signatures
                .borrow_mut()
                .register(type_path, method, ret);
        }
        self.plugins.push(plugin);
        self
    }

    /// Whitelists dependency crates for definition indexing.
    pub fn depends(mut self, crates: Vec<String>) -> Self {
        self.depends.extend(crates);
        self
    }

    pub fn with_strict(self, strict: bool) -> Self {
        *self.shared.diagnostics.borrow_mut() = Diagnostics::new(strict);
        self
    }

    pub fn with_custom_rules(mut self, rules: CustomRules) -> Self {
        self.shared.custom_rules = Rc::new(rules);
        self
    }

    /// Passes the merged configuration to every plugin.
    pub fn mount(&mut self, config: &crate::config::Config) -> Result<()> {
        for plugin in &mut self.plugins {
            plugin.mount(config)?;
        }
        Ok(())
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    /// A clone of the document under construction.
    pub fn document(&self) -> Document {
        self.shared.doc.borrow().clone()
    }

    pub fn diagnostics(&self) -> Rc<RefCell<Diagnostics>> {
        self.shared.diagnostics.clone()
    }

    /// Loads the project and analyzes every owned package.
    pub fn process(&mut self, dir: &Path) -> Result<()> {
        if self.plugins.is_empty() {
            bail!("must register a plugin before processing");
        }

        let groups = PackageLoader::new(dir.to_path_buf()).load()?;
        for group in &groups {
            let definitions = index_package_group(group, &self.depends);
            info!("indexed {} definitions", definitions.len());
            *self.shared.definitions.borrow_mut() = definitions;

            for loaded in &group.packages {
                if !group.is_owned(&loaded.package) {
                    continue;
                }
                debug!("analyzing package {}", loaded.package.path);
                for file in &loaded.files {
                    let ctx = Context::new(
                        self.shared.clone(),
                        loaded.package.clone(),
                        file.clone(),
                        self.global_env.block(),
                    );
                    self.process_file(ctx, file);
                }
            }
        }
        info!(
            "analysis complete, {} APIs registered",
            self.shared.apis.borrow().len()
        );
        Ok(())
    }

    fn process_file(&self, mut ctx: Context, file: &Rc<SourceFile>) {
        let comment = Comment::parse_attrs(&file.ast.attrs);
        if comment.ignore() {
            debug!("file {} is ignored", file.path.display());
            return;
        }
        ctx.push_comment(comment);
        self.walk_items(&ctx, &file.ast.items);
    }

    fn walk_items(&self, ctx: &Context, items: &[syn::Item]) {
        for item in items {
            match item {
                syn::Item::Fn(item_fn) => {
                    self.fn_decl(ctx, &item_fn.attrs, &item_fn.block);
                }
                syn::Item::Impl(item_impl) => {
                    for impl_item in &item_impl.items {
                        if let syn::ImplItem::Fn(method) = impl_item {
                            self.fn_decl(ctx, &method.attrs, &method.block);
                        }
                    }
                }
                syn::Item::Mod(item_mod) => {
                    if let Some((_, mod_items)) = &item_mod.content {
                        let comment = Comment::parse_attrs(&item_mod.attrs);
                        if comment.ignore() {
                            continue;
                        }
                        let mut mod_ctx = ctx.block();
                        mod_ctx.push_comment(comment);
                        self.walk_items(&mod_ctx, mod_items);
                    }
                }
                _ => {}
            }
        }
    }

    fn fn_decl(&self, ctx: &Context, attrs: &[syn::Attribute], block: &syn::Block) {
        let comment = Comment::parse_attrs(attrs);
        if comment.ignore() {
            return;
        }
        let mut fn_ctx = ctx.block();
        fn_ctx.push_comment(comment);
        self.walk_block(&fn_ctx, block);
    }

    fn walk_block(&self, ctx: &Context, block: &syn::Block) {
        for stmt in &block.stmts {
            match stmt {
                syn::Stmt::Local(local) => {
                    self.analyze(ctx, &Node::Local(local));
                    self.define_local(ctx, local);
                    if let Some(init) = &local.init {
                        self.walk_expr(ctx, &init.expr);
                    }
                }
                syn::Stmt::Expr(expr, _) => self.walk_expr(ctx, expr),
                _ => {}
            }
        }
    }

    /// Types a `let` binding in the environment when no plugin bound it.
    fn define_local(&self, ctx: &Context, local: &syn::Local) {
        let name = match &local.pat {
            syn::Pat::Ident(ident) => ident.ident.to_string(),
            syn::Pat::Type(typed) => match &*typed.pat {
                syn::Pat::Ident(ident) => ident.ident.to_string(),
                _ => return,
            },
            _ => return,
        };
        if ctx.env.lookup(&name).is_some() {
            return;
        }
        let annotation = match &local.pat {
            syn::Pat::Type(typed) => ctx.resolve_type(&typed.ty),
            _ => None,
        };
        let inferred = annotation.or_else(|| {
            local
                .init
                .as_ref()
                .and_then(|init| ctx.type_of_expr(&init.expr))
        });
        if let Some(ty) = inferred {
            ctx.env.define(&name, Value::Variable(ty));
        }
    }

    fn walk_expr(&self, ctx: &Context, expr: &syn::Expr) {
        if let syn::Expr::Assign(assign) = expr {
            self.analyze(ctx, &Node::Assign(assign));
            self.walk_expr(ctx, &assign.right);
            return;
        }

        self.analyze(ctx, &Node::Expr(expr));

        match expr {
            syn::Expr::Block(block) => self.walk_block(&ctx.block(), &block.block),
            syn::Expr::If(expr_if) => {
                self.walk_expr(ctx, &expr_if.cond);
                self.walk_block(&ctx.block(), &expr_if.then_branch);
                if let Some((_, else_branch)) = &expr_if.else_branch {
                    self.walk_expr(ctx, else_branch);
                }
            }
            syn::Expr::Match(expr_match) => {
                self.walk_expr(ctx, &expr_match.expr);
                for arm in &expr_match.arms {
                    self.walk_expr(&ctx.block(), &arm.body);
                }
            }
            syn::Expr::While(expr_while) => {
                self.walk_expr(ctx, &expr_while.cond);
                self.walk_block(&ctx.block(), &expr_while.body);
            }
            syn::Expr::Loop(expr_loop) => self.walk_block(&ctx.block(), &expr_loop.body),
            syn::Expr::ForLoop(expr_for) => {
                self.walk_expr(ctx, &expr_for.expr);
                self.walk_block(&ctx.block(), &expr_for.body);
            }
            syn::Expr::Unsafe(expr_unsafe) => {
                self.walk_block(&ctx.block(), &expr_unsafe.block)
            }
            syn::Expr::Closure(closure) => self.walk_expr(&ctx.block(), &closure.body),
            syn::Expr::Async(expr_async) => self.walk_block(&ctx.block(), &expr_async.block),
            syn::Expr::MethodCall(call) => {
                self.walk_expr(ctx, &call.receiver);
                for arg in &call.args {
                    self.walk_expr(ctx, arg);
                }
            }
            syn::Expr::Call(call) => {
                for arg in &call.args {
                    self.walk_expr(ctx, arg);
                }
            }
            syn::Expr::Await(inner) => self.walk_expr(ctx, &inner.base),
            syn::Expr::Try(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Paren(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Group(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Reference(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Unary(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Cast(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Field(inner) => self.walk_expr(ctx, &inner.base),
            syn::Expr::Index(inner) => {
                self.walk_expr(ctx, &inner.expr);
                self.walk_expr(ctx, &inner.index);
            }
            syn::Expr::Return(inner) => {
                if let Some(value) = &inner.expr {
                    self.walk_expr(ctx, value);
                }
            }
            syn::Expr::Let(inner) => self.walk_expr(ctx, &inner.expr),
            syn::Expr::Binary(inner) => {
                self.walk_expr(ctx, &inner.left);
                self.walk_expr(ctx, &inner.right);
            }
            syn::Expr::Tuple(tuple) => {
                for elem in &tuple.elems {
                    self.walk_expr(ctx, elem);
                }
            }
            syn::Expr::Array(array) => {
                for elem in &array.elems {
                    self.walk_expr(ctx, elem);
                }
            }
            syn::Expr::Struct(expr_struct) => {
                for field in &expr_struct.fields {
                    self.walk_expr(ctx, &field.expr);
                }
            }
            _ => {}
        }
    }

    fn analyze(&self, ctx: &Context, node: &Node) {
        for plugin in &self.plugins {
            plugin.analyze(ctx, node);
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}
