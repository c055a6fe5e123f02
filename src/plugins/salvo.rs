//! salvo plugin.
//!
//! Routers are values built by `Router::with_path(..)` chains and mounted
//! with `.push(..)`; the plugin walks those trees recursively, joining
//! path segments top-down and resolving router variables through the
//! environment. Handler analysis covers the `Request` binding methods
//! (`parse_json`, `parse_form`, `parse_queries`, `parse_params`), the
//! single-value accessors (`form`, `query`, `param`, `file`) which
//! accumulate parameters or a multipart form schema, and responses
//! emitted through `Response::render` and `status_code`.

use crate::api::{join_path, Api};
use crate::call_rule::{match_call, unwrap_expr, CallRule, CallSite};
use crate::comment::Comment;
use crate::context::Context;
use crate::definitions::FuncDefinition;
use crate::diagnostics::DiagnosticKind;
use crate::environment::Value;
use crate::param_parser::{path_name_parser, query_name_parser, ParamParser};
use crate::plugins::{resolve_handler_key, Node, Plugin};
use crate::rust_type::RustType;
use crate::schema::{
    MediaType, Parameter, RequestBody, Response, Schema, MIME_FORM_DATA, MIME_FORM_URLENCODED,
    MIME_JSON, MIME_TEXT_PLAIN,
};
use crate::schema_builder::SchemaBuilder;
use log::debug;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use syn::visit::Visit;

const REQUEST_TYPE: &str = "salvo::Request";
const RESPONSE_TYPE: &str = "salvo::Response";

const ROUTE_VERBS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

const REQUEST_METHODS: &[&str] = &[
    "parse_json",
    "parse_body",
    "parse_form",
    "parse_queries",
    "parse_params",
    "form",
    "query",
    "param",
    "file",
];

pub struct SalvoPlugin {
    /// Expressions already consumed as part of a larger router tree or
    /// deferred to a mount point; keyed by node address.
    visited: RefCell<HashSet<usize>>,
}

impl SalvoPlugin {
    pub fn new() -> Self {
        Self {
            visited: RefCell::new(HashSet::new()),
        }
    }
}

impl Plugin for SalvoPlugin {
    fn name(&self) -> &str {
        "salvo"
    }

    fn method_signatures(&self) -> Vec<(&'static str, &'static str, RustType)> {
        vec![
            (REQUEST_TYPE, "form", RustType::new("$T0")),
            (REQUEST_TYPE, "query", RustType::new("$T0")),
            (REQUEST_TYPE, "param", RustType::new("$T0")),
            (RESPONSE_TYPE, "status_code", RustType::new(RESPONSE_TYPE)),
        ]
    }

    fn analyze(&self, ctx: &Context, node: &Node) {
        match node {
            Node::Local(local) => self.local(ctx, local),
            Node::Assign(_) => {}
            Node::Expr(expr) => self.expr(ctx, expr),
        }
    }
}

impl SalvoPlugin {
    /// `let goods = Router::with_path("goods")...` binds the router
    /// expression; routes register when the variable is mounted.
    fn local(&self, ctx: &Context, local: &syn::Local) {
        let Some(init) = &local.init else { return };
        let expr = unwrap_expr(&init.expr);
        if !is_router_chain(ctx, expr) {
            return;
        }
        let Some(name) = pat_ident(&local.pat) else { return };
        self.mark_subtree(&init.expr);
        ctx.env
            .define(&name, Value::Router(Box::new((*init.expr).clone())));
    }

    /// Statement-level router chains and `Service::new(..)` arguments are
    /// walk roots.
    fn expr(&self, ctx: &Context, expr: &syn::Expr) {
        if self.visited.borrow().contains(&expr_key(expr)) {
            return;
        }
        let inner = unwrap_expr(expr);

        if let syn::Expr::Call(call) = inner {
            if let syn::Expr::Path(func) = &*call.func {
                if ctx.resolve_path_name(&func.path).ends_with("Service::new") {
                    if let Some(router) = call.args.first() {
                        self.mark_subtree(expr);
                        self.walk_router(ctx, router, "");
                    }
                    return;
                }
            }
        }

        if is_router_chain(ctx, inner) {
            self.mark_subtree(expr);
            self.walk_router(ctx, inner, "");
        }
    }

    /// Recursively walks a router expression, accumulating the path
    /// prefix and registering every verb handler found.
    fn walk_router(&self, ctx: &Context, expr: &syn::Expr, prefix: &str) {
        let expr = unwrap_expr(expr);

        // Router variables resolve to their stored expressions.
        if let syn::Expr::Path(path) = expr {
            if let Some(ident) = path.path.get_ident() {
                match ctx.env.lookup(&ident.to_string()) {
                    Some(Value::Router(stored)) => {
                        self.walk_router(ctx, &stored, prefix);
                    }
                    _ => debug!("router variable {} is not bound", ident),
                }
                return;
            }
        }

        // Collect chain links root-first.
        let mut links: Vec<&syn::ExprMethodCall> = Vec::new();
        let mut current = expr;
        while let syn::Expr::MethodCall(call) = current {
            links.push(call);
            current = unwrap_expr(&call.receiver);
        }
        links.reverse();

        let mut current_prefix = prefix.to_string();
        match current {
            syn::Expr::Call(call) => {
                let syn::Expr::Path(func) = &*call.func else {
                    return;
                };
                let resolved = ctx.resolve_path_name(&func.path);
                if resolved.ends_with("Router::with_path") {
                    if let Some(path) = call.args.first().and_then(string_literal) {
                        current_prefix = join_path(&current_prefix, &normalize_path(&path));
                    }
                } else if !resolved.ends_with("Router::new") {
                    return;
                }
            }
            syn::Expr::Path(_) => {}
            _ => return,
        }

        for link in links {
            let method = link.method.to_string();
            if method == "path" {
                if let Some(path) = link.args.first().and_then(string_literal) {
                    current_prefix = join_path(&current_prefix, &normalize_path(&path));
                }
            } else if method == "push" {
                if let Some(child) = link.args.first() {
                    self.walk_router(ctx, child, &current_prefix);
                }
            } else if ROUTE_VERBS.contains(&method.as_str()) {
                if let Some(handler) = link.args.first() {
                    self.parse_api(ctx, handler, &method, &current_prefix);
                }
            }
        }
    }

    fn parse_api(&self, ctx: &Context, handler_expr: &syn::Expr, method: &str, path: &str) {
        let Some(handler_key) = resolve_handler_key(ctx, handler_expr) else {
            ctx.report(
                DiagnosticKind::Analysis,
                format!("cannot resolve handler for {} {}", method, path),
            );
            return;
        };
        let Some(def) = ctx.func_definition(&handler_key) else {
            ctx.report(
                DiagnosticKind::Analysis,
                format!("handler function {} not found", handler_key),
            );
            return;
        };

        let handler_comment = Comment::parse_attrs(&def.attrs);
        if handler_comment.ignore() {
            return;
        }

        let full_path = join_path("", path);
        let mut api = Api::new(method, &full_path);
        let mut stack = ctx.comments().to_vec();
        stack.push(Rc::new(handler_comment));
        api.load_from_comments(&stack);
        if api.spec.operation_id.is_none() {
            let pkg_name = def.module_path.rsplit("::").next().unwrap_or("handler");
            api.spec.operation_id = Some(format!("{}.{}", pkg_name, def.name));
        }

        let handler_ctx = ctx
            .new_env()
            .with_package(def.pkg.clone())
            .with_file(def.file.clone());
        SalvoHandlerAnalyzer::new(handler_ctx, &mut api).parse(&def);

        ctx.add_api(api);
    }

    fn mark_subtree(&self, expr: &syn::Expr) {
        let mut set = self.visited.borrow_mut();
        let mut marker = SubtreeMarker { set: &mut set };
        marker.visit_expr(expr);
    }
}

struct SubtreeMarker<'s> {
    set: &'s mut HashSet<usize>,
}

impl<'ast> Visit<'ast> for SubtreeMarker<'_> {
    fn visit_expr(&mut self, expr: &'ast syn::Expr) {
        self.set.insert(expr_key(expr));
        syn::visit::visit_expr(self, expr);
    }
}

fn expr_key(expr: &syn::Expr) -> usize {
    expr as *const syn::Expr as usize
}

fn pat_ident(pat: &syn::Pat) -> Option<String> {
    match pat {
        syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
        syn::Pat::Type(typed) => pat_ident(&typed.pat),
        _ => None,
    }
}

fn string_literal(expr: &syn::Expr) -> Option<String> {
    match unwrap_expr(expr) {
        syn::Expr::Lit(lit) => match &lit.lit {
            syn::Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        _ => None,
    }
}

/// A string literal possibly wrapped in `.to_string()`, `.to_owned()`,
/// `.into()` or `String::from(..)`.
fn default_literal(expr: &syn::Expr) -> Option<String> {
    match unwrap_expr(expr) {
        syn::Expr::Lit(lit) => match &lit.lit {
            syn::Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        syn::Expr::MethodCall(call)
            if matches!(call.method.to_string().as_str(), "to_string" | "to_owned" | "into") =>
        {
            default_literal(&call.receiver)
        }
        syn::Expr::Call(call) => {
            let syn::Expr::Path(func) = &*call.func else {
                return None;
            };
            let is_from = func
                .path
                .segments
                .last()
                .map(|s| s.ident == "from")
                .unwrap_or(false);
            if is_from {
                call.args.first().and_then(default_literal)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Component key for an accumulated form request schema, derived from the
/// operation id: `shop.goods_down` becomes `ShopGoodsDownRequest`.
fn form_request_key(operation_id: &str) -> String {
    let mut out = String::new();
    let mut upper_next = true;
    for ch in operation_id.chars() {
        if ch.is_ascii_alphanumeric() {
            if upper_next {
                out.extend(ch.to_uppercase());
                upper_next = false;
            } else {
                out.push(ch);
            }
        } else {
            upper_next = true;
        }
    }
    out.push_str("Request");
    out
}

/// Whether an expression is (or ends in) a `Router::new`/`Router::with_path`
/// chain.
fn is_router_chain(ctx: &Context, expr: &syn::Expr) -> bool {
    let mut current = unwrap_expr(expr);
    while let syn::Expr::MethodCall(call) = current {
        current = unwrap_expr(&call.receiver);
    }
    let syn::Expr::Call(call) = current else {
        return false;
    };
    let syn::Expr::Path(func) = &*call.func else {
        return false;
    };
    let resolved = ctx.resolve_path_name(&func.path);
    resolved.ends_with("Router::new") || resolved.ends_with("Router::with_path")
}

/// Rewrites `<name>`, `<name:regex>` and `<**rest>` segments to `{name}`.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let trimmed = segment
                .strip_prefix('<')
                .and_then(|s| s.strip_suffix('>'));
            match trimmed {
                Some(inner) => {
                    let name = inner.trim_start_matches('*');
                    let name = name.split(':').next().unwrap_or(name);
                    format!("{{{}}}", name)
                }
                None => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

struct SalvoHandlerAnalyzer<'a> {
    ctx: Context,
    api: &'a mut Api,
    /// Status set by a previous `status_code` call, consumed by `render`.
    status: Option<u16>,
    /// Accessor calls already handled through an `unwrap_or` wrapper.
    handled: HashSet<usize>,
}

impl<'a> SalvoHandlerAnalyzer<'a> {
    fn new(ctx: Context, api: &'a mut Api) -> Self {
        Self {
            ctx,
            api,
            status: None,
            handled: HashSet::new(),
        }
    }

    fn parse(&mut self, def: &FuncDefinition) {
        for input in &def.sig.inputs {
            let syn::FnArg::Typed(pat_type) = input else {
                continue;
            };
            let Some(name) = pat_ident(&pat_type.pat) else {
                continue;
            };
            if let Some(ty) = self.ctx.resolve_type(&pat_type.ty) {
                self.ctx.env.define(&name, Value::Variable(ty));
            }
        }
        self.visit_block(&def.block);
    }

    fn request_rule(&self) -> CallRule {
        CallRule::new().with_rule(REQUEST_TYPE, REQUEST_METHODS)
    }

    /// Dispatches a matched `Request` accessor.
    fn handle_request_method(
        &mut self,
        call: &syn::ExprMethodCall,
        method: &str,
        default: Option<serde_json::Value>,
    ) {
        match method {
            "parse_json" => self.parse_binding(call, MIME_JSON),
            "parse_body" => {
                let content_type = self.api.default_request_content_type();
                self.parse_binding(call, &content_type);
            }
            "parse_form" => self.parse_binding(call, MIME_FORM_URLENCODED),
            "parse_queries" => {
                if let Some(target) = self.ctx.turbofish_type(call) {
                    let params =
                        ParamParser::new(&self.ctx, &query_name_parser).parse(&target);
                    for param in params {
                        self.api.add_parameter(param);
                    }
                }
            }
            "parse_params" => {
                if let Some(target) = self.ctx.turbofish_type(call) {
                    let params =
                        ParamParser::new(&self.ctx, &path_name_parser).parse(&target);
                    for param in params {
                        self.api.add_parameter(param);
                    }
                }
            }
            "form" => {
                let Some(name) = call.args.first().and_then(string_literal) else {
                    return;
                };
                let schema = self.accessor_schema(call);
                self.form_property(&name, schema, default);
            }
            "file" => {
                let Some(name) = call.args.first().and_then(string_literal) else {
                    return;
                };
                let mut schema = Schema::new_string();
                schema.format = "binary".to_string();
                self.form_property(&name, schema, None);
            }
            "query" => {
                let Some(name) = call.args.first().and_then(string_literal) else {
                    return;
                };
                let mut schema = self.accessor_schema(call);
                schema.default = default;
                self.api
                    .add_parameter(Parameter::query(&name).with_schema(schema));
            }
            "param" => {
                let Some(name) = call.args.first().and_then(string_literal) else {
                    return;
                };
                let schema = self.accessor_schema(call);
                self.api
                    .add_parameter(Parameter::path(&name).with_schema(schema));
            }
            _ => {}
        }
    }

    /// Schema of a single-value accessor from its turbofish; strings when
    /// untyped.
    fn accessor_schema(&self, call: &syn::ExprMethodCall) -> Schema {
        match self.ctx.turbofish_type(call) {
            Some(ty) => SchemaBuilder::new(&self.ctx).build(&ty),
            None => Schema::new_string(),
        }
    }

    fn parse_binding(&mut self, call: &syn::ExprMethodCall, content_type: &str) {
        let Some(target) = self.ctx.turbofish_type(call) else {
            self.ctx.report(
                DiagnosticKind::Analysis,
                "cannot determine the request binding target type",
            );
            return;
        };
        match self.api.method.as_str() {
            "GET" | "HEAD" | "OPTIONS" | "DELETE" => {
                let params = ParamParser::new(&self.ctx, &query_name_parser).parse(&target);
                for param in params {
                    self.api.add_parameter(param);
                }
            }
            _ => {
                let schema = SchemaBuilder::new(&self.ctx).build(&target);
                self.api.spec.request_body =
                    Some(RequestBody::with_schema(schema, &[content_type]));
            }
        }
    }

    /// Accumulates one multipart form field into a synthesized request
    /// schema component named after the operation.
    fn form_property(&mut self, name: &str, mut schema: Schema, default: Option<serde_json::Value>) {
        schema.default = default;
        schema.title = Some(name.to_string());

        let key = form_request_key(self.api.spec.operation_id.as_deref().unwrap_or("request"));

        let mut doc = self.ctx.shared.doc.borrow_mut();
        let component = doc
            .components
            .schemas
            .entry(key.clone())
            .or_insert_with(|| {
                let mut object = Schema::new_object();
                object.title = Some(key.clone());
                object.key = key.clone();
                object
            });
        component.properties.insert(name.to_string(), schema);
        drop(doc);

        let request_body = self
            .api
            .spec
            .request_body
            .get_or_insert_with(RequestBody::default);
        request_body.content.insert(
            MIME_FORM_DATA.to_string(),
            MediaType {
                schema: Schema::new_ref(&key),
            },
        );
    }

    /// `res.render(..)` and friends.
    fn handle_response_method(&mut self, call: &syn::ExprMethodCall, method: &str) {
        match method {
            "status_code" => {
                if let Some(status) = call.args.first().and_then(|a| self.ctx.parse_status_code(a))
                {
                    self.status = Some(status);
                }
            }
            "render" => {
                let status = self
                    .chain_status(call)
                    .or(self.status)
                    .unwrap_or(200);
                if let Some(payload) = call.args.first() {
                    self.render_payload(payload, status);
                }
            }
            _ => {}
        }
    }

    /// A status_code link in the receiver chain of a render call.
    fn chain_status(&self, call: &syn::ExprMethodCall) -> Option<u16> {
        let mut current = unwrap_expr(&call.receiver);
        while let syn::Expr::MethodCall(link) = current {
            if link.method == "status_code" {
                if let Some(status) =
                    link.args.first().and_then(|a| self.ctx.parse_status_code(a))
                {
                    return Some(status);
                }
            }
            current = unwrap_expr(&link.receiver);
        }
        None
    }

    fn render_payload(&mut self, payload: &syn::Expr, status: u16) {
        let inner = unwrap_expr(payload);
        match inner {
            syn::Expr::Call(call) => {
                let syn::Expr::Path(func) = &*call.func else {
                    return;
                };
                let resolved = self.ctx.resolve_path_name(&func.path);

                if resolved.ends_with("Json") || resolved.ends_with("Json::new") {
                    let Some(body) = call.args.first() else { return };
                    if self.ctx.shared.custom_rules.covers_response(&self.ctx, body) {
                        return;
                    }
                    let schema = match self.ctx.schema_of_expr(unwrap_expr(body)) {
                        Some(schema) => schema,
                        None => {
                            self.ctx.report(
                                DiagnosticKind::Analysis,
                                "cannot infer the response payload type",
                            );
                            Schema::new_any()
                        }
                    };
                    self.api
                        .add_response(status, Response::with_schema(schema, MIME_JSON));
                    return;
                }

                if let Some((head, constructor)) = resolved.rsplit_once("::") {
                    if head.ends_with("Text") {
                        let content_type = match constructor {
                            "Html" => "text/html",
                            _ => MIME_TEXT_PLAIN,
                        };
                        self.api.add_response(
                            status,
                            Response::with_schema(Schema::new_string(), content_type),
                        );
                        return;
                    }
                    if head.ends_with("Redirect") {
                        let redirect_status = match constructor {
                            "found" => 302,
                            "other" => 303,
                            "permanent" => 301,
                            "temporary" => 307,
                            _ => return,
                        };
                        self.api.add_response(redirect_status, Response::default());
                        return;
                    }
                }
            }
            syn::Expr::Lit(lit) => {
                if matches!(lit.lit, syn::Lit::Str(_)) {
                    self.api.add_response(
                        status,
                        Response::with_schema(Schema::new_string(), MIME_TEXT_PLAIN),
                    );
                }
            }
            _ => {}
        }
    }
}

impl<'ast> Visit<'ast> for SalvoHandlerAnalyzer<'_> {
    fn visit_local(&mut self, local: &'ast syn::Local) {
        if let (Some(name), Some(init)) = (pat_ident(&local.pat), &local.init) {
            let annotation = match &local.pat {
                syn::Pat::Type(typed) => self.ctx.resolve_type(&typed.ty),
                _ => None,
            };
            let inferred = annotation.or_else(|| self.ctx.type_of_expr(&init.expr));
            if let Some(ty) = inferred {
                self.ctx.env.define(&name, Value::Variable(ty));
            }
        }
        syn::visit::visit_local(self, local);
    }

    fn visit_expr(&mut self, expr: &'ast syn::Expr) {
        let rules = self.ctx.shared.custom_rules.clone();
        if let Some(rewrite) = rules.match_request(&self.ctx, expr) {
            self.api.spec.request_body = Some(RequestBody::with_schema(
                rewrite.schema,
                &[rewrite.content_type.as_str()],
            ));
        }
        if let Some(rewrite) = rules.match_response(&self.ctx, expr) {
            self.api.add_response(
                rewrite.status,
                Response::with_schema(rewrite.schema, &rewrite.content_type),
            );
        }

        // An `unwrap_or` wrapper around an accessor supplies the default.
        if let syn::Expr::MethodCall(wrapper) = unwrap_expr(expr) {
            if wrapper.method == "unwrap_or" || wrapper.method == "unwrap_or_default" {
                let inner = unwrap_expr(&wrapper.receiver);
                let rule = self.request_rule();
                let ctx = self.ctx.clone();
                let mut matched: Option<(CallSite, String)> = None;
                match_call(&ctx, inner, &rule, |site, _, method| {
                    matched = Some((site, method.to_string()));
                });
                if let Some((site, method)) = matched {
                    if let Some(call) = site.method_call() {
                        let default = wrapper
                            .args
                            .first()
                            .and_then(default_literal)
                            .map(serde_json::Value::String);
                        self.handled.insert(expr_key(inner));
                        self.handle_request_method(call, &method, default);
                    }
                }
            }
        }

        // Request accessors and bindings.
        let unwrapped_key = expr_key(unwrap_expr(expr));
        if !self.handled.contains(&unwrapped_key) {
            let rule = self.request_rule();
            let ctx = self.ctx.clone();
            let mut matched: Option<(CallSite, String)> = None;
            match_call(&ctx, expr, &rule, |site, _, method| {
                matched = Some((site, method.to_string()));
            });
            if let Some((site, method)) = matched {
                if let Some(call) = site.method_call() {
                    self.handle_request_method(call, &method, None);
                }
            }
        }

        // Response emission.
        let response_rule = CallRule::new().with_rule(RESPONSE_TYPE, &["render", "status_code"]);
        let ctx = self.ctx.clone();
        let mut matched: Option<(CallSite, String)> = None;
        match_call(&ctx, expr, &response_rule, |site, _, method| {
            matched = Some((site, method.to_string()));
        });
        if let Some((site, method)) = matched {
            if let Some(call) = site.method_call() {
                self.handle_response_method(call, &method);
            }
        }

        syn::visit::visit_expr(self, expr);
    }
}
