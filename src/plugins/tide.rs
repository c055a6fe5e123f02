//! tide plugin.
//!
//! Route discovery follows tide's route-building style: `app.at("/api")`
//! bound to a variable is a route group whose prefix joins with nested
//! `at` calls, and a verb method on a route expression registers the API.
//! Inside the handler, calls on the `tide::Request` parameter bind request
//! payloads and read parameters, and responses are recognized from
//! `Body::from_json`, `Response::builder` chains and `Redirect`
//! constructors.

use crate::api::{join_path, Api};
use crate::call_rule::{match_call, unwrap_expr, CallRule, CallSite};
use crate::comment::Comment;
use crate::context::Context;
use crate::definitions::FuncDefinition;
use crate::diagnostics::DiagnosticKind;
use crate::environment::{RouteGroup, Value};
use crate::param_parser::{query_name_parser, ParamParser};
use crate::plugins::{resolve_handler_key, Node, Plugin};
use crate::rust_type::RustType;
use crate::schema::{
    Parameter, RequestBody, Response, Schema, MIME_FORM_URLENCODED, MIME_JSON, MIME_OCTET_STREAM,
    MIME_TEXT_PLAIN,
};
use crate::schema_builder::SchemaBuilder;
use std::rc::Rc;
use syn::visit::Visit;

const SERVER_TYPE: &str = "tide::Server";
const ROUTE_TYPE: &str = "tide::Route";
const REQUEST_TYPE: &str = "tide::Request";

const ROUTE_VERBS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

const REQUEST_METHODS: &[&str] = &[
    "body_json",
    "body_form",
    "body_string",
    "body_bytes",
    "query",
    "param",
];

pub struct TidePlugin;

impl TidePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for TidePlugin {
    fn name(&self) -> &str {
        "tide"
    }

    fn method_signatures(&self) -> Vec<(&'static str, &'static str, RustType)> {
        vec![
            (SERVER_TYPE, "at", RustType::new(ROUTE_TYPE)),
            (ROUTE_TYPE, "at", RustType::new(ROUTE_TYPE)),
            (REQUEST_TYPE, "param", RustType::new("String")),
        ]
    }

    fn analyze(&self, ctx: &Context, node: &Node) {
        match node {
            Node::Local(local) => self.local(ctx, local),
            Node::Assign(assign) => self.assign(ctx, assign),
            Node::Expr(expr) => self.expr(ctx, expr),
        }
    }
}

impl TidePlugin {
    /// `let g = app.at("/api")` defines a route group in the innermost
    /// scope; `let app = tide::new()` types the server variable.
    fn local(&self, ctx: &Context, local: &syn::Local) {
        let Some(init) = &local.init else { return };
        let Some(name) = pat_ident(&local.pat) else { return };
        let expr = unwrap_expr(&init.expr);

        if is_server_constructor(ctx, expr) {
            ctx.env
                .define(&name, Value::Variable(RustType::new(SERVER_TYPE)));
            return;
        }
        if let Some(prefix) = route_prefix(ctx, expr) {
            if is_at_call(expr) {
                ctx.env.define(
                    &name,
                    Value::RouteGroup(RouteGroup {
                        prefix,
                        receiver_type: ROUTE_TYPE.to_string(),
                    }),
                );
            }
        }
    }

    /// `g = app.at("/admin")` reassigns in the owning scope.
    fn assign(&self, ctx: &Context, assign: &syn::ExprAssign) {
        let syn::Expr::Path(left) = &*assign.left else { return };
        let Some(ident) = left.path.get_ident() else { return };
        let expr = unwrap_expr(&assign.right);
        if let Some(prefix) = route_prefix(ctx, expr) {
            if is_at_call(expr) {
                ctx.env.assign(
                    &ident.to_string(),
                    Value::RouteGroup(RouteGroup {
                        prefix,
                        receiver_type: ROUTE_TYPE.to_string(),
                    }),
                );
            }
        }
    }

    /// A verb method on a route expression registers an API.
    fn expr(&self, ctx: &Context, expr: &syn::Expr) {
        let syn::Expr::MethodCall(call) = unwrap_expr(expr) else {
            return;
        };
        let method = call.method.to_string();
        if !ROUTE_VERBS.contains(&method.as_str()) {
            return;
        }
        let Some(prefix) = route_prefix(ctx, &call.receiver) else {
            return;
        };
        self.parse_api(ctx, call, &method, &prefix);
    }

    fn parse_api(&self, ctx: &Context, call: &syn::ExprMethodCall, method: &str, path: &str) {
        let Some(handler_expr) = call.args.last() else {
            return;
        };
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
            api.spec.operation_id = Some(derive_operation_id(&def));
        }

        let handler_ctx = ctx
            .new_env()
            .with_package(def.pkg.clone())
            .with_file(def.file.clone());
        TideHandlerAnalyzer::new(handler_ctx, &mut api).parse(&def);

        ctx.add_api(api);
    }
}

fn derive_operation_id(def: &FuncDefinition) -> String {
    let pkg_name = def.module_path.rsplit("::").next().unwrap_or("handler");
    format!("{}.{}", pkg_name, def.name)
}

fn pat_ident(pat: &syn::Pat) -> Option<String> {
    match pat {
        syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
        syn::Pat::Type(typed) => pat_ident(&typed.pat),
        _ => None,
    }
}

fn is_at_call(expr: &syn::Expr) -> bool {
    matches!(unwrap_expr(expr), syn::Expr::MethodCall(call) if call.method == "at")
}

fn is_server_constructor(ctx: &Context, expr: &syn::Expr) -> bool {
    let syn::Expr::Call(call) = unwrap_expr(expr) else {
        return false;
    };
    let syn::Expr::Path(path) = &*call.func else {
        return false;
    };
    let resolved = ctx.resolve_path_name(&path.path);
    resolved == "tide::new" || resolved == "tide::with_state"
}

/// The accumulated prefix of a route expression: a bound route group, a
/// server variable (empty prefix) or a chain of `.at(path)` calls.
fn route_prefix(ctx: &Context, expr: &syn::Expr) -> Option<String> {
    match unwrap_expr(expr) {
        syn::Expr::Path(path) => {
            let ident = path.path.get_ident()?.to_string();
            if let Some(group) = ctx.env.route_group(&ident) {
                return Some(group.prefix);
            }
            match ctx.env.variable_type(&ident) {
                Some(ty) if ty.is(SERVER_TYPE) => Some(String::new()),
                _ => None,
            }
        }
        syn::Expr::MethodCall(call) if call.method == "at" => {
            let base = route_prefix(ctx, &call.receiver)?;
            let arg = string_literal(call.args.first()?)?;
            Some(join_path(&base, &normalize_path(&arg)))
        }
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

/// Rewrites `:name` and `*name` segments to `{name}`.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks a handler body, populating the API from request-context calls
/// and response constructions.
struct TideHandlerAnalyzer<'a> {
    ctx: Context,
    api: &'a mut Api,
    /// Type annotation of the `let` currently being descended into, used
    /// when a binding has no turbofish.
    let_type: Option<RustType>,
}

impl<'a> TideHandlerAnalyzer<'a> {
    fn new(ctx: Context, api: &'a mut Api) -> Self {
        Self {
            ctx,
            api,
            let_type: None,
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

    fn match_request_methods(&mut self, expr: &syn::Expr) {
        let rule = self.request_rule();
        let ctx = self.ctx.clone();
        let mut matched: Option<(CallSite, String)> = None;
        match_call(&ctx, expr, &rule, |site, _, method| {
            matched = Some((site, method.to_string()));
        });
        let Some((site, method)) = matched else { return };
        let Some(call) = site.method_call() else { return };

        match method.as_str() {
            "body_json" => self.parse_binding(call, MIME_JSON),
            "body_form" => self.parse_binding(call, MIME_FORM_URLENCODED),
            "body_string" => {
                self.api.spec.request_body = Some(RequestBody::with_schema(
                    Schema::new_string(),
                    &[MIME_TEXT_PLAIN],
                ));
            }
            "body_bytes" => {
                self.api.spec.request_body = Some(RequestBody::with_schema(
                    Schema::new_bytes(),
                    &[MIME_OCTET_STREAM],
                ));
            }
            "query" => {
                let Some(target) = self.binding_target(call) else {
                    self.ctx.report(
                        DiagnosticKind::Analysis,
                        "cannot determine the query binding target type",
                    );
                    return;
                };
                let params =
                    ParamParser::new(&self.ctx, &query_name_parser).parse(&target);
                for param in params {
                    self.api.add_parameter(param);
                }
            }
            "param" => {
                let Some(name) = call.args.first().and_then(string_literal) else {
                    return;
                };
                self.api
                    .add_parameter(Parameter::path(&name).with_schema(Schema::new_string()));
            }
            _ => {}
        }
    }

    /// `body_json::<T>()` or `let x: T = req.body_json()`: on methods that
    /// carry no body by convention the fields of `T` become query
    /// parameters; otherwise `T` is the request body.
    fn parse_binding(&mut self, call: &syn::ExprMethodCall, content_type: &str) {
        let Some(target) = self.binding_target(call) else {
            self.ctx.report(
                DiagnosticKind::Analysis,
                "cannot determine the request binding target type",
            );
            return;
        };

        match self.api.method.as_str() {
            "GET" | "HEAD" | "OPTIONS" | "DELETE" => {
                let params =
                    ParamParser::new(&self.ctx, &query_name_parser).parse(&target);
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

    fn binding_target(&self, call: &syn::ExprMethodCall) -> Option<RustType> {
        self.ctx
            .turbofish_type(call)
            .or_else(|| self.let_type.clone())
    }

    /// `Response::builder(status).body(...)` chains.
    fn try_response_builder(&mut self, expr: &syn::Expr) -> bool {
        let mut links: Vec<&syn::ExprMethodCall> = Vec::new();
        let mut current = unwrap_expr(expr);
        while let syn::Expr::MethodCall(call) = current {
            links.push(call);
            current = unwrap_expr(&call.receiver);
        }
        let syn::Expr::Call(root) = current else {
            return false;
        };
        let syn::Expr::Path(func) = &*root.func else {
            return false;
        };
        let resolved = self.ctx.resolve_path_name(&func.path);
        if !resolved.ends_with("Response::builder") {
            return false;
        }

        let status = root
            .args
            .first()
            .and_then(|arg| self.ctx.parse_status_code(arg))
            .unwrap_or_else(|| {
                self.ctx.report(
                    DiagnosticKind::Analysis,
                    "cannot parse the status of a response builder",
                );
                200
            });

        let mut response = Response::default();
        for link in &links {
            if link.method != "body" {
                continue;
            }
            if let Some(body) = link.args.first() {
                if let Some((schema, content_type)) = self.response_body(body) {
                    response = Response::with_schema(schema, &content_type);
                }
            }
        }
        self.api.add_response(status, response);
        true
    }

    /// The schema and content type of a response body expression.
    fn response_body(&mut self, expr: &syn::Expr) -> Option<(Schema, String)> {
        let inner = unwrap_expr(expr);
        if let syn::Expr::Call(call) = inner {
            if let syn::Expr::Path(func) = &*call.func {
                let resolved = self.ctx.resolve_path_name(&func.path);
                if resolved.ends_with("Body::from_json") {
                    let payload = call.args.first()?;
                    if self.ctx.shared.custom_rules.covers_response(&self.ctx, payload) {
                        return None;
                    }
                    let schema = self.payload_schema(payload);
                    return Some((schema, MIME_JSON.to_string()));
                }
                if resolved.ends_with("Body::from_form") {
                    let payload = call.args.first()?;
                    let schema = self.payload_schema(payload);
                    return Some((schema, MIME_FORM_URLENCODED.to_string()));
                }
            }
        }
        if let Some(ty) = self.ctx.type_of_expr(inner) {
            if ty.is("String") || ty.is("str") {
                return Some((Schema::new_string(), MIME_TEXT_PLAIN.to_string()));
            }
        }
        if matches!(inner, syn::Expr::Lit(lit) if matches!(lit.lit, syn::Lit::Str(_))) {
            return Some((Schema::new_string(), MIME_TEXT_PLAIN.to_string()));
        }
        None
    }

    fn payload_schema(&self, payload: &syn::Expr) -> Schema {
        match self.ctx.schema_of_expr(unwrap_expr(payload)) {
            Some(schema) => schema,
            None => {
                self.ctx.report(
                    DiagnosticKind::Analysis,
                    "cannot infer the response payload type",
                );
                Schema::new_any()
            }
        }
    }

    /// Standalone `Body::from_json(&payload)` emits a 200 JSON response.
    fn try_body_from_json(&mut self, expr: &syn::Expr) {
        let syn::Expr::Call(call) = unwrap_expr(expr) else {
            return;
        };
        let syn::Expr::Path(func) = &*call.func else {
            return;
        };
        let resolved = self.ctx.resolve_path_name(&func.path);
        if !resolved.ends_with("Body::from_json") {
            return;
        }
        let Some(payload) = call.args.first() else {
            return;
        };
        if self.ctx.shared.custom_rules.covers_response(&self.ctx, payload) {
            return;
        }
        let schema = self.payload_schema(payload);
        self.api
            .add_response(200, Response::with_schema(schema, MIME_JSON));
    }

    /// `Redirect` constructors emit a bodyless 3xx response.
    fn try_redirect(&mut self, expr: &syn::Expr) {
        let syn::Expr::Call(call) = unwrap_expr(expr) else {
            return;
        };
        let syn::Expr::Path(func) = &*call.func else {
            return;
        };
        let resolved = self.ctx.resolve_path_name(&func.path);
        let Some((head, constructor)) = resolved.rsplit_once("::") else {
            return;
        };
        if !head.ends_with("Redirect") {
            return;
        }
        let status = match constructor {
            "new" => 302,
            "permanent" => 301,
            "temporary" => 307,
            "see_other" => 303,
            _ => return,
        };
        self.api.add_response(status, Response::default());
    }
}

impl<'ast> Visit<'ast> for TideHandlerAnalyzer<'_> {
    fn visit_local(&mut self, local: &'ast syn::Local) {
        let annotation = match &local.pat {
            syn::Pat::Type(typed) => self.ctx.resolve_type(&typed.ty),
            _ => None,
        };
        if let (Some(name), Some(init)) = (pat_ident(&local.pat), &local.init) {
            let inferred = annotation
                .clone()
                .or_else(|| self.ctx.type_of_expr(&init.expr));
            if let Some(ty) = inferred {
                self.ctx.env.define(&name, Value::Variable(ty));
            }
        }
        self.let_type = annotation;
        syn::visit::visit_local(self, local);
        self.let_type = None;
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

        if self.try_response_builder(expr) {
            return;
        }
        self.try_body_from_json(expr);
        self.try_redirect(expr);
        self.match_request_methods(expr);

        syn::visit::visit_expr(self, expr);
    }
}
