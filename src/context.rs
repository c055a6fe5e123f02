//! Analysis context.
//!
//! The [`Context`] is the cursor every component reads the world through:
//! the current package and file, the scoped environment, the stack of
//! documentation comments in effect, and shared handles to the definition
//! index, the document under construction and the diagnostics collector.
//!
//! It also hosts the poor man's type inference the call-rule matcher and
//! the schema builder rely on: resolving syntactic names through the
//! current file's imports, and deriving the static type of an expression
//! from typed locals, indexed function signatures and framework method
//! tables.

use crate::api::Api;
use crate::comment::Comment;
use crate::custom_rules::CustomRules;
use crate::definitions::{Definition, Definitions, FuncDefinition};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::environment::Environment;
use crate::loader::{Package, SourceFile};
use crate::rust_type::RustType;
use crate::schema::{Document, Schema};
use crate::schema_builder::SchemaBuilder;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Return types of framework methods, registered by plugins. The special
/// return path `$T0` resolves to the first turbofish type argument at the
/// call site.
#[derive(Debug, Default)]
pub struct MethodSignatures {
    map: HashMap<(String, String), RustType>,
}

impl MethodSignatures {
    pub fn register(&mut self, type_path: &str, method: &str, ret: RustType) {
        self.map
            .insert((type_path.to_string(), method.to_string()), ret);
    }

    pub fn lookup(&self, type_path: &str, method: &str) -> Option<RustType> {
        self.map
            .get(&(type_path.to_string(), method.to_string()))
            .cloned()
    }
}

/// State owned by the top-level analyzer and shared across contexts.
#[derive(Clone, Default)]
pub struct Shared {
    pub doc: Rc<RefCell<Document>>,
    pub definitions: Rc<RefCell<Definitions>>,
    pub diagnostics: Rc<RefCell<Diagnostics>>,
    pub apis: Rc<RefCell<Vec<Api>>>,
    pub method_signatures: Rc<RefCell<MethodSignatures>>,
    pub custom_rules: Rc<CustomRules>,
    /// Component keys currently being built; breaks schema recursion.
    pub building: Rc<RefCell<HashSet<String>>>,
    pub used_operation_ids: Rc<RefCell<HashSet<String>>>,
}

/// The analysis cursor.
#[derive(Clone)]
pub struct Context {
    pub shared: Shared,
    pkg: Rc<Package>,
    file: Rc<SourceFile>,
    pub env: Environment,
    comments: Vec<Rc<Comment>>,
}

impl Context {
    pub fn new(shared: Shared, pkg: Rc<Package>, file: Rc<SourceFile>, env: Environment) -> Self {
        Self {
            shared,
            pkg,
            file,
            env,
            comments: Vec::new(),
        }
    }

    pub fn pkg(&self) -> &Rc<Package> {
        &self.pkg
    }

    pub fn file(&self) -> &Rc<SourceFile> {
        &self.file
    }

    /// Forks the context with a child scope.
    pub fn block(&self) -> Self {
        let mut child = self.clone();
        child.env = self.env.block();
        child
    }

    /// Forks the context with a fresh, unchained environment. Used when
    /// descending into a handler body.
    pub fn new_env(&self) -> Self {
        let mut child = self.clone();
        child.env = Environment::new();
        child
    }

    pub fn with_package(&self, pkg: Rc<Package>) -> Self {
        let mut child = self.clone();
        child.pkg = pkg;
        child
    }

    pub fn with_file(&self, file: Rc<SourceFile>) -> Self {
        let mut child = self.clone();
        child.file = file;
        child
    }

    /// Pushes a comment onto the stack; inner entries overlay outer ones.
    pub fn push_comment(&mut self, comment: Comment) {
        self.comments.push(Rc::new(comment));
    }

    /// Comment stack, outermost first.
    pub fn comments(&self) -> &[Rc<Comment>] {
        &self.comments
    }

    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.shared.diagnostics.borrow_mut().report(kind, message);
    }

    pub fn definition(&self, key: &str) -> Option<Definition> {
        self.shared.definitions.borrow().get(key).cloned()
    }

    pub fn func_definition(&self, key: &str) -> Option<Rc<FuncDefinition>> {
        self.shared.definitions.borrow().get_func(key)
    }

    pub fn type_definition(&self, key: &str) -> Option<Rc<crate::definitions::TypeDefinition>> {
        self.shared.definitions.borrow().get_type(key)
    }

    /// Registers a finished API into the route table and the document.
    pub fn add_api(&self, api: Api) {
        crate::api::register_api(&self.shared, api);
    }

    /// Builds the schema of an expression from its inferred static type.
    pub fn schema_of_expr(&self, expr: &syn::Expr) -> Option<Schema> {
        let ty = self.type_of_expr(expr)?;
        Some(SchemaBuilder::new(self).build(&ty))
    }

    // ---- name resolution ------------------------------------------------

    /// Resolves a syntactic path to a fully-qualified name using the
    /// current file's imports and the definition index.
    pub fn resolve_path_name(&self, path: &syn::Path) -> String {
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        self.resolve_segments(&segments)
    }

    fn resolve_segments(&self, segments: &[String]) -> String {
        if segments.is_empty() {
            return String::new();
        }
        let first = segments[0].as_str();
        let rest = &segments[1..];

        // Keyword-relative paths.
        match first {
            "crate" => {
                let mut out = vec![self.pkg.module.name.clone()];
                out.extend(rest.iter().cloned());
                return out.join("::");
            }
            "self" => {
                let mut out = vec![self.pkg.path.clone()];
                out.extend(rest.iter().cloned());
                return out.join("::");
            }
            "super" => {
                let parent = match self.pkg.path.rfind("::") {
                    Some(idx) => self.pkg.path[..idx].to_string(),
                    None => self.pkg.path.clone(),
                };
                let mut out = vec![parent];
                out.extend(rest.iter().cloned());
                return out.join("::");
            }
            _ => {}
        }

        if rest.is_empty() {
            return self.resolve_bare_name(first);
        }

        // Multi-segment path: resolve the head, keep the tail.
        if let Some(target) = self.file.imports.get(first) {
            let mut out = vec![self.expand_import(target)];
            out.extend(rest.iter().cloned());
            return out.join("::");
        }
        if first == self.pkg.module.name {
            return segments.join("::");
        }
        // A child module of the current package?
        let local = format!("{}::{}", self.pkg.path, segments.join("::"));
        let local_prefix = format!("{}::{}::", self.pkg.path, first);
        let defs = self.shared.definitions.borrow();
        if defs.get(&local).is_some() || defs.keys_with_prefix(&local_prefix) {
            return local;
        }
        segments.join("::")
    }

    fn resolve_bare_name(&self, name: &str) -> String {
        if is_builtin_name(name) {
            return name.to_string();
        }
        if let Some(target) = self.file.imports.get(name) {
            return self.expand_import(target);
        }
        let local = format!("{}::{}", self.pkg.path, name);
        if self.shared.definitions.borrow().get(&local).is_some() {
            return local;
        }
        for glob in &self.file.glob_imports {
            let candidate = format!("{}::{}", self.expand_import(glob), name);
            if self.shared.definitions.borrow().get(&candidate).is_some() {
                return candidate;
            }
        }
        if let Some(def) = self.shared.definitions.borrow().find_by_suffix(name) {
            return def.key();
        }
        name.to_string()
    }

    /// Imports are stored as written; map a leading `crate`/`self`/`super`
    /// onto the importing file's own crate and module.
    fn expand_import(&self, target: &str) -> String {
        let segments: Vec<String> = target.split("::").map(str::to_string).collect();
        match segments.first().map(String::as_str) {
            Some("crate") | Some("self") | Some("super") => self.resolve_segments(&segments),
            _ => target.to_string(),
        }
    }

    /// Converts a syntactic type into a resolved [`RustType`].
    pub fn resolve_type(&self, ty: &syn::Type) -> Option<RustType> {
        match ty {
            syn::Type::Path(type_path) => {
                let last = type_path.path.segments.last()?;
                let mut args = Vec::new();
                if let syn::PathArguments::AngleBracketed(bracketed) = &last.arguments {
                    for arg in &bracketed.args {
                        if let syn::GenericArgument::Type(inner) = arg {
                            args.push(self.resolve_type(inner)?);
                        }
                    }
                }
                // Resolve the path with generic arguments stripped.
                let segments: Vec<String> = type_path
                    .path
                    .segments
                    .iter()
                    .map(|s| s.ident.to_string())
                    .collect();
                Some(RustType::with_args(self.resolve_segments(&segments), args))
            }
            syn::Type::Reference(reference) => self.resolve_type(&reference.elem),
            syn::Type::Paren(paren) => self.resolve_type(&paren.elem),
            syn::Type::Group(group) => self.resolve_type(&group.elem),
            syn::Type::Slice(slice) => Some(RustType::with_args(
                "Vec",
                vec![self.resolve_type(&slice.elem)?],
            )),
            syn::Type::Array(array) => Some(RustType::with_args(
                "Vec",
                vec![self.resolve_type(&array.elem)?],
            )),
            syn::Type::TraitObject(_) | syn::Type::ImplTrait(_) | syn::Type::Tuple(_) => {
                Some(RustType::new(OPAQUE_TYPE))
            }
            _ => None,
        }
    }

    // ---- expression type inference --------------------------------------

    /// Infers the static type of an expression, as far as typed locals,
    /// indexed signatures and framework method tables allow.
    pub fn type_of_expr(&self, expr: &syn::Expr) -> Option<RustType> {
        match expr {
            syn::Expr::Path(path) => {
                if let Some(ident) = path.path.get_ident() {
                    let name = ident.to_string();
                    if let Some(ty) = self.env.variable_type(&name) {
                        return Some(ty);
                    }
                    if let Some(group) = self.env.route_group(&name) {
                        if !group.receiver_type.is_empty() {
                            return Some(RustType::new(group.receiver_type));
                        }
                    }
                }
                None
            }
            syn::Expr::Reference(reference) => self.type_of_expr(&reference.expr),
            syn::Expr::Paren(paren) => self.type_of_expr(&paren.expr),
            syn::Expr::Group(group) => self.type_of_expr(&group.expr),
            syn::Expr::Await(await_expr) => self.type_of_expr(&await_expr.base),
            syn::Expr::Try(try_expr) => {
                let inner = self.type_of_expr(&try_expr.expr)?;
                inner.unwrap_payload().cloned().or(Some(inner))
            }
            syn::Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Deref(_)) => {
                self.type_of_expr(&unary.expr)
            }
            syn::Expr::Cast(cast) => self.resolve_type(&cast.ty),
            syn::Expr::Struct(expr_struct) => self.resolve_expr_path(&expr_struct.path),
            syn::Expr::Lit(lit) => match &lit.lit {
                syn::Lit::Str(_) => Some(RustType::new("String")),
                syn::Lit::Int(_) => Some(RustType::new("i64")),
                syn::Lit::Float(_) => Some(RustType::new("f64")),
                syn::Lit::Bool(_) => Some(RustType::new("bool")),
                _ => None,
            },
            syn::Expr::MethodCall(call) => self.type_of_method_call(call),
            syn::Expr::Call(call) => self.type_of_call(call),
            syn::Expr::Index(index) => {
                let recv = self.type_of_expr(&index.expr)?;
                if recv.name() == "Vec" && !recv.args.is_empty() {
                    Some(recv.args[0].clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn type_of_method_call(&self, call: &syn::ExprMethodCall) -> Option<RustType> {
        let method = call.method.to_string();
        let receiver = self.type_of_expr(&call.receiver)?;

        match method.as_str() {
            "unwrap" | "expect" | "unwrap_or" | "unwrap_or_else" | "unwrap_or_default" => {
                return receiver.unwrap_payload().cloned().or(Some(receiver));
            }
            "clone" | "to_owned" => return Some(receiver),
            "to_string" => return Some(RustType::new("String")),
            _ => {}
        }

        let ret = self
            .shared
            .method_signatures
            .borrow()
            .lookup(&receiver.path, &method);
        if let Some(ret) = ret {
            if ret.path == "$T0" {
                return self.turbofish_type(call);
            }
            return Some(ret);
        }

        // A method indexed from the analyzed source.
        let key = format!("{}::{}", receiver.path, method);
        let def = self.shared.definitions.borrow().get_func(&key)?;
        let ret = def.return_type()?.clone();
        self.with_package(def.pkg.clone())
            .with_file(def.file.clone())
            .resolve_type(&ret)
    }

    fn type_of_call(&self, call: &syn::ExprCall) -> Option<RustType> {
        let syn::Expr::Path(func_path) = &*call.func else {
            return None;
        };
        let resolved = self.resolve_path_name(&func_path.path);

        // Free function or associated function indexed from source.
        if let Some(def) = self.shared.definitions.borrow().get_func(&resolved) {
            let ret = def.return_type()?.clone();
            return self
                .with_package(def.pkg.clone())
                .with_file(def.file.clone())
                .resolve_type(&ret);
        }

        // Tuple-struct constructor.
        if self.shared.definitions.borrow().get_type(&resolved).is_some() {
            return Some(RustType::new(resolved));
        }

        // `Type::new()`-style constructors of indexed types.
        if let Some((head, tail)) = resolved.rsplit_once("::") {
            if matches!(tail, "new" | "default" | "builder")
                && self.shared.definitions.borrow().get_type(head).is_some()
            {
                return Some(RustType::new(head));
            }
        }
        None
    }

    /// Resolves an expression path (struct literal, constructor) keeping
    /// any turbofish generic arguments.
    fn resolve_expr_path(&self, path: &syn::Path) -> Option<RustType> {
        let mut args = Vec::new();
        if let Some(last) = path.segments.last() {
            if let syn::PathArguments::AngleBracketed(bracketed) = &last.arguments {
                for arg in &bracketed.args {
                    if let syn::GenericArgument::Type(ty) = arg {
                        args.push(self.resolve_type(ty)?);
                    }
                }
            }
        }
        Some(RustType::with_args(self.resolve_path_name(path), args))
    }

    /// First turbofish type argument of a method call.
    pub fn turbofish_type(&self, call: &syn::ExprMethodCall) -> Option<RustType> {
        let turbofish = call.turbofish.as_ref()?;
        for arg in &turbofish.args {
            if let syn::GenericArgument::Type(ty) = arg {
                return self.resolve_type(ty);
            }
        }
        None
    }

    /// Parses an HTTP status from a literal integer or a
    /// `StatusCode::<Name>` path.
    pub fn parse_status_code(&self, expr: &syn::Expr) -> Option<u16> {
        match expr {
            syn::Expr::Lit(lit) => match &lit.lit {
                syn::Lit::Int(int) => int.base10_parse().ok(),
                _ => None,
            },
            syn::Expr::Path(path) => {
                let segments: Vec<String> =
                    path.path.segments.iter().map(|s| s.ident.to_string()).collect();
                if segments.len() >= 2 && segments[segments.len() - 2] == "StatusCode" {
                    status_from_name(segments.last().unwrap())
                } else {
                    None
                }
            }
            syn::Expr::Reference(reference) => self.parse_status_code(&reference.expr),
            syn::Expr::Paren(paren) => self.parse_status_code(&paren.expr),
            _ => None,
        }
    }
}

/// Marker path for types the analyzer cannot express; degrades to an
/// untyped object without a diagnostic.
pub const OPAQUE_TYPE: &str = "(opaque)";

fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "char"
            | "str"
            | "String"
            | "i8"
            | "i16"
            | "i32"
            | "i64"
            | "i128"
            | "isize"
            | "u8"
            | "u16"
            | "u32"
            | "u64"
            | "u128"
            | "usize"
            | "f32"
            | "f64"
            | "Vec"
            | "VecDeque"
            | "Option"
            | "Result"
            | "Box"
            | "Rc"
            | "Arc"
            | "Cow"
            | "HashMap"
            | "BTreeMap"
    )
}

/// Maps a `StatusCode` constant name (either `NOT_FOUND` or `NotFound`
/// style) to its numeric value.
pub fn status_from_name(name: &str) -> Option<u16> {
    let canonical = if name.contains('_') || name.chars().all(|c| !c.is_lowercase()) {
        name.to_uppercase()
    } else {
        let mut out = String::with_capacity(name.len() + 4);
        for (i, ch) in name.chars().enumerate() {
            if ch.is_uppercase() && i > 0 {
                out.push('_');
            }
            out.extend(ch.to_uppercase());
        }
        out
    };
    let code = match canonical.as_str() {
        "CONTINUE" => 100,
        "OK" => 200,
        "CREATED" => 201,
        "ACCEPTED" => 202,
        "NO_CONTENT" => 204,
        "MOVED_PERMANENTLY" => 301,
        "FOUND" => 302,
        "SEE_OTHER" => 303,
        "NOT_MODIFIED" => 304,
        "TEMPORARY_REDIRECT" => 307,
        "PERMANENT_REDIRECT" => 308,
        "BAD_REQUEST" => 400,
        "UNAUTHORIZED" => 401,
        "PAYMENT_REQUIRED" => 402,
        "FORBIDDEN" => 403,
        "NOT_FOUND" => 404,
        "METHOD_NOT_ALLOWED" => 405,
        "CONFLICT" => 409,
        "GONE" => 410,
        "UNPROCESSABLE_ENTITY" => 422,
        "TOO_MANY_REQUESTS" => 429,
        "INTERNAL_SERVER_ERROR" => 500,
        "NOT_IMPLEMENTED" => 501,
        "BAD_GATEWAY" => 502,
        "SERVICE_UNAVAILABLE" => 503,
        "GATEWAY_TIMEOUT" => 504,
        _ => return None,
    };
    Some(code)
}
