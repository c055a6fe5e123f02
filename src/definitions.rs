//! Definition indexing.
//!
//! Builds a map from fully-qualified names to the functions, impl methods
//! and named types discovered in the loaded packages. Indexed definitions
//! are what route handlers resolve against and what the schema builder
//! translates into components.
//!
//! Enum-like values are collected two ways: `enum` declarations with
//! integer discriminants materialize their items eagerly, and module-level
//! `const` groups whose declared type is a primitive-backed named type from
//! the same package append items to that type's definition afterwards.

use crate::comment::Comment;
use crate::loader::{Package, PackageGroup, SourceFile};
use crate::schema::EnumItem;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An indexed declaration.
#[derive(Debug, Clone)]
pub enum Definition {
    Func(Rc<FuncDefinition>),
    Type(Rc<TypeDefinition>),
}

impl Definition {
    pub fn key(&self) -> String {
        match self {
            Definition::Func(def) => def.key(),
            Definition::Type(def) => def.key(),
        }
    }
}

/// A free function or an impl method.
#[derive(Debug)]
pub struct FuncDefinition {
    pub pkg: Rc<Package>,
    pub file: Rc<SourceFile>,
    /// Module path including inline-module segments.
    pub module_path: String,
    /// Impl type name for methods.
    pub owner: Option<String>,
    pub name: String,
    pub attrs: Vec<syn::Attribute>,
    pub sig: syn::Signature,
    pub block: syn::Block,
}

impl FuncDefinition {
    pub fn key(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}::{}", self.module_path, owner, self.name),
            None => format!("{}::{}", self.module_path, self.name),
        }
    }

    pub fn return_type(&self) -> Option<&syn::Type> {
        match &self.sig.output {
            syn::ReturnType::Default => None,
            syn::ReturnType::Type(_, ty) => Some(ty),
        }
    }
}

/// A struct, enum or type alias.
#[derive(Debug)]
pub struct TypeDefinition {
    pub pkg: Rc<Package>,
    pub file: Rc<SourceFile>,
    pub module_path: String,
    pub name: String,
    pub item: TypeItem,
    /// Enum items attached at indexing time or by const-group collection.
    pub enums: RefCell<Vec<EnumItem>>,
}

#[derive(Debug)]
pub enum TypeItem {
    Struct(syn::ItemStruct),
    Enum(syn::ItemEnum),
    Alias(syn::ItemType),
}

impl TypeDefinition {
    pub fn key(&self) -> String {
        format!("{}::{}", self.module_path, self.name)
    }

    /// Component key for this type, optionally specialized by the identity
    /// keys of concrete type arguments.
    pub fn model_key(&self, type_args: &[crate::schema::Schema]) -> String {
        let mut key = format!("{}.{}", self.module_path.replace("::", "_"), self.name);
        if !type_args.is_empty() {
            key.push('[');
            key.push_str(&type_args[0].get_key());
            for arg in &type_args[1..] {
                key.push(',');
                key.push_str(&arg.get_key());
            }
            key.push(']');
        }
        key
    }

    /// Names of the formal generic type parameters, in declaration order.
    pub fn generic_params(&self) -> Vec<String> {
        let generics = match &self.item {
            TypeItem::Struct(item) => &item.generics,
            TypeItem::Enum(item) => &item.generics,
            TypeItem::Alias(item) => &item.generics,
        };
        generics
            .params
            .iter()
            .filter_map(|p| match p {
                syn::GenericParam::Type(tp) => Some(tp.ident.to_string()),
                _ => None,
            })
            .collect()
    }

    /// The primitive type behind a newtype or alias, if any.
    pub fn underlying_primitive(&self) -> Option<String> {
        let ty = match &self.item {
            TypeItem::Alias(item) => &*item.ty,
            TypeItem::Struct(item) => match &item.fields {
                syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                    &fields.unnamed.first().unwrap().ty
                }
                _ => return None,
            },
            TypeItem::Enum(item) => {
                let has_discriminants = item.variants.iter().any(|v| v.discriminant.is_some());
                return has_discriminants.then(|| "i32".to_string());
            }
        };
        primitive_name(ty)
    }
}

fn primitive_name(ty: &syn::Type) -> Option<String> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let ident = type_path.path.get_ident()?.to_string();
    matches!(
        ident.as_str(),
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
    )
    .then_some(ident)
}

/// Map of fully-qualified name to definition. Duplicate keys overwrite:
/// the last-seen definition wins.
#[derive(Debug, Default)]
pub struct Definitions {
    map: HashMap<String, Definition>,
}

impl Definitions {
    pub fn set(&mut self, def: Definition) {
        let key = def.key();
        if key.is_empty() {
            return;
        }
        if self.map.contains_key(&key) {
            debug!("definition {} redeclared, last writer wins", key);
        }
        self.map.insert(key, def);
    }

    pub fn get(&self, key: &str) -> Option<&Definition> {
        self.map.get(key)
    }

    pub fn get_type(&self, key: &str) -> Option<Rc<TypeDefinition>> {
        match self.map.get(key) {
            Some(Definition::Type(def)) => Some(def.clone()),
            _ => None,
        }
    }

    pub fn get_func(&self, key: &str) -> Option<Rc<FuncDefinition>> {
        match self.map.get(key) {
            Some(Definition::Func(def)) => Some(def.clone()),
            _ => None,
        }
    }

    /// Resolves a bare type name to the unique definition whose key ends
    /// with `::name`, if exactly one exists.
    pub fn find_by_suffix(&self, name: &str) -> Option<&Definition> {
        let suffix = format!("::{}", name);
        let mut found = None;
        for (key, def) in &self.map {
            if key.ends_with(&suffix) {
                if found.is_some() {
                    return None;
                }
                found = Some(def);
            }
        }
        found
    }

    /// Whether any key starts with the given prefix. Used to recognize
    /// module-relative paths.
    pub fn keys_with_prefix(&self, prefix: &str) -> bool {
        self.map.keys().any(|k| k.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Indexes every package of a group that is owned by the main module or
/// whitelisted through `depends` (exact crate name or name prefix).
pub fn index_package_group(group: &PackageGroup, depends: &[String]) -> Definitions {
    let mut definitions = Definitions::default();

    for loaded in &group.packages {
        let owned = group.is_owned(&loaded.package);
        let whitelisted = depends
            .iter()
            .any(|d| loaded.package.module.name == *d || loaded.package.module.name.starts_with(d));
        if !owned && !whitelisted {
            debug!(
                "skipping package {} (crate {} not in depends)",
                loaded.package.path, loaded.package.module.name
            );
            continue;
        }

        for file in &loaded.files {
            index_items(
                &mut definitions,
                &loaded.package,
                file,
                &loaded.package.path,
                &file.ast.items,
            );
        }
        for file in &loaded.files {
            collect_const_enums(
                &definitions,
                &loaded.package.path,
                &file.ast.items,
            );
        }
    }

    debug!("indexed {} definitions", definitions.len());
    definitions
}

fn index_items(
    definitions: &mut Definitions,
    pkg: &Rc<Package>,
    file: &Rc<SourceFile>,
    module_path: &str,
    items: &[syn::Item],
) {
    for item in items {
        match item {
            syn::Item::Fn(item_fn) => {
                definitions.set(Definition::Func(Rc::new(FuncDefinition {
                    pkg: pkg.clone(),
                    file: file.clone(),
                    module_path: module_path.to_string(),
                    owner: None,
                    name: item_fn.sig.ident.to_string(),
                    attrs: item_fn.attrs.clone(),
                    sig: item_fn.sig.clone(),
                    block: (*item_fn.block).clone(),
                })));
            }
            syn::Item::Impl(item_impl) => {
                let Some(owner) = impl_owner(item_impl) else {
                    continue;
                };
                for impl_item in &item_impl.items {
                    if let syn::ImplItem::Fn(method) = impl_item {
                        definitions.set(Definition::Func(Rc::new(FuncDefinition {
                            pkg: pkg.clone(),
                            file: file.clone(),
                            module_path: module_path.to_string(),
                            owner: Some(owner.clone()),
                            name: method.sig.ident.to_string(),
                            attrs: method.attrs.clone(),
                            sig: method.sig.clone(),
                            block: method.block.clone(),
                        })));
                    }
                }
            }
            syn::Item::Struct(item_struct) => {
                definitions.set(Definition::Type(Rc::new(TypeDefinition {
                    pkg: pkg.clone(),
                    file: file.clone(),
                    module_path: module_path.to_string(),
                    name: item_struct.ident.to_string(),
                    item: TypeItem::Struct(item_struct.clone()),
                    enums: RefCell::new(Vec::new()),
                })));
            }
            syn::Item::Enum(item_enum) => {
                let items = enum_discriminant_items(item_enum);
                definitions.set(Definition::Type(Rc::new(TypeDefinition {
                    pkg: pkg.clone(),
                    file: file.clone(),
                    module_path: module_path.to_string(),
                    name: item_enum.ident.to_string(),
                    item: TypeItem::Enum(item_enum.clone()),
                    enums: RefCell::new(items),
                })));
            }
            syn::Item::Type(item_type) => {
                definitions.set(Definition::Type(Rc::new(TypeDefinition {
                    pkg: pkg.clone(),
                    file: file.clone(),
                    module_path: module_path.to_string(),
                    name: item_type.ident.to_string(),
                    item: TypeItem::Alias(item_type.clone()),
                    enums: RefCell::new(Vec::new()),
                })));
            }
            syn::Item::Mod(item_mod) => {
                if let Some((_, mod_items)) = &item_mod.content {
                    let nested = format!("{}::{}", module_path, item_mod.ident);
                    index_items(definitions, pkg, file, &nested, mod_items);
                }
            }
            _ => {}
        }
    }
}

/// The base type name an impl block attaches its methods to. Impls on
/// references, trait objects and other non-path types are unsupported.
fn impl_owner(item_impl: &syn::ItemImpl) -> Option<String> {
    match &*item_impl.self_ty {
        syn::Type::Path(type_path) => {
            type_path.path.segments.last().map(|s| s.ident.to_string())
        }
        _ => None,
    }
}

/// Enum items of an `enum` whose variants carry integer discriminants.
/// Implicit variants continue from the previous explicit value.
fn enum_discriminant_items(item_enum: &syn::ItemEnum) -> Vec<EnumItem> {
    let has_discriminants = item_enum.variants.iter().any(|v| v.discriminant.is_some());
    if !has_discriminants {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut next_value: i64 = 0;
    for variant in &item_enum.variants {
        if let Some((_, expr)) = &variant.discriminant {
            match integer_literal(expr) {
                Some(value) => next_value = value,
                None => {
                    debug!(
                        "non-literal discriminant on {}::{}",
                        item_enum.ident, variant.ident
                    );
                    return Vec::new();
                }
            }
        }
        let description = Comment::parse_attrs(&variant.attrs).text();
        items.push(EnumItem::new(
            &variant.ident.to_string(),
            serde_json::json!(next_value),
            &description,
        ));
        next_value += 1;
    }
    items
}

fn integer_literal(expr: &syn::Expr) -> Option<i64> {
    match expr {
        syn::Expr::Lit(lit) => match &lit.lit {
            syn::Lit::Int(int) => int.base10_parse().ok(),
            _ => None,
        },
        syn::Expr::Unary(unary) => {
            if matches!(unary.op, syn::UnOp::Neg(_)) {
                integer_literal(&unary.expr).map(|v| -v)
            } else {
                None
            }
        }
        syn::Expr::Group(group) => integer_literal(&group.expr),
        syn::Expr::Paren(paren) => integer_literal(&paren.expr),
        _ => None,
    }
}

/// Post-pass: attach `const NAME: Ty = value;` items to the definition of
/// `Ty` when `Ty` is a primitive-backed named type from the same package.
fn collect_const_enums(definitions: &Definitions, module_path: &str, items: &[syn::Item]) {
    for item in items {
        match item {
            syn::Item::Const(item_const) => {
                let Some(type_name) = const_type_name(&item_const.ty) else {
                    continue;
                };
                let key = format!("{}::{}", module_path, type_name);
                let Some(type_def) = definitions.get_type(&key) else {
                    continue;
                };
                if type_def.underlying_primitive().is_none() {
                    continue;
                }
                let Some(value) = const_value(&item_const.expr) else {
                    continue;
                };
                let description = Comment::parse_attrs(&item_const.attrs).text();
                type_def.enums.borrow_mut().push(EnumItem::new(
                    &item_const.ident.to_string(),
                    value,
                    &description,
                ));
            }
            syn::Item::Mod(item_mod) => {
                if let Some((_, mod_items)) = &item_mod.content {
                    let nested = format!("{}::{}", module_path, item_mod.ident);
                    collect_const_enums(definitions, &nested, mod_items);
                }
            }
            _ => {}
        }
    }
}

fn const_type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(type_path) => {
            let ident = type_path.path.segments.last()?.ident.to_string();
            // Bare primitives are not enum carriers.
            if primitive_name(ty).is_some() {
                None
            } else {
                Some(ident)
            }
        }
        _ => None,
    }
}

/// Extracts the concrete value of a const initializer, unwrapping newtype
/// constructors like `ErrCode(10000)`.
fn const_value(expr: &syn::Expr) -> Option<serde_json::Value> {
    match expr {
        syn::Expr::Lit(lit) => match &lit.lit {
            syn::Lit::Int(int) => int.base10_parse::<i64>().ok().map(|v| serde_json::json!(v)),
            syn::Lit::Float(float) => float
                .base10_parse::<f64>()
                .ok()
                .map(|v| serde_json::json!(v)),
            syn::Lit::Str(s) => Some(serde_json::json!(s.value())),
            syn::Lit::Bool(b) => Some(serde_json::json!(b.value)),
            syn::Lit::Char(c) => Some(serde_json::json!(c.value().to_string())),
            _ => None,
        },
        syn::Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Neg(_)) => {
            match const_value(&unary.expr)? {
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Some(serde_json::json!(-i))
                    } else {
                        n.as_f64().map(|f| serde_json::json!(-f))
                    }
                }
                _ => None,
            }
        }
        syn::Expr::Call(call) => {
            if matches!(&*call.func, syn::Expr::Path(_)) && call.args.len() == 1 {
                const_value(call.args.first().unwrap())
            } else {
                None
            }
        }
        syn::Expr::Group(group) => const_value(&group.expr),
        syn::Expr::Paren(paren) => const_value(&paren.expr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PackageLoader;
    use std::fs;
    use tempfile::TempDir;

    fn index_fixture(files: &[(&str, &str)]) -> Definitions {
        let temp = TempDir::new().unwrap();
        for (path, content) in files {
            let full = temp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let groups = PackageLoader::new(temp.path().to_path_buf()).load().unwrap();
        index_package_group(&groups[0], &[])
    }

    const MANIFEST: (&str, &str) = ("Cargo.toml", "[package]\nname = \"server\"\n");

    #[test]
    fn test_function_and_method_keys() {
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/shop.rs",
                r#"
                pub fn goods_info() {}

                pub struct GoodsController;

                impl GoodsController {
                    pub fn delete(&self) {}
                }
                "#,
            ),
        ]);

        assert!(defs.get_func("server::shop::goods_info").is_some());
        assert!(defs.get_func("server::shop::GoodsController::delete").is_some());
        assert!(defs.get_type("server::shop::GoodsController").is_some());
    }

    #[test]
    fn test_enum_discriminants_with_implicit_continuation() {
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/lib.rs",
                r#"
                pub enum ErrCode {
                    CodeNotFound = 10000,
                    CodeCancled,
                    CodeUnknown,
                    CodeInvalidArgument,
                }
                "#,
            ),
        ]);

        let def = defs.get_type("server::ErrCode").unwrap();
        let items = def.enums.borrow();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].value, serde_json::json!(10000));
        assert_eq!(items[1].value, serde_json::json!(10001));
        assert_eq!(items[3].value, serde_json::json!(10003));
        assert_eq!(items[3].key, "CodeInvalidArgument");
        assert_eq!(def.underlying_primitive().as_deref(), Some("i32"));
    }

    #[test]
    fn test_const_group_attaches_to_newtype() {
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/lib.rs",
                r#"
                pub struct ErrCode(pub i32);

                /// not found
                pub const CODE_NOT_FOUND: ErrCode = ErrCode(10000);
                pub const CODE_UNKNOWN: ErrCode = ErrCode(10001);
                "#,
            ),
        ]);

        let def = defs.get_type("server::ErrCode").unwrap();
        let items = def.enums.borrow();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "CODE_NOT_FOUND");
        assert_eq!(items[0].value, serde_json::json!(10000));
        assert_eq!(items[0].description, "not found");
    }

    #[test]
    fn test_const_of_foreign_type_is_ignored() {
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/lib.rs",
                "pub const TIMEOUT: u64 = 30;\npub struct Marker;\n",
            ),
        ]);
        let marker = defs.get_type("server::Marker").unwrap();
        assert!(marker.enums.borrow().is_empty());
    }

    #[test]
    fn test_inline_modules_extend_the_key() {
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/lib.rs",
                "pub mod e {\n    pub fn success() {}\n}\n",
            ),
        ]);
        assert!(defs.get_func("server::e::success").is_some());
    }

    #[test]
    fn test_last_writer_wins() {
        // The same key produced twice: the parser accepts it even though
        // rustc would not, and the index keeps the last declaration.
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/lib.rs",
                "pub struct Dup { pub first: i32 }\npub struct Dup { pub second: i32 }\n",
            ),
        ]);
        let def = defs.get_type("server::Dup").unwrap();
        let TypeItem::Struct(item) = &def.item else {
            panic!("expected struct");
        };
        let syn::Fields::Named(fields) = &item.fields else {
            panic!("expected named fields");
        };
        let names: Vec<String> = fields
            .named
            .iter()
            .filter_map(|f| f.ident.as_ref().map(|i| i.to_string()))
            .collect();
        assert_eq!(names, vec!["second".to_string()]);
    }

    #[test]
    fn test_depends_whitelists_other_crates() {
        let temp = TempDir::new().unwrap();
        for (path, content) in [
            ("Cargo.toml", "[package]\nname = \"server\"\n"),
            ("src/main.rs", "fn main() {}"),
            ("shared/Cargo.toml", "[package]\nname = \"shared-types\"\n"),
            (
                "shared/src/lib.rs",
                "pub struct Page { pub total: i64 }\n",
            ),
        ] {
            let full = temp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let groups = PackageLoader::new(temp.path().to_path_buf()).load().unwrap();

        let without = index_package_group(&groups[0], &[]);
        assert!(without.get_type("shared_types::Page").is_none());

        let with = index_package_group(&groups[0], &["shared_types".to_string()]);
        assert!(with.get_type("shared_types::Page").is_some());
    }

    #[test]
    fn test_generic_params_and_model_key() {
        let defs = index_fixture(&[
            MANIFEST,
            (
                "src/views.rs",
                "pub struct Page<T> { pub items: Vec<T>, pub total: i64 }\n",
            ),
        ]);
        let def = defs.get_type("server::views::Page").unwrap();
        assert_eq!(def.generic_params(), vec!["T".to_string()]);
        assert_eq!(def.model_key(&[]), "server_views.Page");
        let arg = crate::schema::Schema::new_ref("server_views.Goods");
        assert_eq!(
            def.model_key(&[arg]),
            "server_views.Page[server_views.Goods]"
        );
    }
}
