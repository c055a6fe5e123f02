//! Type-to-schema translation.
//!
//! Converts a resolved [`RustType`] into an OpenAPI [`Schema`] in the
//! context of a package and file. Named types are emitted into
//! `components/schemas` once, under a package-mangled key, and referenced
//! from then on; a set of in-progress keys breaks recursion on
//! self-referential types by emitting a reference to the component being
//! built.
//!
//! Generic named types are captured as data rather than expanded: the
//! first translation emits the generic template whose properties may carry
//! `type-param` markers, and each instantiation returns a `specific`
//! marker holding the reference and the concrete argument schemas. The
//! normalizer performs the substitution afterwards.

use crate::attrs::{self, SerdeAttrs};
use crate::comment::Comment;
use crate::context::{Context, OPAQUE_TYPE};
use crate::definitions::{TypeDefinition, TypeItem};
use crate::diagnostics::DiagnosticKind;
use crate::rust_type::RustType;
use crate::schema::{EnumItem, ExtendedTypeInfo, Schema};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

pub struct SchemaBuilder<'a> {
    ctx: &'a Context,
    /// Substitutions for in-scope generic parameter names.
    params: HashMap<String, Schema>,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            params: HashMap::new(),
        }
    }

    fn with_params(ctx: &'a Context, params: HashMap<String, Schema>) -> Self {
        Self { ctx, params }
    }

    /// Builds the schema for a syntactic type, degrading to an untyped
    /// object when the type cannot be resolved at all.
    pub fn build_syn_type(&self, ty: &syn::Type) -> Schema {
        match self.ctx.resolve_type(ty) {
            Some(resolved) => self.build(&resolved),
            None => {
                self.ctx.report(
                    DiagnosticKind::Analysis,
                    "unsupported type expression, emitting untyped object",
                );
                Schema::new_any()
            }
        }
    }

    /// Builds the schema for a resolved type.
    pub fn build(&self, ty: &RustType) -> Schema {
        if let Some(substituted) = self.params.get(&ty.path) {
            return substituted.clone();
        }

        match ty.path.as_str() {
            "bool" => return Schema::new_bool(),
            "String" | "str" | "char" => return Schema::new_string(),
            "i8" | "i16" | "i32" | "u8" | "u16" | "u32" => return Schema::new_int32(),
            "i64" | "i128" | "isize" | "u64" | "u128" | "usize" => return Schema::new_int64(),
            "f32" => return Schema::new_float(),
            "f64" => return Schema::new_double(),
            OPAQUE_TYPE => return Schema::new_any(),
            _ => {}
        }

        match ty.name() {
            "Option" | "Result" => {
                let Some(inner) = ty.args.first() else {
                    return Schema::new_any();
                };
                let schema = self.build(inner);
                // Nullability cannot be attached to a bare reference.
                if ty.name() == "Option" && schema.reference.is_empty() {
                    return schema.with_nullable();
                }
                return schema;
            }
            "Box" | "Rc" | "Arc" | "Cell" | "RefCell" => {
                let Some(inner) = ty.args.first() else {
                    return Schema::new_any();
                };
                return self.build(inner);
            }
            "Cow" => {
                let Some(inner) = ty.args.last() else {
                    return Schema::new_any();
                };
                return self.build(inner);
            }
            "Vec" | "VecDeque" => {
                let Some(inner) = ty.args.first() else {
                    return Schema::new_array(Schema::new_any());
                };
                if inner.path == "u8" {
                    return Schema::new_bytes();
                }
                return Schema::new_array(self.build(inner));
            }
            "HashMap" | "BTreeMap" => {
                let key_is_string = ty
                    .args
                    .first()
                    .map(|k| k.path == "String" || k.path == "str")
                    .unwrap_or(false);
                if !key_is_string {
                    debug!("map with non-string key {} degrades to untyped", ty);
                    return Schema::new_any();
                }
                let value = ty.args.get(1).map(|v| self.build(v)).unwrap_or_default();
                return Schema::new_map(value);
            }
            "DateTime" | "NaiveDateTime" | "SystemTime" | "Instant" => {
                return Schema::new_date_time();
            }
            "NaiveDate" => {
                let mut schema = Schema::new_string();
                schema.format = "date".to_string();
                return schema;
            }
            "Uuid" => return Schema::new_uuid(),
            "Value" if ty.module().ends_with("serde_json") || ty.module().is_empty() => {
                return Schema::new_any();
            }
            _ => {}
        }

        let Some(def) = self.ctx.type_definition(&ty.path) else {
            self.ctx.report(
                DiagnosticKind::Analysis,
                format!("unresolvable type {}, emitting untyped object", ty),
            );
            return Schema::new_any();
        };

        self.build_named(&def, ty)
    }

    /// Builds a named type: memoized component emission for plain types,
    /// a `specific` marker for generic instantiations.
    fn build_named(&self, def: &Rc<TypeDefinition>, ty: &RustType) -> Schema {
        let generic_params = def.generic_params();
        if !generic_params.is_empty() {
            let generic_key = def.model_key(&[]);
            self.ensure_component(def, &generic_key, &generic_params);

            if ty.args.len() != generic_params.len() {
                self.ctx.report(
                    DiagnosticKind::Specialization,
                    format!(
                        "{} instantiated with {} type arguments, expected {}",
                        ty.path,
                        ty.args.len(),
                        generic_params.len()
                    ),
                );
            }
            let args: Vec<Schema> = ty.args.iter().map(|arg| self.build(arg)).collect();
            return Schema::new_specific(Schema::new_ref(&generic_key), args);
        }

        let key = def.model_key(&[]);
        self.ensure_component(def, &key, &[]);
        Schema::new_ref(&key)
    }

    /// Emits the component schema for a definition unless it already
    /// exists or is being built further up the stack.
    fn ensure_component(&self, def: &Rc<TypeDefinition>, key: &str, generic_params: &[String]) {
        {
            let doc = self.ctx.shared.doc.borrow();
            if doc.components.schemas.contains_key(key) {
                return;
            }
        }
        if !self.ctx.shared.building.borrow_mut().insert(key.to_string()) {
            // Already in progress further up the recursion path.
            return;
        }

        let def_ctx = self
            .ctx
            .with_package(def.pkg.clone())
            .with_file(def.file.clone());
        let mut params = HashMap::new();
        for (index, name) in generic_params.iter().enumerate() {
            params.insert(name.clone(), Schema::new_type_param(index));
        }
        let builder = SchemaBuilder::with_params(&def_ctx, params);

        let mut schema = builder.build_definition(def);
        schema.key = key.to_string();
        self.ctx
            .shared
            .doc
            .borrow_mut()
            .components
            .schemas
            .insert(key.to_string(), schema);
        self.ctx.shared.building.borrow_mut().remove(key);
    }

    /// The full (non-reference) schema of a definition.
    fn build_definition(&self, def: &Rc<TypeDefinition>) -> Schema {
        let enum_items = def.enums.borrow().clone();
        if !enum_items.is_empty() {
            return self.build_enum_carrier(def, enum_items);
        }

        match &def.item {
            TypeItem::Struct(item) => match &item.fields {
                syn::Fields::Named(fields) => {
                    let container = attrs::parse_serde_container_attrs(&item.attrs);
                    let doc = Comment::parse_attrs(&item.attrs);
                    let mut schema = self.build_object(&fields.named, &container);
                    schema = schema.with_description(&doc.text());
                    schema
                }
                syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                    self.build_syn_type(&fields.unnamed.first().unwrap().ty)
                }
                _ => Schema::new_object(),
            },
            TypeItem::Enum(item) => self.build_plain_enum(item),
            TypeItem::Alias(item) => self.build_syn_type(&item.ty),
        }
    }

    /// Object schema over named struct fields, honoring serde naming,
    /// skipping and one level of flatten promotion.
    fn build_object(
        &self,
        fields: &syn::punctuated::Punctuated<syn::Field, syn::token::Comma>,
        container: &attrs::SerdeContainerAttrs,
    ) -> Schema {
        let mut schema = Schema::new_object();
        for field in fields {
            let serde_attrs = attrs::parse_serde_attrs(&field.attrs);
            if serde_attrs.skip {
                continue;
            }
            if serde_attrs.flatten {
                self.flatten_into(&mut schema, field);
                continue;
            }
            let Some(ident) = &field.ident else { continue };
            let name = property_name(&ident.to_string(), &serde_attrs, container);

            let doc = Comment::parse_attrs(&field.attrs);
            let mut property = self.build_syn_type(&field.ty);
            if property.reference.is_empty() {
                property = property.with_description(&doc.text());
                property.deprecated = doc.deprecated();
            }
            let optional = is_option(&field.ty) || serde_attrs.default;
            if doc.required() || !optional {
                schema.required.push(name.clone());
            }
            schema.properties.insert(name, property);
        }
        schema
    }

    /// Promotes the properties of a flattened field into the container.
    /// The promotion is one level deep; nested flattens are already folded
    /// into the flattened type's own schema.
    fn flatten_into(&self, schema: &mut Schema, field: &syn::Field) {
        let flattened = self.build_syn_type(&field.ty);
        let resolved = if flattened.reference.is_empty() {
            flattened
        } else {
            let key = flattened.get_key();
            match self.ctx.shared.doc.borrow().components.schemas.get(&key) {
                Some(component) => component.clone(),
                None => {
                    debug!("flatten target {} not materialized", key);
                    return;
                }
            }
        };
        for (name, property) in resolved.properties {
            schema.properties.insert(name, property);
        }
        schema.required.extend(resolved.required);
    }

    /// Enum carrier over a primitive, with collected items.
    fn build_enum_carrier(&self, def: &Rc<TypeDefinition>, items: Vec<EnumItem>) -> Schema {
        let mut schema = match def.underlying_primitive().as_deref() {
            Some("bool") => Schema::new_bool(),
            Some("f32") => Schema::new_float(),
            Some("f64") => Schema::new_double(),
            Some("String") | Some("str") | Some("char") => Schema::new_string(),
            Some("i64") | Some("u64") | Some("i128") | Some("u128") | Some("isize")
            | Some("usize") => Schema::new_int64(),
            Some(_) => Schema::new_int32(),
            None => Schema::new_string(),
        };
        let doc_attrs = match &def.item {
            TypeItem::Struct(item) => &item.attrs,
            TypeItem::Enum(item) => &item.attrs,
            TypeItem::Alias(item) => &item.attrs,
        };
        schema = schema.with_description(&Comment::parse_attrs(doc_attrs).text());
        schema.enum_values = items.iter().map(|i| i.value.clone()).collect();
        schema.ext = Some(ExtendedTypeInfo::Enum { items });
        schema
    }

    /// A Rust enum without discriminants: unit variants become a string
    /// enum; anything carrying data degrades to an untyped object.
    fn build_plain_enum(&self, item: &syn::ItemEnum) -> Schema {
        let all_unit = item
            .variants
            .iter()
            .all(|v| matches!(v.fields, syn::Fields::Unit));
        if !all_unit {
            debug!("enum {} has data-carrying variants, degrading", item.ident);
            return Schema::new_any();
        }

        let container = attrs::parse_serde_container_attrs(&item.attrs);
        let items: Vec<EnumItem> = item
            .variants
            .iter()
            .map(|variant| {
                let serde_attrs = attrs::parse_serde_attrs(&variant.attrs);
                let name = property_name(&variant.ident.to_string(), &serde_attrs, &container);
                let description = Comment::parse_attrs(&variant.attrs).text();
                EnumItem::new(&variant.ident.to_string(), serde_json::json!(name), &description)
            })
            .collect();

        let mut schema = Schema::new_string();
        schema = schema.with_description(&Comment::parse_attrs(&item.attrs).text());
        schema.enum_values = items.iter().map(|i| i.value.clone()).collect();
        schema.ext = Some(ExtendedTypeInfo::Enum { items });
        schema
    }
}

fn property_name(
    ident: &str,
    serde_attrs: &SerdeAttrs,
    container: &attrs::SerdeContainerAttrs,
) -> String {
    if let Some(rename) = &serde_attrs.rename {
        return rename.clone();
    }
    match &container.rename_all {
        Some(convention) => attrs::apply_rename_all(convention, ident),
        None => ident.to_string(),
    }
}

fn is_option(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|s| s.ident == "Option")
            .unwrap_or(false),
        syn::Type::Reference(reference) => is_option(&reference.elem),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_for, fixture};

    #[test]
    fn test_primitive_schemas() {
        let fx = fixture(&[("src/lib.rs", "")]);
        let ctx = context_for(&fx, "server");
        let builder = SchemaBuilder::new(&ctx);

        assert_eq!(builder.build(&RustType::new("bool")).schema_type, "boolean");
        assert_eq!(builder.build(&RustType::new("String")).schema_type, "string");
        assert_eq!(builder.build(&RustType::new("i32")).format, "int32");
        assert_eq!(builder.build(&RustType::new("u64")).format, "int64");
        assert_eq!(builder.build(&RustType::new("f64")).format, "double");
    }

    #[test]
    fn test_vec_and_bytes() {
        let fx = fixture(&[("src/lib.rs", "")]);
        let ctx = context_for(&fx, "server");
        let builder = SchemaBuilder::new(&ctx);

        let strings = builder.build(&RustType::with_args("Vec", vec![RustType::new("String")]));
        assert_eq!(strings.schema_type, "array");
        assert_eq!(strings.items.unwrap().schema_type, "string");

        let bytes = builder.build(&RustType::with_args("Vec", vec![RustType::new("u8")]));
        assert_eq!(bytes.schema_type, "string");
        assert_eq!(bytes.format, "byte");
    }

    #[test]
    fn test_option_marks_nullable() {
        let fx = fixture(&[("src/lib.rs", "")]);
        let ctx = context_for(&fx, "server");
        let builder = SchemaBuilder::new(&ctx);

        let schema = builder.build(&RustType::with_args("Option", vec![RustType::new("i32")]));
        assert!(schema.nullable);
        assert_eq!(schema.schema_type, "integer");
    }

    #[test]
    fn test_string_keyed_map() {
        let fx = fixture(&[("src/lib.rs", "")]);
        let ctx = context_for(&fx, "server");
        let builder = SchemaBuilder::new(&ctx);

        let map = builder.build(&RustType::with_args(
            "HashMap",
            vec![RustType::new("String"), RustType::new("i64")],
        ));
        assert_eq!(map.schema_type, "object");
        assert_eq!(map.additional_properties.unwrap().format, "int64");

        let bad = builder.build(&RustType::with_args(
            "HashMap",
            vec![RustType::new("i64"), RustType::new("String")],
        ));
        assert!(bad.additional_properties.is_none());
    }

    #[test]
    fn test_struct_component_emission_and_memoization() {
        let fx = fixture(&[(
            "src/views.rs",
            r#"
            /// A sellable item
            pub struct Goods {
                pub name: String,
                #[serde(rename = "goodsPrice")]
                pub price: f64,
                pub comment: Option<String>,
                #[serde(skip)]
                pub internal: u64,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server::views");
        let builder = SchemaBuilder::new(&ctx);

        let schema = builder.build(&RustType::new("server::views::Goods"));
        assert_eq!(schema.reference, "#/components/schemas/server_views.Goods");

        let doc = fx.shared.doc.borrow();
        let component = doc.components.schemas.get("server_views.Goods").unwrap();
        assert_eq!(component.schema_type, "object");
        assert_eq!(component.description.as_deref(), Some("A sellable item"));
        assert!(component.properties.contains_key("name"));
        assert!(component.properties.contains_key("goodsPrice"));
        assert!(component.properties.contains_key("comment"));
        assert!(!component.properties.contains_key("internal"));
        assert_eq!(
            component.required,
            vec!["name".to_string(), "goodsPrice".to_string()]
        );
        drop(doc);

        // Second translation returns the reference without rebuilding.
        let again = builder.build(&RustType::new("server::views::Goods"));
        assert_eq!(again.reference, schema.reference);
        assert_eq!(fx.shared.doc.borrow().components.schemas.len(), 1);
    }

    #[test]
    fn test_recursive_type_emits_in_progress_ref() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct Node {
                pub value: i64,
                pub next: Option<Box<Node>>,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let builder = SchemaBuilder::new(&ctx);

        let schema = builder.build(&RustType::new("server::Node"));
        assert_eq!(schema.reference, "#/components/schemas/server.Node");

        let doc = fx.shared.doc.borrow();
        let component = doc.components.schemas.get("server.Node").unwrap();
        let next = component.properties.get("next").unwrap();
        assert_eq!(next.reference, "#/components/schemas/server.Node");
    }

    #[test]
    fn test_nested_struct_references() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct User {
                pub id: u32,
                pub profile: Profile,
            }
            pub struct Profile {
                pub bio: String,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let builder = SchemaBuilder::new(&ctx);
        builder.build(&RustType::new("server::User"));

        let doc = fx.shared.doc.borrow();
        assert!(doc.components.schemas.contains_key("server.User"));
        assert!(doc.components.schemas.contains_key("server.Profile"));
        let user = doc.components.schemas.get("server.User").unwrap();
        assert_eq!(
            user.properties.get("profile").unwrap().reference,
            "#/components/schemas/server.Profile"
        );
    }

    #[test]
    fn test_flatten_promotes_properties() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct Audit {
                pub created_at: String,
                pub updated_at: String,
            }
            pub struct Goods {
                pub name: String,
                #[serde(flatten)]
                pub audit: Audit,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        SchemaBuilder::new(&ctx).build(&RustType::new("server::Goods"));

        let doc = fx.shared.doc.borrow();
        let goods = doc.components.schemas.get("server.Goods").unwrap();
        assert!(goods.properties.contains_key("name"));
        assert!(goods.properties.contains_key("created_at"));
        assert!(goods.properties.contains_key("updated_at"));
        assert!(goods.required.contains(&"created_at".to_string()));
    }

    #[test]
    fn test_generic_capture() {
        let fx = fixture(&[(
            "src/views.rs",
            r#"
            pub struct Goods {
                pub name: String,
            }
            pub struct Page<T> {
                pub items: Vec<T>,
                pub total: i64,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server::views");
        let builder = SchemaBuilder::new(&ctx);

        let usage = builder.build(&RustType::with_args(
            "server::views::Page",
            vec![RustType::new("server::views::Goods")],
        ));

        // The usage site is a specific marker, not an expanded schema.
        match &usage.ext {
            Some(ExtendedTypeInfo::Specific { schema, args }) => {
                assert_eq!(
                    schema.reference,
                    "#/components/schemas/server_views.Page"
                );
                assert_eq!(args.len(), 1);
                assert_eq!(
                    args[0].reference,
                    "#/components/schemas/server_views.Goods"
                );
            }
            other => panic!("expected specific marker, got {:?}", other),
        }

        // The generic template carries a type-param marker in items.
        let doc = fx.shared.doc.borrow();
        let template = doc.components.schemas.get("server_views.Page").unwrap();
        let items_schema = template.properties.get("items").unwrap();
        let param = items_schema.items.as_ref().unwrap();
        match &param.ext {
            Some(ExtendedTypeInfo::Param { index }) => assert_eq!(*index, 0),
            other => panic!("expected type-param marker, got {:?}", other),
        }
        assert_eq!(
            template.properties.get("total").unwrap().format,
            "int64"
        );
    }

    #[test]
    fn test_enum_with_discriminants() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub enum ErrCode {
                CodeNotFound = 10000,
                CodeCancled,
                CodeUnknown,
                CodeInvalidArgument,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let schema = SchemaBuilder::new(&ctx).build(&RustType::new("server::ErrCode"));
        assert_eq!(schema.reference, "#/components/schemas/server.ErrCode");

        let doc = fx.shared.doc.borrow();
        let component = doc.components.schemas.get("server.ErrCode").unwrap();
        assert_eq!(component.schema_type, "integer");
        assert_eq!(
            component.enum_values,
            vec![
                serde_json::json!(10000),
                serde_json::json!(10001),
                serde_json::json!(10002),
                serde_json::json!(10003)
            ]
        );
    }

    #[test]
    fn test_unit_enum_becomes_string_enum() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            #[serde(rename_all = "lowercase")]
            pub enum Status {
                Active,
                Inactive,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        SchemaBuilder::new(&ctx).build(&RustType::new("server::Status"));

        let doc = fx.shared.doc.borrow();
        let component = doc.components.schemas.get("server.Status").unwrap();
        assert_eq!(component.schema_type, "string");
        assert_eq!(
            component.enum_values,
            vec![serde_json::json!("active"), serde_json::json!("inactive")]
        );
    }

    #[test]
    fn test_unresolvable_type_degrades_to_any() {
        let fx = fixture(&[("src/lib.rs", "")]);
        let ctx = context_for(&fx, "server");
        let schema = SchemaBuilder::new(&ctx).build(&RustType::new("mystery::Widget"));
        assert_eq!(schema.schema_type, "object");
        assert!(schema.reference.is_empty());
        assert!(schema.properties.is_empty());
    }

    #[test]
    fn test_newtype_without_enums_is_transparent() {
        let fx = fixture(&[(
            "src/lib.rs",
            "pub struct UserId(pub u64);\npub struct Holder { pub id: UserId }\n",
        )]);
        let ctx = context_for(&fx, "server");
        SchemaBuilder::new(&ctx).build(&RustType::new("server::Holder"));

        let doc = fx.shared.doc.borrow();
        let user_id = doc.components.schemas.get("server.UserId").unwrap();
        assert_eq!(user_id.schema_type, "integer");
        assert_eq!(user_id.format, "int64");
    }

    #[test]
    fn test_alias_resolves_target() {
        let fx = fixture(&[(
            "src/lib.rs",
            "pub struct Goods { pub name: String }\npub type GoodsList = Vec<Goods>;\n",
        )]);
        let ctx = context_for(&fx, "server");
        let schema = SchemaBuilder::new(&ctx).build(&RustType::new("server::GoodsList"));
        assert_eq!(schema.reference, "#/components/schemas/server.GoodsList");

        let doc = fx.shared.doc.borrow();
        let alias = doc.components.schemas.get("server.GoodsList").unwrap();
        assert_eq!(alias.schema_type, "array");
        assert_eq!(
            alias.items.as_ref().unwrap().reference,
            "#/components/schemas/server.Goods"
        );
    }
}
