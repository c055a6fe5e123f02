//! Struct-to-parameter expansion.
//!
//! Query and path bindings hand a struct type over; each field becomes an
//! individual operation parameter. A pluggable name parser decides the
//! parameter name and location from the field identifier and its serde
//! attributes, so path bindings can rename through `#[serde(rename)]`
//! while query bindings default to the query string.

use crate::attrs::{self, SerdeAttrs};
use crate::comment::Comment;
use crate::context::Context;
use crate::definitions::TypeItem;
use crate::rust_type::RustType;
use crate::schema::Parameter;
use crate::schema_builder::SchemaBuilder;
use log::debug;

/// Decides `(name, location)` for a field.
pub type ParamNameParser<'p> = &'p dyn Fn(&str, &SerdeAttrs) -> (String, String);

pub struct ParamParser<'a, 'p> {
    ctx: &'a Context,
    name_parser: ParamNameParser<'p>,
}

/// Default name parser: serde rename wins, location is the query string.
pub fn query_name_parser(field: &str, serde_attrs: &SerdeAttrs) -> (String, String) {
    let name = serde_attrs
        .rename
        .clone()
        .unwrap_or_else(|| field.to_string());
    (name, "query".to_string())
}

/// Path-binding name parser: serde rename wins, location is the path.
pub fn path_name_parser(field: &str, serde_attrs: &SerdeAttrs) -> (String, String) {
    let name = serde_attrs
        .rename
        .clone()
        .unwrap_or_else(|| field.to_string());
    (name, "path".to_string())
}

impl<'a, 'p> ParamParser<'a, 'p> {
    pub fn new(ctx: &'a Context, name_parser: ParamNameParser<'p>) -> Self {
        Self { ctx, name_parser }
    }

    /// Expands a struct type into parameters. Non-struct types expand to
    /// nothing.
    pub fn parse(&self, ty: &RustType) -> Vec<Parameter> {
        // Transparent wrappers.
        if matches!(ty.name(), "Option" | "Box" | "Rc" | "Arc") {
            if let Some(inner) = ty.args.first() {
                return self.parse(inner);
            }
        }

        let Some(def) = self.ctx.type_definition(&ty.path) else {
            debug!("parameter type {} not indexed", ty);
            return Vec::new();
        };
        let TypeItem::Struct(item) = &def.item else {
            return Vec::new();
        };
        let syn::Fields::Named(fields) = &item.fields else {
            return Vec::new();
        };

        let def_ctx = self
            .ctx
            .with_package(def.pkg.clone())
            .with_file(def.file.clone());
        let container = attrs::parse_serde_container_attrs(&item.attrs);
        let mut params = Vec::new();

        for field in &fields.named {
            let serde_attrs = attrs::parse_serde_attrs(&field.attrs);
            if serde_attrs.skip {
                continue;
            }
            // Composition: a flattened field contributes its own fields.
            if serde_attrs.flatten {
                if let Some(inner) = def_ctx.resolve_type(&field.ty) {
                    params.extend(
                        ParamParser::new(&def_ctx, self.name_parser).parse(&inner),
                    );
                }
                continue;
            }
            let Some(ident) = &field.ident else { continue };

            let field_name = match (&serde_attrs.rename, &container.rename_all) {
                (Some(_), _) => ident.to_string(),
                (None, Some(convention)) => attrs::apply_rename_all(convention, &ident.to_string()),
                (None, None) => ident.to_string(),
            };
            let (name, location) = (self.name_parser)(&field_name, &serde_attrs);

            let schema = SchemaBuilder::new(&def_ctx).build_syn_type(&field.ty);
            let doc = Comment::parse_attrs(&field.attrs);
            let required = location == "path" || doc.required();

            params.push(Parameter {
                name,
                location,
                description: match doc.text().is_empty() {
                    true => None,
                    false => Some(doc.text()),
                },
                required,
                deprecated: doc.deprecated(),
                schema,
            });
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_for, fixture};

    #[test]
    fn test_query_expansion_with_rename() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct ListQuery {
                #[serde(rename = "pageSize")]
                pub page_size: i32,
                pub keyword: Option<String>,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let params = ParamParser::new(&ctx, &query_name_parser)
            .parse(&RustType::new("server::ListQuery"));

        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "pageSize");
        assert_eq!(params[0].location, "query");
        assert!(!params[0].required);
        assert_eq!(params[0].schema.schema_type, "integer");
        assert_eq!(params[1].name, "keyword");
        assert_eq!(params[1].schema.schema_type, "string");
    }

    #[test]
    fn test_path_expansion_is_required() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct GoodsInfoParams {
                /// Goods Guid
                #[serde(rename = "guid")]
                pub goods_guid: i64,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let params = ParamParser::new(&ctx, &path_name_parser)
            .parse(&RustType::new("server::GoodsInfoParams"));

        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "guid");
        assert_eq!(params[0].location, "path");
        assert!(params[0].required);
        assert_eq!(params[0].schema.schema_type, "integer");
        assert_eq!(params[0].description.as_deref(), Some("Goods Guid"));
    }

    #[test]
    fn test_required_directive_on_query_field() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct Query {
                /// @required
                pub token: String,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let params =
            ParamParser::new(&ctx, &query_name_parser).parse(&RustType::new("server::Query"));
        assert!(params[0].required);
    }

    #[test]
    fn test_flattened_fields_contribute_parameters() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub struct Paging {
                pub page: i32,
            }
            pub struct Query {
                pub keyword: String,
                #[serde(flatten)]
                pub paging: Paging,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        let params =
            ParamParser::new(&ctx, &query_name_parser).parse(&RustType::new("server::Query"));
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["keyword", "page"]);
    }

    #[test]
    fn test_non_struct_type_expands_to_nothing() {
        let fx = fixture(&[("src/lib.rs", "pub type Raw = String;\n")]);
        let ctx = context_for(&fx, "server");
        let params =
            ParamParser::new(&ctx, &query_name_parser).parse(&RustType::new("server::Raw"));
        assert!(params.is_empty());
    }
}
