//! User-configured call rewriters.
//!
//! The configuration file can declare that calls of a given signature act
//! as request binders or response emitters, with a schema template whose
//! leaves may reference `args[i]`, the static type of the i-th call
//! argument. A matching call site is interpreted through the template
//! instead of the built-in method tables, which is how project-specific
//! response envelopes (`e::success(data)`) surface in the document.

use crate::call_rule::{match_call, CallRule};
use crate::context::Context;
use crate::diagnostics::DiagnosticKind;
use crate::schema::{Schema, MIME_JSON};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Nested schema template. `type` is a scalar type name, `object`,
/// `array`, or an `args[i]` marker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaTemplate {
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaTemplate>,
    #[serde(default)]
    pub items: Option<Box<SchemaTemplate>>,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    MIME_JSON.to_string()
}

/// A response-wrapper rule.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseRule {
    /// Receiver: a type path or module path.
    #[serde(rename = "type")]
    pub type_name: String,
    pub method: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(rename = "contentType", default = "default_content_type")]
    pub content_type: String,
    pub data: SchemaTemplate,
}

/// A request-wrapper rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestRule {
    #[serde(rename = "type")]
    pub type_name: String,
    pub method: String,
    #[serde(rename = "contentType", default = "default_content_type")]
    pub content_type: String,
    pub data: SchemaTemplate,
}

/// The `properties` section of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomRulesConfig {
    #[serde(default)]
    pub request: Vec<RequestRule>,
    #[serde(default)]
    pub response: Vec<ResponseRule>,
}

/// A matched response rewrite.
pub struct ResponseRewrite {
    pub status: u16,
    pub content_type: String,
    pub schema: Schema,
}

/// A matched request rewrite.
pub struct RequestRewrite {
    pub content_type: String,
    pub schema: Schema,
}

#[derive(Debug, Default)]
pub struct CustomRules {
    config: CustomRulesConfig,
}

impl CustomRules {
    pub fn new(config: CustomRulesConfig) -> Self {
        Self { config }
    }

    pub fn is_empty(&self) -> bool {
        self.config.request.is_empty() && self.config.response.is_empty()
    }

    /// Matches an expression against the response rules and synthesizes
    /// the declared schema.
    pub fn match_response(&self, ctx: &Context, expr: &syn::Expr) -> Option<ResponseRewrite> {
        for rule in &self.config.response {
            let call_rule = CallRule::new().with_rule(&rule.type_name, &[rule.method.as_str()]);
            let mut rewrite = None;
            match_call(ctx, expr, &call_rule, |site, _, _| {
                rewrite = Some(ResponseRewrite {
                    status: rule.status,
                    content_type: rule.content_type.clone(),
                    schema: build_template(ctx, &rule.data, &site.args()),
                });
            });
            if rewrite.is_some() {
                return rewrite;
            }
        }
        None
    }

    /// Whether an expression is a response-rule call, without building the
    /// schema. Plugins use this to skip their default interpretation of a
    /// payload that a rule already covers.
    pub fn covers_response(&self, ctx: &Context, expr: &syn::Expr) -> bool {
        for rule in &self.config.response {
            let call_rule = CallRule::new().with_rule(&rule.type_name, &[rule.method.as_str()]);
            let mut matched = false;
            match_call(ctx, expr, &call_rule, |_, _, _| matched = true);
            if matched {
                return true;
            }
        }
        false
    }

    /// Matches an expression against the request rules.
    pub fn match_request(&self, ctx: &Context, expr: &syn::Expr) -> Option<RequestRewrite> {
        for rule in &self.config.request {
            let call_rule = CallRule::new().with_rule(&rule.type_name, &[rule.method.as_str()]);
            let mut rewrite = None;
            match_call(ctx, expr, &call_rule, |site, _, _| {
                rewrite = Some(RequestRewrite {
                    content_type: rule.content_type.clone(),
                    schema: build_template(ctx, &rule.data, &site.args()),
                });
            });
            if rewrite.is_some() {
                return rewrite;
            }
        }
        None
    }
}

/// Instantiates a template, substituting `args[i]` markers with the
/// schemas of the call arguments' static types.
fn build_template(ctx: &Context, template: &SchemaTemplate, args: &[&syn::Expr]) -> Schema {
    if let Some(index) = parse_arg_index(&template.type_name) {
        let Some(arg) = args.get(index) else {
            ctx.report(
                DiagnosticKind::Analysis,
                format!("custom rule references args[{}] but the call has {} arguments",
                    index,
                    args.len()
                ),
            );
            return Schema::new_any();
        };
        return match ctx.schema_of_expr(arg) {
            Some(schema) => schema,
            None => {
                ctx.report(
                    DiagnosticKind::Analysis,
                    format!("cannot infer the type of custom-rule argument {}", index),
                );
                Schema::new_any()
            }
        };
    }

    match template.type_name.as_str() {
        "object" | "" => {
            let mut schema = Schema::new_object();
            for (name, property) in &template.properties {
                schema
                    .properties
                    .insert(name.clone(), build_template(ctx, property, args));
            }
            schema
        }
        "array" => {
            let items = template
                .items
                .as_ref()
                .map(|t| build_template(ctx, t, args))
                .unwrap_or_default();
            Schema::new_array(items)
        }
        "string" => Schema::new_string(),
        "integer" => Schema::new_int64(),
        "number" => Schema::new_double(),
        "boolean" => Schema::new_bool(),
        other => {
            ctx.report(
                DiagnosticKind::Configuration,
                format!("unknown template type '{}'", other),
            );
            Schema::new_any()
        }
    }
}

fn parse_arg_index(type_name: &str) -> Option<usize> {
    type_name
        .strip_prefix("args[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Value;
    use crate::rust_type::RustType;
    use crate::test_support::{context_for, fixture};

    fn success_rules() -> CustomRules {
        let yaml = r#"
response:
  - type: "server::e"
    method: "success"
    status: 200
    contentType: "application/json"
    data:
      type: object
      properties:
        code: { type: integer }
        msg: { type: string }
        data: { type: "args[0]" }
"#;
        CustomRules::new(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_parse_arg_index() {
        assert_eq!(parse_arg_index("args[0]"), Some(0));
        assert_eq!(parse_arg_index("args[12]"), Some(12));
        assert_eq!(parse_arg_index("object"), None);
    }

    #[test]
    fn test_response_wrapper_expansion() {
        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub mod e {
                pub fn success<T>(data: T) -> T { data }
            }
            pub struct GoodsInfoRes {
                pub name: String,
            }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        ctx.env.define(
            "res",
            Value::Variable(RustType::new("server::GoodsInfoRes")),
        );

        let rules = success_rules();
        let expr: syn::Expr = syn::parse_str("e::success(res)").unwrap();
        assert!(rules.covers_response(&ctx, &expr));

        let rewrite = rules.match_response(&ctx, &expr).unwrap();
        assert_eq!(rewrite.status, 200);
        assert_eq!(rewrite.content_type, "application/json");
        let data = rewrite.schema.properties.get("data").unwrap();
        assert_eq!(
            data.reference,
            "#/components/schemas/server.GoodsInfoRes"
        );
        assert_eq!(
            rewrite.schema.properties.get("code").unwrap().schema_type,
            "integer"
        );
        assert_eq!(
            rewrite.schema.properties.get("msg").unwrap().schema_type,
            "string"
        );
    }

    #[test]
    fn test_unmatched_call_is_ignored() {
        let fx = fixture(&[("src/lib.rs", "pub mod e { pub fn error() {} }")]);
        let ctx = context_for(&fx, "server");
        let rules = success_rules();
        let expr: syn::Expr = syn::parse_str("e::error()").unwrap();
        assert!(rules.match_response(&ctx, &expr).is_none());
        assert!(!rules.covers_response(&ctx, &expr));
    }

    #[test]
    fn test_missing_argument_degrades() {
        let fx = fixture(&[(
            "src/lib.rs",
            "pub mod e { pub fn success() {} }",
        )]);
        let ctx = context_for(&fx, "server");
        let rules = success_rules();
        let expr: syn::Expr = syn::parse_str("e::success()").unwrap();
        let rewrite = rules.match_response(&ctx, &expr).unwrap();
        let data = rewrite.schema.properties.get("data").unwrap();
        assert_eq!(data.schema_type, "object");
        assert!(data.reference.is_empty());
    }

    #[test]
    fn test_request_rule() {
        let yaml = r#"
request:
  - type: "server::binding"
    method: "from_payload"
    contentType: "application/json"
    data: { type: "args[0]" }
"#;
        let rules = CustomRules::new(serde_yaml::from_str(yaml).unwrap());

        let fx = fixture(&[(
            "src/lib.rs",
            r#"
            pub mod binding {
                pub fn from_payload<T>(v: T) -> T { v }
            }
            pub struct CreateReq { pub name: String }
            "#,
        )]);
        let ctx = context_for(&fx, "server");
        ctx.env
            .define("req", Value::Variable(RustType::new("server::CreateReq")));

        let expr: syn::Expr = syn::parse_str("binding::from_payload(req)").unwrap();
        let rewrite = rules.match_request(&ctx, &expr).unwrap();
        assert_eq!(rewrite.content_type, "application/json");
        assert_eq!(
            rewrite.schema.reference,
            "#/components/schemas/server.CreateReq"
        );
    }
}
