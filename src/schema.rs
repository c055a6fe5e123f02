//! OpenAPI 3.0.3 document model.
//!
//! The types in this module mirror the OpenAPI object layout and serialize
//! directly into the final `openapi.json`. A [`Schema`] additionally carries
//! an [`ExtendedTypeInfo`] tag used during analysis (generic instantiation,
//! enum items, type parameters); it is stripped by the normalizer before the
//! document is serialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OpenAPI version emitted by default.
pub const OPENAPI_VERSION: &str = "3.0.3";

pub const TYPE_ARRAY: &str = "array";
pub const TYPE_BOOLEAN: &str = "boolean";
pub const TYPE_INTEGER: &str = "integer";
pub const TYPE_NUMBER: &str = "number";
pub const TYPE_OBJECT: &str = "object";
pub const TYPE_STRING: &str = "string";

pub const MIME_JSON: &str = "application/json";
pub const MIME_XML: &str = "application/xml";
pub const MIME_FORM_DATA: &str = "multipart/form-data";
pub const MIME_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MIME_TEXT_PLAIN: &str = "text/plain";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Builds the canonical reference string for a component schema key.
pub fn ref_component_schemas(key: &str) -> String {
    format!("#/components/schemas/{}", key)
}

/// A single security requirement: scheme name to list of scopes.
/// Multiple entries in an operation's `security` array are ORed.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// Complete OpenAPI document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub openapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    pub paths: BTreeMap<String, PathItem>,
    #[serde(skip_serializing_if = "Components::is_empty")]
    pub components: Components,
}

impl Document {
    pub fn new() -> Self {
        Self {
            openapi: OPENAPI_VERSION.to_string(),
            info: Info::default(),
            tags: Vec::new(),
            paths: BTreeMap::new(),
            components: Components::default(),
        }
    }

    /// Registers a document-level tag, keeping the list free of duplicates.
    pub fn add_tag(&mut self, name: &str) {
        if !self.tags.iter().any(|t| t.name == name) {
            self.tags.push(Tag {
                name: name.to_string(),
                description: None,
            });
        }
    }

    /// Resolves a schema to the component it references, if any.
    /// A schema without a reference resolves to itself.
    pub fn unref<'a>(&'a self, schema: &'a Schema) -> &'a Schema {
        if schema.reference.is_empty() {
            return schema;
        }
        let key = schema.get_key();
        match self.components.schemas.get(&key) {
            Some(resolved) => resolved,
            None => schema,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// OpenAPI Info object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "termsOfService",
        skip_serializing_if = "Option::is_none"
    )]
    pub terms_of_service: Option<String>,
}

/// OpenAPI Tag object.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// All operations registered under a single path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<Operation>,
}

impl PathItem {
    /// Mutable access to the operation slot for an HTTP method.
    /// Unknown methods return `None`.
    pub fn operation_mut(&mut self, method: &str) -> Option<&mut Option<Operation>> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(&mut self.get),
            "PUT" => Some(&mut self.put),
            "POST" => Some(&mut self.post),
            "DELETE" => Some(&mut self.delete),
            "OPTIONS" => Some(&mut self.options),
            "HEAD" => Some(&mut self.head),
            "PATCH" => Some(&mut self.patch),
            "TRACE" => Some(&mut self.trace),
            "CONNECT" => Some(&mut self.connect),
            _ => None,
        }
    }

    /// Iterates over the operations that are present.
    pub fn operations_mut(&mut self) -> Vec<&mut Operation> {
        [
            &mut self.get,
            &mut self.put,
            &mut self.post,
            &mut self.delete,
            &mut self.options,
            &mut self.head,
            &mut self.patch,
            &mut self.trace,
            &mut self.connect,
        ]
        .into_iter()
        .filter_map(|slot| slot.as_mut())
        .collect()
    }
}

/// OpenAPI Operation object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, Response>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
}

/// OpenAPI Parameter object.
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    pub schema: Schema,
}

impl Parameter {
    pub fn path(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: "path".to_string(),
            description: None,
            required: true,
            deprecated: false,
            schema: Schema::default(),
        }
    }

    pub fn query(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: "query".to_string(),
            description: None,
            required: false,
            deprecated: false,
            schema: Schema::default(),
        }
    }

    pub fn header(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: "header".to_string(),
            description: None,
            required: false,
            deprecated: false,
            schema: Schema::default(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

/// OpenAPI RequestBody object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

impl RequestBody {
    pub fn with_schema(schema: Schema, content_types: &[&str]) -> Self {
        let mut content = BTreeMap::new();
        for ct in content_types {
            content.insert(ct.to_string(), MediaType {
                schema: schema.clone(),
            });
        }
        Self {
            description: None,
            required: false,
            content,
        }
    }
}

/// OpenAPI MediaType object.
#[derive(Debug, Clone, Serialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Response object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, MediaType>,
}

impl Response {
    pub fn with_schema(schema: Schema, content_type: &str) -> Self {
        let mut content = BTreeMap::new();
        content.insert(content_type.to_string(), MediaType { schema });
        Self {
            description: String::new(),
            content,
        }
    }
}

/// OpenAPI Components object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Components {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, Schema>,
    #[serde(
        rename = "securitySchemes",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

impl Components {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.security_schemes.is_empty()
    }
}

/// OpenAPI SecurityScheme object. Deserialized from the configuration file
/// and copied into the document verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(
        default,
        rename = "bearerFormat",
        skip_serializing_if = "Option::is_none"
    )]
    pub bearer_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<serde_json::Value>,
}

/// A single enum member attached to a schema: constant name, concrete value
/// and the documentation text that accompanied the declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumItem {
    pub key: String,
    pub value: serde_json::Value,
    pub description: String,
}

impl EnumItem {
    pub fn new(key: &str, value: serde_json::Value, description: &str) -> Self {
        Self {
            key: key.to_string(),
            value,
            description: description.to_string(),
        }
    }
}

/// Internal tag recording the higher-level shape of a schema. Used during
/// analysis and specialization; never serialized.
#[derive(Debug, Clone)]
pub enum ExtendedTypeInfo {
    /// Plain object with known properties.
    Object,
    /// Array whose item schema is known.
    Array { items: Box<Schema> },
    /// String-keyed map with a known value schema.
    Map { value: Box<Schema> },
    /// Instantiation of a generic schema: reference plus ordered arguments.
    Specific {
        schema: Box<Schema>,
        args: Vec<Schema>,
    },
    /// Placeholder for the n-th formal type parameter of the enclosing
    /// generic definition.
    Param { index: usize },
    /// Enum carrier with its collected items.
    Enum { items: Vec<EnumItem> },
}

/// OpenAPI Schema object plus analysis-internal state.
///
/// A schema with a non-empty `reference` carries no substantive fields of
/// its own besides `summary` and `description`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Box<Schema>>,

    /// Component key this schema was registered under, if any.
    #[serde(skip)]
    pub key: String,
    /// Extended type info; dropped at serialization freeze.
    #[serde(skip)]
    pub ext: Option<ExtendedTypeInfo>,
    /// Set on clones produced by the generic specializer.
    #[serde(skip)]
    pub specialized_from_generic: bool,
}

impl Schema {
    pub fn new_ref(key: &str) -> Self {
        Self {
            reference: ref_component_schemas(key),
            ..Self::default()
        }
    }

    pub fn new_object() -> Self {
        Self {
            schema_type: TYPE_OBJECT.to_string(),
            ext: Some(ExtendedTypeInfo::Object),
            ..Self::default()
        }
    }

    /// Untyped object: the degradation target for interfaces, trait objects
    /// and anything the builder cannot resolve.
    pub fn new_any() -> Self {
        Self {
            schema_type: TYPE_OBJECT.to_string(),
            ..Self::default()
        }
    }

    pub fn new_array(items: Schema) -> Self {
        Self {
            schema_type: TYPE_ARRAY.to_string(),
            items: Some(Box::new(items.clone())),
            ext: Some(ExtendedTypeInfo::Array {
                items: Box::new(items),
            }),
            ..Self::default()
        }
    }

    pub fn new_map(value: Schema) -> Self {
        Self {
            schema_type: TYPE_OBJECT.to_string(),
            additional_properties: Some(Box::new(value.clone())),
            ext: Some(ExtendedTypeInfo::Map {
                value: Box::new(value),
            }),
            ..Self::default()
        }
    }

    pub fn new_bool() -> Self {
        Self {
            schema_type: TYPE_BOOLEAN.to_string(),
            ..Self::default()
        }
    }

    pub fn new_string() -> Self {
        Self {
            schema_type: TYPE_STRING.to_string(),
            ..Self::default()
        }
    }

    pub fn new_int32() -> Self {
        Self {
            schema_type: TYPE_INTEGER.to_string(),
            format: "int32".to_string(),
            ..Self::default()
        }
    }

    pub fn new_int64() -> Self {
        Self {
            schema_type: TYPE_INTEGER.to_string(),
            format: "int64".to_string(),
            ..Self::default()
        }
    }

    pub fn new_float() -> Self {
        Self {
            schema_type: TYPE_NUMBER.to_string(),
            format: "float".to_string(),
            ..Self::default()
        }
    }

    pub fn new_double() -> Self {
        Self {
            schema_type: TYPE_NUMBER.to_string(),
            format: "double".to_string(),
            ..Self::default()
        }
    }

    pub fn new_bytes() -> Self {
        Self {
            schema_type: TYPE_STRING.to_string(),
            format: "byte".to_string(),
            ..Self::default()
        }
    }

    pub fn new_date_time() -> Self {
        Self {
            schema_type: TYPE_STRING.to_string(),
            format: "date-time".to_string(),
            ..Self::default()
        }
    }

    pub fn new_uuid() -> Self {
        Self {
            schema_type: TYPE_STRING.to_string(),
            format: "uuid".to_string(),
            ..Self::default()
        }
    }

    pub fn new_type_param(index: usize) -> Self {
        Self {
            ext: Some(ExtendedTypeInfo::Param { index }),
            ..Self::default()
        }
    }

    /// Usage-site marker for a generic instantiation. The carried schema is
    /// a reference to the generic component; the arguments are resolved into
    /// a specialization by the normalizer.
    pub fn new_specific(generic: Schema, args: Vec<Schema>) -> Self {
        Self {
            ext: Some(ExtendedTypeInfo::Specific {
                schema: Box::new(generic),
                args,
            }),
            ..Self::default()
        }
    }

    pub fn with_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        if !description.is_empty() {
            self.description = Some(description.to_string());
        }
        self
    }

    pub fn with_property(mut self, name: &str, property: Schema) -> Self {
        self.properties.insert(name.to_string(), property);
        self
    }

    /// Identity used for mangled specialization keys. References use their
    /// component key; generic instantiations compose recursively; inline
    /// schemas fall back to a structural name.
    pub fn get_key(&self) -> String {
        if let Some(ExtendedTypeInfo::Specific { schema, args }) = &self.ext {
            let mut key = schema.get_key();
            if !args.is_empty() {
                key.push('[');
                key.push_str(&args[0].get_key());
                for arg in &args[1..] {
                    key.push(',');
                    key.push_str(&arg.get_key());
                }
                key.push(']');
            }
            return key;
        }
        if !self.reference.is_empty() {
            return self
                .reference
                .trim_start_matches("#/components/schemas/")
                .to_string();
        }
        if !self.key.is_empty() {
            return self.key.clone();
        }
        if self.schema_type == TYPE_ARRAY {
            if let Some(items) = &self.items {
                return format!("[]{}", items.get_key());
            }
        }
        if self.schema_type.is_empty() {
            return TYPE_OBJECT.to_string();
        }
        if self.format.is_empty() {
            self.schema_type.clone()
        } else {
            format!("{}_{}", self.schema_type, self.format)
        }
    }

    /// Folds collected enum items into the description as an HTML table and
    /// fills the `enum` array. Called during the serialization freeze.
    pub fn bake_enum_items(&mut self) {
        let items = match &self.ext {
            Some(ExtendedTypeInfo::Enum { items }) if !items.is_empty() => items.clone(),
            _ => return,
        };
        if self.enum_values.is_empty() {
            self.enum_values = items.iter().map(|i| i.value.clone()).collect();
        }
        let mut desc = self.description.clone().unwrap_or_default();
        if !desc.is_empty() {
            desc.push_str("\n\n");
        }
        desc.push_str("<table><tr><th>Value</th><th>Key</th><th>Description</th></tr>");
        for item in &items {
            let value = match &item.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            desc.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                value, item.key, item.description
            ));
        }
        desc.push_str("</table>");
        self.description = Some(desc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_schema_serializes_reference_only() {
        let schema = Schema::new_ref("shop.Goods");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"$ref": "#/components/schemas/shop.Goods"})
        );
    }

    #[test]
    fn test_primitive_schema_formats() {
        assert_eq!(Schema::new_int32().format, "int32");
        assert_eq!(Schema::new_int64().format, "int64");
        assert_eq!(Schema::new_double().schema_type, "number");
        assert_eq!(Schema::new_bytes().format, "byte");
    }

    #[test]
    fn test_get_key_for_refs_and_primitives() {
        assert_eq!(Schema::new_ref("pkg.Goods").get_key(), "pkg.Goods");
        assert_eq!(Schema::new_string().get_key(), "string");
        assert_eq!(Schema::new_int64().get_key(), "integer_int64");
        let arr = Schema::new_array(Schema::new_ref("pkg.Goods"));
        assert_eq!(arr.get_key(), "[]pkg.Goods");
    }

    #[test]
    fn test_bake_enum_items_builds_table() {
        let mut schema = Schema::new_int32();
        schema.ext = Some(ExtendedTypeInfo::Enum {
            items: vec![
                EnumItem::new("CodeNotFound", serde_json::json!(10000), "not found"),
                EnumItem::new("CodeUnknown", serde_json::json!(10001), ""),
            ],
        });
        schema.bake_enum_items();
        assert_eq!(
            schema.enum_values,
            vec![serde_json::json!(10000), serde_json::json!(10001)]
        );
        let desc = schema.description.unwrap();
        assert!(desc.contains("<table>"));
        assert!(desc.contains("<td>10000</td><td>CodeNotFound</td><td>not found</td>"));
    }

    #[test]
    fn test_path_item_operation_slots() {
        let mut item = PathItem::default();
        *item.operation_mut("GET").unwrap() = Some(Operation::default());
        *item.operation_mut("post").unwrap() = Some(Operation::default());
        assert!(item.get.is_some());
        assert!(item.post.is_some());
        assert_eq!(item.operations_mut().len(), 2);
        assert!(item.operation_mut("SUBSCRIBE").is_none());
    }

    #[test]
    fn test_operation_skips_empty_collections() {
        let op = Operation::default();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json, serde_json::json!({"responses": {}}));
    }
}
