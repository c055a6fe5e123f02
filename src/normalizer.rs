//! Schema normalization and generic specialization.
//!
//! The analysis phase records generic instantiations as data: a `specific`
//! marker holding a reference to the generic template and the concrete
//! argument schemas. This post-pass walks every component schema and every
//! operation's request/response content, substitutes `type-param` markers
//! with the corresponding arguments, and emits each specialization into
//! `components/schemas` under a stable mangled key
//! (`<generic-key>[<arg-key>,…]`). A set of in-progress keys forces a
//! reference-return on re-entry, which keeps cyclic generic types finite.
//!
//! The pass finishes by freezing the document for serialization: enum
//! tables are folded into descriptions and extended type info is dropped
//! everywhere.

use crate::schema::{Document, ExtendedTypeInfo, Schema};
use log::debug;
use std::collections::HashSet;

pub struct SchemaNormalizer {
    doc: Document,
    /// Specialization keys currently being materialized.
    seen: HashSet<String>,
    errors: Vec<String>,
}

/// Normalizes a document. Returns the normalized document and any
/// specialization errors (missing type-param arguments and the like).
pub fn normalize(doc: Document) -> (Document, Vec<String>) {
    SchemaNormalizer::new(doc).run()
}

impl SchemaNormalizer {
    fn new(doc: Document) -> Self {
        Self {
            doc,
            seen: HashSet::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> (Document, Vec<String>) {
        // Component schemas that are themselves generic instantiations.
        let keys: Vec<String> = self.doc.components.schemas.keys().cloned().collect();
        for key in keys {
            let schema = self.doc.components.schemas.get(&key).cloned();
            let Some(schema) = schema else { continue };
            if !schema.reference.is_empty() {
                continue;
            }
            if let Some(ExtendedTypeInfo::Specific { schema: target, args }) = &schema.ext {
                debug!("specializing component {}", key);
                let processed = self.process(target, args);
                self.doc.components.schemas.insert(key, processed);
            }
        }

        // Request and response content of every operation.
        let mut paths = std::mem::take(&mut self.doc.paths);
        for item in paths.values_mut() {
            for operation in item.operations_mut() {
                for response in operation.responses.values_mut() {
                    for media_type in response.content.values_mut() {
                        media_type.schema = self.process_schema(media_type.schema.clone());
                    }
                }
                if let Some(request_body) = &mut operation.request_body {
                    for media_type in request_body.content.values_mut() {
                        media_type.schema = self.process_schema(media_type.schema.clone());
                    }
                }
            }
        }
        self.doc.paths = paths;

        self.freeze();
        (self.doc, self.errors)
    }

    /// Expands a usage-site schema when it carries a `specific` marker;
    /// leaves everything else untouched.
    fn process_schema(&mut self, schema: Schema) -> Schema {
        if !schema.reference.is_empty() {
            return schema;
        }
        match &schema.ext {
            Some(ExtendedTypeInfo::Specific { schema: target, args }) => {
                let (target, args) = (target.clone(), args.clone());
                self.process(&target, &args)
            }
            _ => schema,
        }
    }

    /// Substitutes `args` into the schema behind `reference` and emits the
    /// specialization. Returns the replacement for the usage site.
    fn process(&mut self, reference: &Schema, args: &[Schema]) -> Schema {
        let resolved = self.doc.unref(reference).clone();
        let ext = resolved.ext.clone();
        let is_ref = !reference.reference.is_empty();

        // Plain references with nothing to substitute stay as they are.
        let parameterized = matches!(ext, Some(ExtendedTypeInfo::Specific { .. }))
            || contains_type_param(&resolved);
        if is_ref && !parameterized {
            return reference.clone();
        }
        if is_ref && args.is_empty() {
            self.errors.push(format!(
                "missing type arguments for {}",
                reference.get_key()
            ));
            return reference.clone();
        }

        let specific_key = mangled_key(&reference.get_key(), args);
        if is_ref {
            if self.doc.components.schemas.contains_key(&specific_key)
                || !self.seen.insert(specific_key.clone())
            {
                return Schema::new_ref(&specific_key);
            }
        }

        let mut res = resolved;
        res.specialized_from_generic = true;

        match ext {
            // An instantiation of another generic: merge the outer
            // arguments into the inner ones and recurse.
            Some(ExtendedTypeInfo::Specific {
                schema: inner,
                args: inner_args,
            }) => {
                let merged = self.merge_args(&inner_args, args);
                let processed = self.process(&inner, &merged);
                if is_ref {
                    self.seen.remove(&specific_key);
                    self.doc
                        .components
                        .schemas
                        .insert(specific_key.clone(), processed.clone());
                    return Schema::new_ref(&specific_key);
                }
                return processed;
            }
            Some(ExtendedTypeInfo::Param { index }) => {
                let substituted = match args.get(index) {
                    Some(arg) => self.resolve_arg(arg),
                    None => {
                        self.errors
                            .push(format!("missing argument for type parameter {}", index));
                        Schema::new_any()
                    }
                };
                if is_ref {
                    self.seen.remove(&specific_key);
                }
                return substituted;
            }
            _ => {}
        }

        if let Some(items) = res.items.take() {
            res.items = Some(Box::new(self.process(&items, args)));
        }
        if let Some(additional) = res.additional_properties.take() {
            res.additional_properties = Some(Box::new(self.process(&additional, args)));
        }
        let properties = std::mem::take(&mut res.properties);
        for (name, property) in properties {
            let processed = self.process(&property, args);
            res.properties.insert(name, processed);
        }

        if is_ref {
            self.seen.remove(&specific_key);
            res.key = specific_key.clone();
            self.doc
                .components
                .schemas
                .insert(specific_key.clone(), res);
            return Schema::new_ref(&specific_key);
        }
        res
    }

    /// An argument may itself be a generic instantiation; expand it before
    /// substituting.
    fn resolve_arg(&mut self, arg: &Schema) -> Schema {
        if let Some(ExtendedTypeInfo::Specific { schema, args }) = &arg.ext {
            let (schema, args) = (schema.clone(), args.clone());
            return self.process(&schema, &args);
        }
        arg.clone()
    }

    /// Inner arguments that are themselves `type-param` markers take the
    /// outer argument at their index.
    fn merge_args(&mut self, inner: &[Schema], outer: &[Schema]) -> Vec<Schema> {
        inner
            .iter()
            .map(|arg| match &arg.ext {
                Some(ExtendedTypeInfo::Param { index }) => match outer.get(*index) {
                    Some(outer_arg) => outer_arg.clone(),
                    None => {
                        self.errors
                            .push(format!("missing argument for type parameter {}", index));
                        Schema::new_any()
                    }
                },
                _ => arg.clone(),
            })
            .collect()
    }

    /// Serialization freeze: bake enum tables, drop extended type info.
    fn freeze(&mut self) {
        let keys: Vec<String> = self.doc.components.schemas.keys().cloned().collect();
        for key in keys {
            if let Some(mut schema) = self.doc.components.schemas.remove(&key) {
                freeze_schema(&mut schema);
                self.doc.components.schemas.insert(key, schema);
            }
        }

        let mut paths = std::mem::take(&mut self.doc.paths);
        for item in paths.values_mut() {
            for operation in item.operations_mut() {
                for parameter in &mut operation.parameters {
                    freeze_schema(&mut parameter.schema);
                }
                if let Some(request_body) = &mut operation.request_body {
                    for media_type in request_body.content.values_mut() {
                        freeze_schema(&mut media_type.schema);
                    }
                }
                for response in operation.responses.values_mut() {
                    for media_type in response.content.values_mut() {
                        freeze_schema(&mut media_type.schema);
                    }
                }
            }
        }
        self.doc.paths = paths;
    }
}

fn freeze_schema(schema: &mut Schema) {
    schema.bake_enum_items();
    schema.ext = None;
    if let Some(items) = &mut schema.items {
        freeze_schema(items);
    }
    if let Some(additional) = &mut schema.additional_properties {
        freeze_schema(additional);
    }
    for property in schema.properties.values_mut() {
        freeze_schema(property);
    }
}

/// Whether a schema tree still carries `type-param` markers.
fn contains_type_param(schema: &Schema) -> bool {
    match &schema.ext {
        Some(ExtendedTypeInfo::Param { .. }) => return true,
        Some(ExtendedTypeInfo::Specific { args, .. }) => {
            if args.iter().any(contains_type_param) {
                return true;
            }
        }
        _ => {}
    }
    if let Some(items) = &schema.items {
        if contains_type_param(items) {
            return true;
        }
    }
    if let Some(additional) = &schema.additional_properties {
        if contains_type_param(additional) {
            return true;
        }
    }
    schema.properties.values().any(contains_type_param)
}

/// `<key>[<arg-key>,…]`; the bare key when there are no arguments.
fn mangled_key(key: &str, args: &[Schema]) -> String {
    if args.is_empty() {
        return key.to_string();
    }
    let mut out = String::from(key);
    out.push('[');
    out.push_str(&args[0].get_key());
    for arg in &args[1..] {
        out.push(',');
        out.push_str(&arg.get_key());
    }
    out.push(']');
    out
}
