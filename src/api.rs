//! API entries and document assembly.
//!
//! An [`Api`] is one discovered operation: HTTP method, full path and the
//! operation metadata accumulated while interpreting the handler. The
//! assembler registers finished entries into the document: path items,
//! document tags, operation-id deduplication, and path parameters implied
//! by the URL template.

use crate::comment::Comment;
use crate::context::Shared;
use crate::schema::{
    Operation, Parameter, PathItem, RequestBody, Response, Schema, SecurityRequirement,
    MIME_FORM_DATA, MIME_JSON,
};
use log::debug;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Operation metadata under construction.
#[derive(Debug, Clone, Default)]
pub struct ApiSpec {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
    pub security: Vec<SecurityRequirement>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, Response>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub deprecated: bool,
}

/// One discovered API operation.
#[derive(Debug, Clone)]
pub struct Api {
    pub method: String,
    pub full_path: String,
    pub spec: ApiSpec,
}

impl Api {
    pub fn new(method: &str, full_path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            full_path: full_path.to_string(),
            spec: ApiSpec::default(),
        }
    }

    /// Applies a comment stack, outermost first. Tags and security
    /// requirements accumulate across levels (security entries are ORed);
    /// scalar metadata is overwritten so the innermost comment wins.
    pub fn load_from_comments(&mut self, stack: &[Rc<Comment>]) {
        for comment in stack {
            for tag in comment.tags() {
                if !self.spec.tags.contains(tag) {
                    self.spec.tags.push(tag.clone());
                }
            }
            for requirement in comment.security() {
                if !self.spec.security.contains(requirement) {
                    self.spec.security.push(requirement.clone());
                }
            }
            if let Some(summary) = comment.summary() {
                self.spec.summary = Some(summary);
            }
            if let Some(description) = comment.description() {
                self.spec.description = Some(description);
            }
            if let Some(id) = comment.id() {
                self.spec.operation_id = Some(id.to_string());
            }
            if !comment.consumes().is_empty() {
                self.spec.consumes = comment.consumes().to_vec();
            }
            if !comment.produces().is_empty() {
                self.spec.produces = comment.produces().to_vec();
            }
            if comment.deprecated() {
                self.spec.deprecated = true;
            }
        }
    }

    /// Adds a parameter, replacing any existing one with the same name and
    /// location.
    pub fn add_parameter(&mut self, param: Parameter) {
        self.spec
            .parameters
            .retain(|p| !(p.name == param.name && p.location == param.location));
        self.spec.parameters.push(param);
    }

    pub fn add_response(&mut self, status: u16, response: Response) {
        self.spec.responses.insert(status.to_string(), response);
    }

    /// Request payload content type: an explicit `@consume` wins, else
    /// form data for bodyless-by-convention methods and JSON otherwise.
    pub fn default_request_content_type(&self) -> String {
        if let Some(first) = self.spec.consumes.first() {
            return first.clone();
        }
        match self.method.as_str() {
            "GET" | "HEAD" => MIME_FORM_DATA.to_string(),
            _ => MIME_JSON.to_string(),
        }
    }

    fn to_operation(&self) -> Operation {
        Operation {
            tags: self.spec.tags.clone(),
            summary: self.spec.summary.clone(),
            description: self.spec.description.clone(),
            operation_id: self.spec.operation_id.clone(),
            parameters: self.spec.parameters.clone(),
            request_body: self.spec.request_body.clone(),
            responses: self.spec.responses.clone(),
            deprecated: self.spec.deprecated,
            security: self.spec.security.clone(),
        }
    }

    pub fn apply_to_path_item(&self, item: &mut PathItem) {
        match item.operation_mut(&self.method) {
            Some(slot) => *slot = Some(self.to_operation()),
            None => debug!("unsupported HTTP method {}", self.method),
        }
    }
}

/// Registers a finished API into the shared route table and document.
pub fn register_api(shared: &Shared, mut api: Api) {
    // Every placeholder in the URL template must be covered by a path
    // parameter; synthesize string parameters for the missing ones.
    for placeholder in path_placeholders(&api.full_path) {
        let covered = api
            .spec
            .parameters
            .iter()
            .any(|p| p.location == "path" && p.name == placeholder);
        if !covered {
            api.spec
                .parameters
                .push(Parameter::path(&placeholder).with_schema(Schema::new_string()));
        }
    }

    // Deduplicate operation ids with a numeric suffix.
    if let Some(base) = api.spec.operation_id.clone() {
        let mut id = base.clone();
        let mut counter = 2;
        while !shared.used_operation_ids.borrow_mut().insert(id.clone()) {
            id = format!("{}~{}", base, counter);
            counter += 1;
        }
        api.spec.operation_id = Some(id);
    }

    let mut doc = shared.doc.borrow_mut();
    for tag in &api.spec.tags {
        doc.add_tag(tag);
    }
    let item = doc.paths.entry(api.full_path.clone()).or_default();
    api.apply_to_path_item(item);
    drop(doc);

    debug!("registered API {} {}", api.method, api.full_path);
    shared.apis.borrow_mut().push(api);
}

/// Names of `{placeholder}` segments in a path template.
pub fn path_placeholders(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(str::to_string)
        })
        .collect()
}

/// Joins a route-group prefix with a local path, normalizing slashes.
pub fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, path)
    };
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}
