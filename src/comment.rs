//! Documentation comment parsing.
//!
//! Doc comments on files, functions and types carry a small directive
//! language that feeds operation metadata:
//!
//! ```text
//! /// GoodsCreate creates a goods record
//! /// @summary Create goods
//! /// @tags Goods Shop
//! /// @consume application/json
//! /// @produce application/json
//! /// @security oauth2 goods:read goods:write
//! /// @id goods.create
//! /// @deprecated
//! ```
//!
//! `@ignore` is a hard gate: the annotated node and everything beneath it is
//! excluded from analysis. Untagged lines contribute the summary (first
//! line) and description.

use crate::schema::SecurityRequirement;
use syn::Attribute;

/// Parsed content of one documentation block.
#[derive(Debug, Clone, Default)]
pub struct Comment {
    text_lines: Vec<String>,
    tags: Vec<String>,
    summary: Option<String>,
    description: Option<String>,
    id: Option<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    security: Vec<SecurityRequirement>,
    deprecated: bool,
    required: bool,
    ignore: bool,
}

impl Comment {
    /// Parses the `#[doc]` attributes of a node (outer `///` comments or
    /// inner `//!` comments on a file).
    pub fn parse_attrs(attrs: &[Attribute]) -> Self {
        Self::parse_lines(doc_lines(attrs))
    }

    /// Parses raw documentation lines.
    pub fn parse_lines(lines: Vec<String>) -> Self {
        let mut comment = Comment::default();
        let mut continuation: Option<Continuation> = None;

        for raw in lines {
            let line = raw.trim();
            if let Some(rest) = line.strip_prefix('@') {
                continuation = None;
                let (directive, arg) = match rest.split_once(char::is_whitespace) {
                    Some((d, a)) => (d, a.trim()),
                    None => (rest, ""),
                };
                match directive {
                    "tags" => comment
                        .tags
                        .extend(arg.split_whitespace().map(str::to_string)),
                    "summary" => {
                        comment.summary = Some(arg.to_string());
                        continuation = Some(Continuation::Summary);
                    }
                    "description" => {
                        comment.description = Some(arg.to_string());
                        continuation = Some(Continuation::Description);
                    }
                    "id" => comment.id = Some(arg.to_string()),
                    "consume" => comment.consumes.push(arg.to_string()),
                    "produce" => comment.produces.push(arg.to_string()),
                    "security" => {
                        let mut parts = arg.split_whitespace();
                        if let Some(scheme) = parts.next() {
                            let mut requirement = SecurityRequirement::new();
                            requirement
                                .insert(scheme.to_string(), parts.map(str::to_string).collect());
                            comment.security.push(requirement);
                        }
                    }
                    "deprecated" => comment.deprecated = true,
                    "required" => comment.required = true,
                    "ignore" => comment.ignore = true,
                    _ => log::debug!("unknown comment directive @{}", directive),
                }
            } else if line.is_empty() {
                continuation = None;
            } else {
                match continuation {
                    Some(Continuation::Summary) => {
                        if let Some(summary) = &mut comment.summary {
                            summary.push(' ');
                            summary.push_str(line);
                        }
                    }
                    Some(Continuation::Description) => {
                        if let Some(description) = &mut comment.description {
                            description.push('\n');
                            description.push_str(line);
                        }
                    }
                    None => comment.text_lines.push(line.to_string()),
                }
            }
        }
        comment
    }

    /// Whether the annotated node is excluded from analysis.
    pub fn ignore(&self) -> bool {
        self.ignore
    }

    pub fn deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn consumes(&self) -> &[String] {
        &self.consumes
    }

    pub fn produces(&self) -> &[String] {
        &self.produces
    }

    pub fn security(&self) -> &[SecurityRequirement] {
        &self.security
    }

    /// The untagged documentation text.
    pub fn text(&self) -> String {
        self.text_lines.join("\n")
    }

    /// Explicit `@summary`, else the first untagged line.
    pub fn summary(&self) -> Option<String> {
        if self.summary.is_some() {
            return self.summary.clone();
        }
        self.text_lines.first().cloned()
    }

    /// Explicit `@description`, else the untagged lines after the first.
    pub fn description(&self) -> Option<String> {
        if self.description.is_some() {
            return self.description.clone();
        }
        if self.text_lines.len() > 1 {
            return Some(self.text_lines[1..].join("\n"));
        }
        None
    }
}

enum Continuation {
    Summary,
    Description,
}

/// Extracts the string lines of every `#[doc]` attribute.
pub fn doc_lines(attrs: &[Attribute]) -> Vec<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let syn::Meta::NameValue(nv) = &attr.meta {
            if let syn::Expr::Lit(expr_lit) = &nv.value {
                if let syn::Lit::Str(lit) = &expr_lit.lit {
                    lines.push(lit.value());
                }
            }
        }
    }
    lines
}
