//! Serde attribute parsing.
//!
//! Field naming and visibility in the generated schemas follow the same
//! attributes serde itself honors: `rename`, `rename_all`, `skip`,
//! `skip_serializing`, `flatten` and `default`.

use syn::Attribute;

/// Serde attributes collected from a field or variant.
#[derive(Debug, Clone, Default)]
pub struct SerdeAttrs {
    /// Renamed name from `#[serde(rename = "...")]`.
    pub rename: Option<String>,
    /// Field is skipped entirely.
    pub skip: bool,
    /// Field is flattened into the container.
    pub flatten: bool,
    /// Field has a default and is therefore not required.
    pub default: bool,
}

/// Container-level serde attributes.
#[derive(Debug, Clone, Default)]
pub struct SerdeContainerAttrs {
    /// Case convention from `#[serde(rename_all = "...")]`.
    pub rename_all: Option<String>,
}

/// Parses the serde attributes of a field or enum variant.
pub fn parse_serde_attrs(attrs: &[Attribute]) -> SerdeAttrs {
    let mut out = SerdeAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if let Ok(value) = meta.value() {
                    if let Ok(lit) = value.parse::<syn::LitStr>() {
                        out.rename = Some(lit.value());
                    }
                }
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                out.skip = true;
            } else if meta.path.is_ident("flatten") {
                out.flatten = true;
            } else if meta.path.is_ident("default") {
                out.default = true;
                // `default = "path"` carries a value; consume it if present.
                if let Ok(value) = meta.value() {
                    let _ = value.parse::<syn::LitStr>();
                }
            } else if meta.input.peek(syn::token::Eq) {
                // Unknown key-value entry (e.g. `with`, `serialize_with`).
                let _ = meta.value().and_then(|v| v.parse::<syn::Expr>());
            }
            Ok(())
        });
    }
    out
}

/// Parses the container-level serde attributes of a struct or enum.
pub fn parse_serde_container_attrs(attrs: &[Attribute]) -> SerdeContainerAttrs {
    let mut out = SerdeContainerAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if let Ok(value) = meta.value() {
                    if let Ok(lit) = value.parse::<syn::LitStr>() {
                        out.rename_all = Some(lit.value());
                    }
                }
            } else if meta.input.peek(syn::token::Eq) {
                let _ = meta.value().and_then(|v| v.parse::<syn::Expr>());
            }
            Ok(())
        });
    }
    out
}

/// Applies a `rename_all` convention to an identifier the way serde does.
pub fn apply_rename_all(convention: &str, name: &str) -> String {
    match convention {
        "lowercase" => name.to_lowercase(),
        "UPPERCASE" => name.to_uppercase(),
        "snake_case" => to_snake_case(name),
        "SCREAMING_SNAKE_CASE" => to_snake_case(name).to_uppercase(),
        "kebab-case" => to_snake_case(name).replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => to_snake_case(name).to_uppercase().replace('_', "-"),
        "camelCase" => to_camel_case(name),
        "PascalCase" => to_pascal_case(name),
        _ => name.to_string(),
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn to_camel_case(name: &str) -> String {
    let pascal = to_pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => pascal,
    }
}

fn to_pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
