//! openapi-analyzer - OpenAPI 3.0.3 documentation from Rust web projects
//! by static analysis.
//!
//! The analyzer parses a project with `syn`, indexes every function and
//! named type, interprets route registrations and handler bodies through
//! framework plugins, and assembles a complete OpenAPI document.
//!
//! # Pipeline
//!
//! 1. [`scanner`] / [`parser`] / [`loader`] - discover and parse sources,
//!    attribute them to crates and module paths
//! 2. [`definitions`] - index functions, types and enum-like constants
//! 3. [`analyzer`] - walk files and feed nodes to the mounted [`plugins`]
//! 4. [`schema_builder`] - translate types into component schemas
//! 5. [`normalizer`] - specialize generic instantiations, freeze for
//!    serialization
//! 6. [`cli`] - merge configuration, write `openapi.json`
//!
//! # Example
//!
//! ```no_run
//! use openapi_analyzer::analyzer::Analyzer;
//! use openapi_analyzer::normalizer;
//! use openapi_analyzer::plugins::tide::TidePlugin;
//! use std::path::Path;
//!
//! let mut analyzer = Analyzer::new().plugin(Box::new(TidePlugin::new()));
//! analyzer.process(Path::new("./my-service")).unwrap();
//! let (doc, _errors) = normalizer::normalize(analyzer.document());
//! println!("{} paths", doc.paths.len());
//! ```

pub mod analyzer;
pub mod api;
pub mod attrs;
pub mod call_rule;
pub mod cli;
pub mod comment;
pub mod config;
pub mod context;
pub mod custom_rules;
pub mod definitions;
pub mod diagnostics;
pub mod environment;
pub mod generators;
pub mod loader;
pub mod normalizer;
pub mod param_parser;
pub mod parser;
pub mod plugins;
pub mod rust_type;
pub mod scanner;
pub mod schema;
pub mod schema_builder;

#[cfg(test)]
pub(crate) mod test_support;
