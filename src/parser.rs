//! Source file parsing.
//!
//! Thin wrapper over [`syn::parse_file`]. Individual files that fail to
//! parse are reported as warnings so a project with a broken file still
//! yields partial documentation.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub struct AstParser;

/// A successfully parsed source file.
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub syntax_tree: syn::File,
}

impl AstParser {
    /// Parses a single Rust source file into an AST.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid
    /// Rust syntax.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read file: {}", path.display()))?;

        let syntax_tree = syn::parse_file(&content)
            .with_context(|| format!("failed to parse Rust syntax in {}", path.display()))?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            syntax_tree,
        })
    }

    /// Parses a batch of files, tolerating per-file failures.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| {
                AstParser::parse_file(path).map_err(|e| {
                    warn!("failed to parse {}: {:#}", path.display(), e);
                    e
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(
            "parsed {} files, {} failed",
            results.len() - failed,
            failed
        );
        results
    }
}
