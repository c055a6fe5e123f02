//! Project directory scanning.
//!
//! Walks the analyzed project tree and collects Rust sources together with
//! every `Cargo.toml` manifest, so the loader can attribute each file to its
//! owning crate. Build output (`target/`) and hidden directories are
//! skipped.

use anyhow::Result;
use log::warn;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Recursive scanner for the analyzed source tree.
pub struct FileScanner {
    root_path: PathBuf,
}

/// Result of a directory scan.
pub struct ScanResult {
    /// All discovered `.rs` files.
    pub rust_files: Vec<PathBuf>,
    /// All discovered `Cargo.toml` manifests.
    pub manifests: Vec<PathBuf>,
    /// Warnings for entries that could not be accessed.
    pub warnings: Vec<String>,
}

impl FileScanner {
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Scans the tree and collects sources and manifests.
    ///
    /// Inaccessible entries are recorded as warnings and skipped; the scan
    /// itself only fails when the root directory cannot be read.
    pub fn scan(&self) -> Result<ScanResult> {
        let mut rust_files = Vec::new();
        let mut manifests = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.path() == self.root_path {
                    return true;
                }
                let file_name = e.file_name().to_string_lossy();
                !(file_name.starts_with('.') || (e.file_type().is_dir() && file_name == "target"))
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    if path.extension().and_then(|s| s.to_str()) == Some("rs") {
                        rust_files.push(path.to_path_buf());
                    } else if path.file_name().and_then(|s| s.to_str()) == Some("Cargo.toml") {
                        manifests.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult {
            rust_files,
            manifests,
            warnings,
        })
    }
}
