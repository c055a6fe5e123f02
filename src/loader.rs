//! Package loading.
//!
//! Turns a project directory into package groups: every `.rs` file is
//! parsed, attributed to its owning crate (nearest enclosing `Cargo.toml`)
//! and to a Rust module path derived from its location under `src/`. The
//! main module record is synthesized by walking parent directories of the
//! requested path until a manifest is found.

use crate::parser::{AstParser, ParsedFile};
use crate::scanner::FileScanner;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A crate participating in the analysis.
#[derive(Debug)]
pub struct Module {
    /// Crate name from the manifest (directory name for virtual manifests).
    pub name: String,
    /// Directory containing the manifest.
    pub dir: PathBuf,
}

/// One Rust module within a crate; the unit definitions are keyed by.
#[derive(Debug)]
pub struct Package {
    /// Fully-qualified module path, e.g. `server::views`.
    pub path: String,
    pub module: Rc<Module>,
}

/// A parsed source file plus its import table.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub ast: syn::File,
    /// `use` imports: bare name to fully-qualified path.
    pub imports: HashMap<String, String>,
    /// Prefixes of glob imports (`use foo::bar::*`).
    pub glob_imports: Vec<String>,
}

/// A package together with the files that make it up.
#[derive(Debug)]
pub struct LoadedPackage {
    pub package: Rc<Package>,
    pub files: Vec<Rc<SourceFile>>,
}

/// All packages loaded for one run, with the main module marked.
#[derive(Debug)]
pub struct PackageGroup {
    pub main: Rc<Module>,
    pub packages: Vec<LoadedPackage>,
}

impl PackageGroup {
    /// Whether a package belongs to the module under analysis (as opposed
    /// to a whitelisted dependency crate found in the same tree).
    pub fn is_owned(&self, package: &Package) -> bool {
        package.module.dir == self.main.dir
    }
}

pub struct PackageLoader {
    dir: PathBuf,
}

impl PackageLoader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Loads the project at the configured directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory does not exist, no manifest is found in it
    /// or any parent directory, or the manifest cannot be read.
    pub fn load(&self) -> Result<Vec<PackageGroup>> {
        let dir = self
            .dir
            .canonicalize()
            .with_context(|| format!("invalid package path: {}", self.dir.display()))?;

        let main_manifest = lookup_manifest(&dir)
            .ok_or_else(|| anyhow!("Cargo.toml not found in {} or any parent", dir.display()))?;
        let scan_root = main_manifest.parent().unwrap().to_path_buf();
        debug!("main manifest: {}", main_manifest.display());

        let scan = FileScanner::new(scan_root).scan()?;
        if scan.rust_files.is_empty() {
            bail!("no Rust files found under {}", self.dir.display());
        }

        // Crate records, most deeply nested first so nearest-manifest
        // attribution picks workspace members over the workspace root.
        let mut modules: Vec<Rc<Module>> = Vec::new();
        for manifest in &scan.manifests {
            modules.push(Rc::new(parse_manifest(manifest)?));
        }
        modules.sort_by_key(|m| std::cmp::Reverse(m.dir.components().count()));

        let main = modules
            .iter()
            .find(|m| Some(m.dir.as_path()) == main_manifest.parent())
            .cloned()
            .ok_or_else(|| anyhow!("failed to resolve module for {}", main_manifest.display()))?;

        let parse_results = AstParser::parse_files(&scan.rust_files);
        let mut packages: HashMap<String, LoadedPackage> = HashMap::new();
        let mut package_order: Vec<String> = Vec::new();

        for parsed in parse_results.into_iter().flatten() {
            let Some(module) = owning_module(&modules, &parsed.path) else {
                debug!("no owning crate for {}", parsed.path.display());
                continue;
            };
            let Some(pkg_path) = module_path(&module, &parsed.path) else {
                debug!("skipping non-module file {}", parsed.path.display());
                continue;
            };

            let source = Rc::new(build_source_file(parsed));
            let entry = packages.entry(pkg_path.clone()).or_insert_with(|| {
                package_order.push(pkg_path.clone());
                LoadedPackage {
                    package: Rc::new(Package {
                        path: pkg_path.clone(),
                        module: module.clone(),
                    }),
                    files: Vec::new(),
                }
            });
            entry.files.push(source);
        }

        let group = PackageGroup {
            main,
            packages: package_order
                .into_iter()
                .filter_map(|key| packages.remove(&key))
                .collect(),
        };
        debug!("loaded {} packages", group.packages.len());

        Ok(vec![group])
    }
}

/// Walks parent directories until a `Cargo.toml` is found.
pub fn lookup_manifest(dir: &Path) -> Option<PathBuf> {
    let mut current = Some(dir);
    while let Some(dir) = current {
        let manifest = dir.join("Cargo.toml");
        if manifest.is_file() {
            return Some(manifest);
        }
        current = dir.parent();
    }
    None
}

fn parse_manifest(manifest: &Path) -> Result<Module> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("failed to read {}", manifest.display()))?;
    let value: toml::Value = content
        .parse()
        .with_context(|| format!("failed to parse {}", manifest.display()))?;

    let dir = manifest.parent().unwrap().to_path_buf();
    let name = match value
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
    {
        Some(name) => name.replace('-', "_"),
        None => {
            // Virtual workspace manifest; only relevant as a scan anchor.
            let fallback = dir
                .file_name()
                .map(|n| n.to_string_lossy().replace('-', "_"))
                .unwrap_or_else(|| "crate".to_string());
            warn!(
                "{} has no [package] name, using '{}'",
                manifest.display(),
                fallback
            );
            fallback
        }
    };

    Ok(Module { name, dir })
}

/// Nearest enclosing crate of a file. `modules` is sorted deepest-first.
fn owning_module(modules: &[Rc<Module>], file: &Path) -> Option<Rc<Module>> {
    modules
        .iter()
        .find(|m| file.starts_with(&m.dir))
        .cloned()
}

/// Derives the Rust module path of a file from its location under `src/`.
/// Files outside `src/` (tests, benches, build scripts) return `None`.
fn module_path(module: &Module, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(&module.dir).ok()?;
    let mut components: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if components.first() != Some(&"src") {
        return None;
    }
    components.remove(0);
    let file_name = components.pop()?;
    if components.first() == Some(&"bin") {
        return None;
    }

    let mut path = vec![module.name.as_str()];
    path.extend(components.iter().copied());

    match file_name.strip_suffix(".rs") {
        Some("lib") | Some("main") | Some("mod") => {}
        Some(stem) => path.push(stem),
        None => return None,
    }
    Some(path.join("::"))
}

fn build_source_file(parsed: ParsedFile) -> SourceFile {
    let mut imports = HashMap::new();
    let mut glob_imports = Vec::new();
    collect_imports(&parsed.syntax_tree.items, &mut imports, &mut glob_imports);
    SourceFile {
        path: parsed.path,
        ast: parsed.syntax_tree,
        imports,
        glob_imports,
    }
}

fn collect_imports(
    items: &[syn::Item],
    imports: &mut HashMap<String, String>,
    globs: &mut Vec<String>,
) {
    for item in items {
        match item {
            syn::Item::Use(item_use) => {
                collect_use_tree(&item_use.tree, &mut Vec::new(), imports, globs);
            }
            syn::Item::Mod(item_mod) => {
                if let Some((_, items)) = &item_mod.content {
                    collect_imports(items, imports, globs);
                }
            }
            _ => {}
        }
    }
}

fn collect_use_tree(
    tree: &syn::UseTree,
    prefix: &mut Vec<String>,
    imports: &mut HashMap<String, String>,
    globs: &mut Vec<String>,
) {
    match tree {
        syn::UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            collect_use_tree(&path.tree, prefix, imports, globs);
            prefix.pop();
        }
        syn::UseTree::Name(name) => {
            let ident = name.ident.to_string();
            let mut full = prefix.clone();
            full.push(ident.clone());
            imports.insert(ident, full.join("::"));
        }
        syn::UseTree::Rename(rename) => {
            let mut full = prefix.clone();
            full.push(rename.ident.to_string());
            imports.insert(rename.rename.to_string(), full.join("::"));
        }
        syn::UseTree::Glob(_) => {
            globs.push(prefix.join("::"));
        }
        syn::UseTree::Group(group) => {
            for item in &group.items {
                collect_use_tree(item, prefix, imports, globs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_project(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_load_single_crate() {
        let temp = TempDir::new().unwrap();
        write_project(
            temp.path(),
            &[
                ("Cargo.toml", "[package]\nname = \"server\"\n"),
                ("src/main.rs", "fn main() {}"),
                ("src/views.rs", "pub struct Goods { pub name: String }"),
                ("src/handlers/mod.rs", "pub fn list() {}"),
                ("src/handlers/shop.rs", "pub fn info() {}"),
            ],
        );

        let groups = PackageLoader::new(temp.path().to_path_buf()).load().unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.main.name, "server");

        let mut paths: Vec<&str> = group
            .packages
            .iter()
            .map(|p| p.package.path.as_str())
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["server", "server::handlers", "server::handlers::shop", "server::views"]
        );
        assert!(group.packages.iter().all(|p| group.is_owned(&p.package)));
    }

    #[test]
    fn test_load_from_nested_directory_walks_to_manifest() {
        let temp = TempDir::new().unwrap();
        write_project(
            temp.path(),
            &[
                ("Cargo.toml", "[package]\nname = \"server\"\n"),
                ("src/lib.rs", "pub fn root() {}"),
            ],
        );

        let groups = PackageLoader::new(temp.path().join("src"))
            .load()
            .unwrap();
        assert_eq!(groups[0].main.name, "server");
        assert_eq!(groups[0].packages.len(), 1);
    }

    #[test]
    fn test_load_missing_manifest_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("main.rs"), "fn main() {}").unwrap();
        // The temp dir has no manifest, but a parent outside the sandboxed
        // tree might; anchor the walk by asserting on the error message only
        // when the load fails.
        if let Err(err) = PackageLoader::new(temp.path().to_path_buf()).load() {
            assert!(format!("{:#}", err).contains("Cargo.toml"));
        }
    }

    #[test]
    fn test_workspace_members_are_distinct_modules() {
        let temp = TempDir::new().unwrap();
        write_project(
            temp.path(),
            &[
                ("Cargo.toml", "[package]\nname = \"server\"\n"),
                ("src/main.rs", "fn main() {}"),
                ("shared/Cargo.toml", "[package]\nname = \"shared-types\"\n"),
                ("shared/src/lib.rs", "pub struct Page { pub total: i64 }"),
            ],
        );

        let groups = PackageLoader::new(temp.path().to_path_buf()).load().unwrap();
        let group = &groups[0];

        let shared = group
            .packages
            .iter()
            .find(|p| p.package.path == "shared_types")
            .unwrap();
        assert!(!group.is_owned(&shared.package));
        assert_eq!(shared.package.module.name, "shared_types");
    }

    #[test]
    fn test_imports_collected_per_file() {
        let temp = TempDir::new().unwrap();
        write_project(
            temp.path(),
            &[
                ("Cargo.toml", "[package]\nname = \"server\"\n"),
                (
                    "src/lib.rs",
                    "use tide::Request;\nuse crate::views::{Goods, Page as GoodsPage};\nuse serde::*;\npub mod views;\n",
                ),
                ("src/views.rs", "pub struct Goods;\npub struct Page;\n"),
            ],
        );

        let groups = PackageLoader::new(temp.path().to_path_buf()).load().unwrap();
        let root = groups[0]
            .packages
            .iter()
            .find(|p| p.package.path == "server")
            .unwrap();
        let file = &root.files[0];
        assert_eq!(file.imports.get("Request").unwrap(), "tide::Request");
        assert_eq!(file.imports.get("Goods").unwrap(), "crate::views::Goods");
        assert_eq!(file.imports.get("GoodsPage").unwrap(), "crate::views::Page");
        assert_eq!(file.glob_imports, vec!["serde".to_string()]);
    }
}
