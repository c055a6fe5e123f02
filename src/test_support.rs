//! Shared helpers for unit tests: builds a throwaway project on disk,
//! loads it and wires up a `Shared` state the way the analyzer does.

use crate::context::{Context, Shared};
use crate::definitions::index_package_group;
use crate::diagnostics::Diagnostics;
use crate::environment::Environment;
use crate::loader::{PackageGroup, PackageLoader};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

pub struct Fixture {
    // Keeps the on-disk project alive for the duration of the test.
    _temp: TempDir,
    pub group: PackageGroup,
    pub shared: Shared,
}

/// Writes the given files, loads the project and indexes definitions.
/// A `Cargo.toml` naming the crate `server` is added when absent.
pub fn fixture(files: &[(&str, &str)]) -> Fixture {
    let temp = TempDir::new().unwrap();
    if !files.iter().any(|(path, _)| *path == "Cargo.toml") {
        fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"server\"\n",
        )
        .unwrap();
    }
    for (path, content) in files {
        let full = temp.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    let groups = PackageLoader::new(temp.path().to_path_buf()).load().unwrap();
    let group = groups.into_iter().next().unwrap();
    let definitions = index_package_group(&group, &[]);

    let shared = Shared {
        definitions: Rc::new(RefCell::new(definitions)),
        diagnostics: Rc::new(RefCell::new(Diagnostics::new(false))),
        ..Shared::default()
    };

    Fixture {
        _temp: temp,
        group,
        shared,
    }
}

/// A context positioned at the first file of the named package.
pub fn context_for(fixture: &Fixture, pkg_path: &str) -> Context {
    let loaded = fixture
        .group
        .packages
        .iter()
        .find(|p| p.package.path == pkg_path)
        .unwrap_or_else(|| panic!("package {} not loaded", pkg_path));
    Context::new(
        fixture.shared.clone(),
        loaded.package.clone(),
        loaded.files[0].clone(),
        Environment::new(),
    )
}
