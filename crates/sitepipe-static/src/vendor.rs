//! Vendor library copying.
//!
//! Runtime dependencies listed in `package.json` are copied from
//! `node_modules` into the output's `assets/libs` directory. A package with a
//! `dist/` directory contributes only that directory, flattened one level;
//! otherwise the whole package is copied minus documentation, tests, sources
//! and manifests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Deserialize;

use crate::copy::{copy_files, walk_files, SourceFile};
use crate::error::AssetError;
use crate::paths::{compile, Paths, MATCH_OPTIONS};

/// Files never copied from a package, matched at any depth.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "*.map",
    "src/**/*",
    "examples/**/*",
    "example/**/*",
    "demo/**/*",
    "spec/**/*",
    "docs/**/*",
    "tests/**/*",
    "test/**/*",
    "Gruntfile.js",
    "gulpfile.js",
    "package.json",
    "package-lock.json",
    "bower.json",
    "composer.json",
    "yarn.lock",
    "webpack.config.js",
    "README",
    "LICENSE",
    "CHANGELOG",
    "*.yml",
    "*.md",
    "*.coffee",
    "*.ts",
    "*.scss",
    "*.less",
];

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
}

/// Names of the runtime dependencies declared in `package.json`.
///
/// A missing manifest declares none.
pub fn dependencies(paths: &Paths) -> Result<Vec<String>, AssetError> {
    let manifest = &paths.base.package_json;
    if !manifest.exists() {
        tracing::debug!("No {} found, skipping vendor libraries", manifest.display());
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(manifest).map_err(|e| AssetError::read(manifest, e))?;
    let parsed: PackageManifest = serde_json::from_str(&content).map_err(|e| {
        AssetError::ConfigError(format!("Failed to parse {}: {}", manifest.display(), e))
    })?;

    Ok(parsed.dependencies.into_keys().collect())
}

fn excludes() -> Result<Vec<Pattern>, AssetError> {
    DEFAULT_EXCLUDES
        .iter()
        .map(|e| compile(&format!("**/{}", e)))
        .collect()
}

/// Files of one package, with destination paths relative to the libs directory.
pub fn package_files(package_dir: &Path, name: &str) -> Result<Vec<SourceFile>, AssetError> {
    let dist = package_dir.join("dist");
    let dest = PathBuf::from(name);

    if dist.is_dir() {
        return Ok(walk_files(&dist)?
            .into_iter()
            .map(|f| SourceFile {
                relative: dest.join(&f.relative),
                path: f.path,
            })
            .collect());
    }

    let excludes = excludes()?;

    Ok(walk_files(package_dir)?
        .into_iter()
        .filter(|f| {
            !excludes
                .iter()
                .any(|p| p.matches_path_with(&f.relative, MATCH_OPTIONS))
        })
        .map(|f| SourceFile {
            relative: dest.join(&f.relative),
            path: f.path,
        })
        .collect())
}

/// Locate the installed file behind a path under the libs output directory.
///
/// Applies the layout [`package_files`] produces in reverse, so a page can
/// reference `assets/libs/<package>/…` before anything has been copied.
/// Scoped packages (`@scope/name`) span two components.
pub fn locate(paths: &Paths, relative: &Path) -> Option<PathBuf> {
    let mut components = relative.components();
    let first = components.next()?.as_os_str();

    let package = if first.to_str()?.starts_with('@') {
        Path::new(first).join(components.next()?.as_os_str())
    } else {
        PathBuf::from(first)
    };
    let rest = components.as_path();

    let package_dir = paths.base.node_modules.join(package);
    let dist = package_dir.join("dist");
    let candidate = if dist.is_dir() {
        dist.join(rest)
    } else {
        package_dir.join(rest)
    };

    candidate.is_file().then_some(candidate)
}

/// Every vendor file to copy.
pub fn vendor_files(paths: &Paths) -> Result<Vec<SourceFile>, AssetError> {
    let mut files = Vec::new();

    for name in dependencies(paths)? {
        let package_dir = paths.base.node_modules.join(&name);
        if !package_dir.is_dir() {
            tracing::warn!(
                "Dependency {} is not installed in {}",
                name,
                paths.base.node_modules.display()
            );
            continue;
        }

        files.extend(package_files(&package_dir, &name)?);
    }

    Ok(files)
}

/// Copy vendor libraries into the output.
pub fn copy_vendor_libs(paths: &Paths) -> Result<usize, AssetError> {
    let files = vendor_files(paths)?;
    copy_files(&files, &paths.dist.libs)
}
