//! Glob-driven file copying.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::AssetError;
use crate::paths::{Location, Paths, MATCH_OPTIONS};

/// A file selected for copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,

    /// Path relative to the directory it was collected from
    pub relative: PathBuf,
}

/// Walk `dir` in a stable order, yielding every file.
pub fn walk_files(dir: &Path) -> Result<Vec<SourceFile>, AssetError> {
    let mut files = Vec::new();

    if !dir.exists() {
        return Ok(files);
    }

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| AssetError::read(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path).to_path_buf();

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative,
        });
    }

    Ok(files)
}

/// Files of a location matching its glob.
pub fn collect(location: &Location) -> Result<Vec<SourceFile>, AssetError> {
    let matcher = location.matcher()?;

    Ok(walk_files(&location.dir)?
        .into_iter()
        .filter(|f| matcher.matches_path_with(&f.relative, MATCH_OPTIONS))
        .collect())
}

/// Copy files into `dest`, keeping their relative paths.
///
/// Returns the number of files copied.
pub fn copy_files(files: &[SourceFile], dest: &Path) -> Result<usize, AssetError> {
    files
        .par_iter()
        .map(|file| {
            let target = dest.join(&file.relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| AssetError::write(parent, e))?;
            }
            fs::copy(&file.path, &target).map_err(|e| AssetError::write(&target, e))?;
            Ok(())
        })
        .collect::<Result<Vec<()>, AssetError>>()
        .map(|copied| copied.len())
}

/// Copy a location's matching files into `dest`.
pub fn copy_location(location: &Location, dest: &Path) -> Result<usize, AssetError> {
    let files = collect(location)?;
    let count = copy_files(&files, dest)?;

    tracing::debug!(
        "Copied {} files from {} to {}",
        count,
        location.files(),
        dest.display()
    );

    Ok(count)
}

/// Copy source images.
pub fn copy_images(paths: &Paths) -> Result<usize, AssetError> {
    copy_location(&paths.src.images, &paths.dist.images)
}

/// Copy source fonts.
pub fn copy_fonts(paths: &Paths) -> Result<usize, AssetError> {
    copy_location(&paths.src.fonts, &paths.dist.fonts)
}

/// Copy top-level source scripts.
pub fn copy_scripts(paths: &Paths) -> Result<usize, AssetError> {
    copy_location(&paths.src.js, &paths.dist.js)
}

/// Source files no other transform owns.
///
/// Partials, stylesheets, images and fonts are skipped as whole trees;
/// scripts and HTML pages are skipped where their globs match.
pub fn misc_files(paths: &Paths) -> Result<Vec<SourceFile>, AssetError> {
    let owned_dirs = [
        &paths.src.partials.dir,
        &paths.src.scss.dir,
        &paths.src.images.dir,
        &paths.src.fonts.dir,
    ];
    let scripts = paths.src.js.root_matcher()?;
    let pages = paths.src.html.root_matcher()?;

    Ok(walk_files(&paths.src.base.dir)?
        .into_iter()
        .filter(|f| !owned_dirs.iter().any(|dir| f.path.starts_with(dir)))
        .filter(|f| {
            let relative = paths.relative(&f.path).unwrap_or(&f.path);
            !scripts.matches_path_with(relative, MATCH_OPTIONS)
                && !pages.matches_path_with(relative, MATCH_OPTIONS)
        })
        .collect())
}

/// Copy source files no other transform owns.
pub fn copy_misc(paths: &Paths) -> Result<usize, AssetError> {
    let files = misc_files(paths)?;
    copy_files(&files, &paths.dist.base.dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.display().to_string()).unwrap();
    }

    #[test]
    fn copies_images_recursively() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        touch(&paths.src.images.dir.join("logo.png"));
        touch(&paths.src.images.dir.join("icons/star.svg"));

        let count = copy_images(&paths).unwrap();

        assert_eq!(count, 2);
        assert!(paths.dist.images.join("icons/star.svg").exists());
    }

    #[test]
    fn copies_only_top_level_scripts() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        touch(&paths.src.js.dir.join("app.js"));
        touch(&paths.src.js.dir.join("pages/home.js"));
        touch(&paths.src.js.dir.join("notes.txt"));

        let count = copy_scripts(&paths).unwrap();

        assert_eq!(count, 1);
        assert!(paths.dist.js.join("app.js").exists());
        assert!(!paths.dist.js.join("pages/home.js").exists());
    }

    #[test]
    fn missing_source_directory_copies_nothing() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());

        assert_eq!(copy_fonts(&paths).unwrap(), 0);
    }

    #[test]
    fn misc_copy_skips_files_owned_by_other_transforms() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        let src = &paths.src.base.dir;
        touch(&src.join("favicon.ico"));
        touch(&src.join("data/menu.json"));
        touch(&src.join("index.html"));
        touch(&src.join("partials/head.html"));
        touch(&src.join("assets/scss/app.scss"));
        touch(&src.join("assets/js/app.js"));
        touch(&src.join("assets/images/a.png"));
        touch(&src.join("assets/fonts/a.woff2"));

        let files: Vec<PathBuf> = misc_files(&paths)
            .unwrap()
            .into_iter()
            .map(|f| f.relative)
            .collect();

        assert_eq!(
            files,
            vec![PathBuf::from("data/menu.json"), PathBuf::from("favicon.ico")]
        );
    }
}
