//! The path convention table.
//!
//! Every directory and glob the pipeline touches is declared here, relative
//! to a project root. Tasks never build paths of their own.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::AssetError;

/// Glob matching options: `*` stays within one path segment, `**` crosses them.
pub const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A directory and the glob selecting its files.
#[derive(Debug, Clone)]
pub struct Location {
    /// Directory on disk
    pub dir: PathBuf,

    /// Directory relative to the project root
    relative: &'static str,

    /// Glob relative to `dir`
    glob: &'static str,
}

impl Location {
    fn new(root: &Path, relative: &'static str, glob: &'static str) -> Self {
        Self {
            dir: root.join(relative),
            relative,
            glob,
        }
    }

    /// Directory relative to the project root.
    pub fn relative(&self) -> &str {
        self.relative
    }

    /// Glob relative to the location's directory.
    pub fn glob(&self) -> &str {
        self.glob
    }

    /// Glob selecting this location's files, relative to the project root.
    pub fn files(&self) -> String {
        format!("{}/{}", self.relative, self.glob)
    }

    /// Compiled matcher for paths relative to the location's directory.
    pub fn matcher(&self) -> Result<Pattern, AssetError> {
        compile(self.glob)
    }

    /// Compiled matcher for paths relative to the project root.
    pub fn root_matcher(&self) -> Result<Pattern, AssetError> {
        compile(&self.files())
    }
}

/// Compile a glob pattern.
pub fn compile(pattern: &str) -> Result<Pattern, AssetError> {
    Pattern::new(pattern).map_err(|e| AssetError::PatternError {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Configuration files read by transforms.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Style compiler settings
    pub styles: PathBuf,
}

/// Project-level files.
#[derive(Debug, Clone)]
pub struct BasePaths {
    /// Installed packages
    pub node_modules: PathBuf,

    /// Package manifest listing vendor dependencies
    pub package_json: PathBuf,

    /// Dependency lock file, removed before every build
    pub package_lock: PathBuf,
}

/// Build output locations.
#[derive(Debug, Clone)]
pub struct DistPaths {
    pub base: Location,
    pub libs: PathBuf,
    pub css: PathBuf,
    pub js: PathBuf,
    pub images: PathBuf,
    pub fonts: PathBuf,
}

/// Source locations.
#[derive(Debug, Clone)]
pub struct SrcPaths {
    pub base: Location,
    pub fonts: Location,
    pub images: Location,
    pub js: Location,
    pub scss: Location,
    pub html: Location,
    pub partials: Location,
}

/// The full path table for one project root.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
    pub config: ConfigPaths,
    pub base: BasePaths,
    pub dist: DistPaths,
    pub src: SrcPaths,
}

impl Paths {
    /// Build the table for a project root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();

        Self {
            config: ConfigPaths {
                styles: root.join("styles.toml"),
            },
            base: BasePaths {
                node_modules: root.join("node_modules"),
                package_json: root.join("package.json"),
                package_lock: root.join("package-lock.json"),
            },
            dist: DistPaths {
                base: Location::new(&root, "dist", "**/*"),
                libs: root.join("dist/assets/libs"),
                css: root.join("dist/assets/css"),
                js: root.join("dist/assets/js"),
                images: root.join("dist/assets/images"),
                fonts: root.join("dist/assets/fonts"),
            },
            src: SrcPaths {
                base: Location::new(&root, "src", "**/*"),
                fonts: Location::new(&root, "src/assets/fonts", "**/*"),
                images: Location::new(&root, "src/assets/images", "**/*"),
                js: Location::new(&root, "src/assets/js", "*.js"),
                scss: Location::new(&root, "src/assets/scss", "**/*.scss"),
                html: Location::new(&root, "src", "**/*.html"),
                partials: Location::new(&root, "src/partials", "**/*"),
            },
            root,
        }
    }

    /// Check the table against the filesystem.
    ///
    /// The project root and source tree must exist. The output directory
    /// must either be a directory or not exist yet.
    pub fn validate(&self) -> Result<(), AssetError> {
        if !self.root.is_dir() {
            return Err(AssetError::ConfigError(format!(
                "Project root not found: {}",
                self.root.display()
            )));
        }

        if !self.src.base.dir.is_dir() {
            return Err(AssetError::ConfigError(format!(
                "Source directory not found: {}",
                self.src.base.dir.display()
            )));
        }

        let dist = &self.dist.base.dir;
        if dist.exists() && !dist.is_dir() {
            return Err(AssetError::ConfigError(format!(
                "Output path exists and is not a directory: {}",
                dist.display()
            )));
        }

        for location in self.locations() {
            location.matcher()?;
        }

        Ok(())
    }

    /// Every glob-bearing location in the table.
    pub fn locations(&self) -> [&Location; 8] {
        [
            &self.dist.base,
            &self.src.base,
            &self.src.fonts,
            &self.src.images,
            &self.src.js,
            &self.src.scss,
            &self.src.html,
            &self.src.partials,
        ]
    }

    /// Strip the project root from a path.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }

    /// Directories the preview server tries, in order.
    pub fn preview_roots(&self) -> Vec<PathBuf> {
        vec![
            self.dist.base.dir.clone(),
            self.src.base.dir.clone(),
            self.root.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn resolves_locations_under_root() {
        let paths = Paths::new("/site");

        assert_eq!(paths.src.scss.dir, PathBuf::from("/site/src/assets/scss"));
        assert_eq!(paths.src.scss.files(), "src/assets/scss/**/*.scss");
        assert_eq!(paths.dist.css, PathBuf::from("/site/dist/assets/css"));
        assert_eq!(
            paths.base.package_lock,
            PathBuf::from("/site/package-lock.json")
        );
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let paths = Paths::new("/site");
        let js = paths.src.js.root_matcher().unwrap();

        assert!(js.matches_path_with(Path::new("src/assets/js/app.js"), MATCH_OPTIONS));
        assert!(!js.matches_path_with(Path::new("src/assets/js/vendor/x.js"), MATCH_OPTIONS));
    }

    #[test]
    fn double_star_matches_top_level_files() {
        let paths = Paths::new("/site");
        let html = paths.src.html.root_matcher().unwrap();

        assert!(html.matches_path_with(Path::new("src/index.html"), MATCH_OPTIONS));
        assert!(html.matches_path_with(Path::new("src/pages/about.html"), MATCH_OPTIONS));
        assert!(!html.matches_path_with(Path::new("src/assets/scss/a.scss"), MATCH_OPTIONS));
    }

    #[test]
    fn validate_requires_source_directory() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());

        assert!(matches!(paths.validate(), Err(AssetError::ConfigError(_))));

        fs::create_dir_all(temp.path().join("src")).unwrap();
        paths.validate().unwrap();
    }

    #[test]
    fn validate_rejects_file_as_output_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("dist"), "not a dir").unwrap();

        let paths = Paths::new(temp.path());

        assert!(paths.validate().is_err());
    }

    #[test]
    fn preview_roots_fall_back_in_order() {
        let paths = Paths::new("/site");

        assert_eq!(
            paths.preview_roots(),
            vec![
                PathBuf::from("/site/dist"),
                PathBuf::from("/site/src"),
                PathBuf::from("/site"),
            ]
        );
    }
}
