//! Stylesheet compilation.
//!
//! SCSS sources are compiled with grass, then lightningcss adds vendor
//! prefixes for the configured browser targets and minifies. Each entry
//! stylesheet `app.scss` produces:
//!
//! - `app.css`: compiled and prefixed, readable
//! - `app.min.css`: minified, ending in a `sourceMappingURL` comment
//! - `app.min.css.map`: source map from `app.min.css` back to `app.css`
//!
//! The map covers only the lightningcss step: its sources point at `app.css`,
//! not at the `.scss` files grass compiled it from.
//!
//! Files whose names start with `_` are partials and only reach the output
//! through imports.

use std::fs;
use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use serde::Deserialize;

use crate::copy::{collect, SourceFile};
use crate::error::AssetError;
use crate::output::{emit, map_path, OutputFile};
use crate::paths::Paths;

/// Style compiler settings, read from `styles.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Minify the `.min.css` output
    pub minify: bool,

    /// Emit a source map beside the `.min.css` output
    pub source_map: bool,

    /// Extra directories searched by `@use` and `@import`, relative to the project root
    pub load_paths: Vec<PathBuf>,

    /// Oldest browser versions to prefix for
    pub targets: BrowserTargets,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            minify: true,
            source_map: true,
            load_paths: Vec::new(),
            targets: BrowserTargets::recommended(),
        }
    }
}

/// Major browser versions to support. Unset browsers are not targeted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrowserTargets {
    pub android: Option<u32>,
    pub chrome: Option<u32>,
    pub edge: Option<u32>,
    pub firefox: Option<u32>,
    pub ie: Option<u32>,
    pub ios_saf: Option<u32>,
    pub opera: Option<u32>,
    pub safari: Option<u32>,
    pub samsung: Option<u32>,
}

impl BrowserTargets {
    /// Targets used when no configuration is given.
    pub fn recommended() -> Self {
        Self {
            chrome: Some(90),
            edge: Some(90),
            firefox: Some(88),
            ios_saf: Some(14),
            safari: Some(14),
            samsung: Some(14),
            ..Self::default()
        }
    }

    fn browsers(&self) -> Browsers {
        // lightningcss encodes versions as major << 16 | minor << 8 | patch.
        let version = |v: Option<u32>| v.map(|major| major << 16);

        Browsers {
            android: version(self.android),
            chrome: version(self.chrome),
            edge: version(self.edge),
            firefox: version(self.firefox),
            ie: version(self.ie),
            ios_saf: version(self.ios_saf),
            opera: version(self.opera),
            safari: version(self.safari),
            samsung: version(self.samsung),
            ..Browsers::default()
        }
    }
}

impl StyleConfig {
    /// Load settings from `path`, falling back to defaults if it does not exist.
    ///
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AssetError::read(path, e))?;
        let config: StyleConfig = toml::from_str(&content).map_err(|e| {
            AssetError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::debug!("Loaded style config from {}", path.display());

        Ok(config)
    }
}

/// Result of compiling one stylesheet.
#[derive(Debug, Clone)]
pub struct CompiledStyle {
    /// Prefixed, readable CSS
    pub expanded: String,

    /// Minified CSS, including the source map comment when a map exists
    pub minified: String,

    /// Source map JSON
    pub source_map: Option<String>,
}

/// SCSS compiler with post-processing.
pub struct StyleCompiler {
    config: StyleConfig,
    load_paths: Vec<PathBuf>,
}

impl StyleCompiler {
    /// Create a compiler; relative load paths resolve against `root`.
    pub fn new(config: StyleConfig, root: &Path) -> Self {
        let load_paths = config.load_paths.iter().map(|p| root.join(p)).collect();
        Self { config, load_paths }
    }

    fn targets(&self) -> Targets {
        Targets::from(self.config.targets.browsers())
    }

    /// Compile an SCSS file to plain CSS.
    pub fn compile_scss(&self, path: &Path) -> Result<String, AssetError> {
        let mut options = grass::Options::default();
        for load_path in &self.load_paths {
            options = options.load_path(load_path);
        }

        grass::from_path(path, &options).map_err(|e| AssetError::style(path, e.to_string()))
    }

    /// Prefix and minify compiled CSS.
    ///
    /// `file_name` is the name the readable output is written under; the
    /// source map refers to it.
    pub fn finish(&self, file_name: &str, css: &str) -> Result<CompiledStyle, String> {
        let mut stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: file_name.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| format!("CSS parse error: {}", e))?;

        stylesheet
            .minify(MinifyOptions {
                targets: self.targets(),
                ..MinifyOptions::default()
            })
            .map_err(|e| format!("CSS transform error: {}", e))?;

        let expanded = stylesheet
            .to_css(PrinterOptions {
                targets: self.targets(),
                ..PrinterOptions::default()
            })
            .map_err(|e| format!("CSS print error: {}", e))?
            .code;

        // Minify from the readable output so the map points into it.
        let mut minified_sheet = StyleSheet::parse(
            &expanded,
            ParserOptions {
                filename: file_name.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| format!("CSS parse error: {}", e))?;

        minified_sheet
            .minify(MinifyOptions {
                targets: self.targets(),
                ..MinifyOptions::default()
            })
            .map_err(|e| format!("CSS transform error: {}", e))?;

        let mut source_map = if self.config.source_map {
            let mut map = SourceMap::new("/");
            map.add_source(file_name);
            map.set_source_content(0, &expanded)
                .map_err(|e| format!("Source map error: {:?}", e))?;
            Some(map)
        } else {
            None
        };

        let mut minified = minified_sheet
            .to_css(PrinterOptions {
                minify: self.config.minify,
                targets: self.targets(),
                source_map: source_map.as_mut(),
                ..PrinterOptions::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?
            .code;
        drop(minified_sheet);

        let source_map = match source_map {
            Some(mut map) => Some(
                map.to_json(None)
                    .map_err(|e| format!("Source map error: {:?}", e))?,
            ),
            None => None,
        };

        if source_map.is_some() {
            let min_name = min_file_name(file_name);
            minified.push_str(&format!(
                "\n/*# sourceMappingURL={} */",
                map_path(Path::new(&min_name)).display()
            ));
        }

        Ok(CompiledStyle {
            expanded,
            minified,
            source_map,
        })
    }

    /// Compile one entry stylesheet into its output records.
    pub fn outputs(&self, entry: &SourceFile) -> Result<Vec<OutputFile>, AssetError> {
        let css = self.compile_scss(&entry.path)?;

        let expanded_path = entry.relative.with_extension("css");
        let minified_path = entry.relative.with_extension("min.css");
        let file_name = expanded_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("style.css")
            .to_string();

        let compiled = self
            .finish(&file_name, &css)
            .map_err(|message| AssetError::style(&entry.path, message))?;

        let mut minified = OutputFile::new(minified_path, compiled.minified);
        if let Some(source_map) = compiled.source_map {
            minified = minified.with_source_map(source_map);
        }

        Ok(vec![OutputFile::new(expanded_path, compiled.expanded), minified])
    }
}

/// `app.css` -> `app.min.css`.
fn min_file_name(file_name: &str) -> String {
    match file_name.strip_suffix(".css") {
        Some(stem) => format!("{}.min.css", stem),
        None => format!("{}.min.css", file_name),
    }
}

/// Minify a standalone stylesheet.
pub fn minify_css(css: &str) -> Result<String, String> {
    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {}", e))?;

    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| format!("CSS transform error: {}", e))?;

    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..Default::default()
        })
        .map_err(|e| format!("CSS minify error: {}", e))?;

    Ok(minified.code)
}

/// Entry stylesheets: every SCSS file that is not a `_partial`.
pub fn entries(paths: &Paths) -> Result<Vec<SourceFile>, AssetError> {
    Ok(collect(&paths.src.scss)?
        .into_iter()
        .filter(|f| {
            !f.path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('_'))
        })
        .collect())
}

/// Compile every entry stylesheet into output records.
pub fn style_outputs(paths: &Paths) -> Result<Vec<OutputFile>, AssetError> {
    let config = StyleConfig::load(&paths.config.styles)?;
    let compiler = StyleCompiler::new(config, &paths.root);

    let mut files = Vec::new();
    for entry in entries(paths)? {
        tracing::debug!("Compiling {}", entry.path.display());
        files.extend(compiler.outputs(&entry)?);
    }

    Ok(files)
}

/// Compile stylesheets into the CSS output directory.
pub fn compile_styles(paths: &Paths) -> Result<usize, AssetError> {
    let files = style_outputs(paths)?;
    emit(&paths.dist.css, &files)
}
