//! HTML assembly.
//!
//! References into `node_modules` are pointed at the copied vendor libraries,
//! and build blocks are concatenated:
//!
//! ```html
//! <!-- build:css assets/css/vendor.min.css -->
//! <link rel="stylesheet" href="assets/libs/a/a.css">
//! <link rel="stylesheet" href="assets/libs/b/b.css">
//! <!-- endbuild -->
//! ```
//!
//! becomes a single `<link>` to `assets/css/vendor.min.css`, which holds the
//! minified concatenation of both files. `build:js` blocks work the same way
//! with `<script src>` tags and are minified with oxc.
//!
//! [`finish_page`] produces the final markup of a page and is applied when
//! pages are expanded. [`assemble_html`] writes only the bundle files. Bundle
//! inputs are read from the source tree and `node_modules`, never from the
//! build output, so the result does not depend on which other steps have
//! already run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AssetError;
use crate::output::{emit, normalize, OutputFile};
use crate::paths::Paths;
use crate::scripts::minify_js;
use crate::styles::minify_css;
use crate::templates::{expand_page, pages, TemplateExpander};
use crate::vendor;

/// Kind of assets a build block concatenates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Css,
    Js,
}

/// A `<!-- build:… -->` block found in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildBlock {
    pub kind: BlockKind,

    /// Output file, relative to the page
    pub target: String,

    /// Referenced asset URLs, in document order
    pub assets: Vec<String>,
}

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*build:(css|js)\s+(\S+)\s*-->(.*?)<!--\s*endbuild\s*-->")
        .expect("Invalid build block regex")
});

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).expect("Invalid href regex"));

static SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="([^"]+)""#).expect("Invalid src regex"));

// At most ten characters of relative prefix before `node_modules`.
static VENDOR_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(.{0,10})node_modules"#).expect("Invalid vendor href regex")
});

static VENDOR_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"src="(.{0,10})node_modules"#).expect("Invalid vendor src regex")
});

/// Point `node_modules` references at the copied vendor libraries.
pub fn rewrite_vendor_refs(html: &str) -> String {
    let html = VENDOR_HREF_RE.replace_all(html, r#"href="${1}assets/libs"#);
    VENDOR_SRC_RE
        .replace_all(&html, r#"src="${1}assets/libs"#)
        .into_owned()
}

/// Find the build blocks of a page.
pub fn parse_blocks(html: &str) -> Vec<BuildBlock> {
    BLOCK_RE
        .captures_iter(html)
        .map(|caps| {
            let kind = if &caps[1] == "css" {
                BlockKind::Css
            } else {
                BlockKind::Js
            };
            let attr = match kind {
                BlockKind::Css => &HREF_RE,
                BlockKind::Js => &SRC_RE,
            };

            BuildBlock {
                kind,
                target: caps[2].to_string(),
                assets: attr
                    .captures_iter(&caps[3])
                    .map(|c| c[1].to_string())
                    .collect(),
            }
        })
        .collect()
}

/// Collapse every build block into a single tag pointing at its bundle.
pub fn replace_blocks(html: &str) -> String {
    BLOCK_RE
        .replace_all(html, |caps: &regex::Captures| {
            let target = &caps[2];
            if &caps[1] == "css" {
                format!(r#"<link rel="stylesheet" href="{}">"#, target)
            } else {
                format!(r#"<script src="{}"></script>"#, target)
            }
        })
        .into_owned()
}

/// Final markup of an expanded page.
pub fn finish_page(html: &str) -> String {
    replace_blocks(&rewrite_vendor_refs(html))
}

/// Builds the bundles of one project.
pub struct HtmlAssembler<'a> {
    paths: &'a Paths,
    libs: PathBuf,
}

impl<'a> HtmlAssembler<'a> {
    pub fn new(paths: &'a Paths) -> Self {
        let libs = paths
            .dist
            .libs
            .strip_prefix(&paths.dist.base.dir)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self { paths, libs }
    }

    /// Locate a referenced asset on disk.
    ///
    /// Vendor library paths map back into `node_modules`; anything else is
    /// looked up in the source tree, then under the project root.
    /// Root-relative URLs skip the page directory.
    fn resolve(&self, page_dir: &Path, url: &str) -> Option<PathBuf> {
        if url.contains("://") || url.starts_with("//") {
            return None;
        }

        let url = url.split(['?', '#']).next().unwrap_or(url);
        let (relative, page_dir) = match url.strip_prefix('/') {
            Some(rest) => (rest, Path::new("")),
            None => (url, page_dir),
        };
        let relative = normalize(&page_dir.join(relative));

        if let Ok(library) = relative.strip_prefix(&self.libs) {
            if let Some(path) = vendor::locate(self.paths, library) {
                return Some(path);
            }
        }

        [&self.paths.src.base.dir, &self.paths.root]
            .into_iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
    }

    /// Concatenate a block's assets into one output record.
    fn bundle(&self, page: &Path, block: &BuildBlock) -> Result<OutputFile, AssetError> {
        let page_dir = page.parent().unwrap_or(Path::new(""));
        let mut parts = Vec::new();

        for url in &block.assets {
            match self.resolve(page_dir, url) {
                Some(path) => {
                    let content =
                        fs::read_to_string(&path).map_err(|e| AssetError::read(&path, e))?;
                    parts.push(content);
                }
                None => tracing::warn!(
                    "Skipping {} in {}: file not found",
                    url,
                    page.display()
                ),
            }
        }

        let output = match block.target.strip_prefix('/') {
            Some(rest) => normalize(Path::new(rest)),
            None => normalize(&page_dir.join(&block.target)),
        };
        let origin = || format!("{} ({})", page.display(), block.target);

        let contents = match block.kind {
            BlockKind::Css => minify_css(&parts.join("\n")).map_err(|message| {
                AssetError::StyleError {
                    path: origin(),
                    message,
                }
            })?,
            BlockKind::Js => minify_js(&parts.join("\n;\n")).map_err(|message| {
                AssetError::ScriptError {
                    path: origin(),
                    message,
                }
            })?,
        };

        Ok(OutputFile::new(output, contents))
    }

    /// Bundle every build block of an expanded page.
    pub fn bundles(&self, page: &Path, html: &str) -> Result<Vec<OutputFile>, AssetError> {
        parse_blocks(&rewrite_vendor_refs(html))
            .iter()
            .map(|block| self.bundle(page, block))
            .collect()
    }
}

/// Bundle records for every page, relative to the output root.
pub fn bundle_outputs(paths: &Paths) -> Result<Vec<OutputFile>, AssetError> {
    let expander = TemplateExpander::new(&paths.src.base.dir);
    let assembler = HtmlAssembler::new(paths);

    let mut bundles = Vec::new();
    for page in pages(paths)? {
        let expanded = expand_page(&expander, &page)?;
        bundles.extend(assembler.bundles(&page.relative, &expanded)?);
    }

    Ok(bundles)
}

/// Write build-block bundles into the output root.
pub fn assemble_html(paths: &Paths) -> Result<usize, AssetError> {
    let files = bundle_outputs(paths)?;
    emit(&paths.dist.base.dir, &files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn bundle<'a>(files: &'a [OutputFile], path: &str) -> &'a str {
        let file = files
            .iter()
            .find(|f| f.path == Path::new(path))
            .unwrap_or_else(|| panic!("no bundle {}", path));
        std::str::from_utf8(&file.contents).unwrap()
    }

    #[test]
    fn rewrites_node_modules_references() {
        let html = r#"<link href="../node_modules/a/a.css"><script src="node_modules/b/b.js"></script>"#;

        assert_eq!(
            rewrite_vendor_refs(html),
            r#"<link href="../assets/libs/a/a.css"><script src="assets/libs/b/b.js"></script>"#
        );
    }

    #[test]
    fn leaves_distant_node_modules_references() {
        let html = r#"<a href="https://example.com/x/node_modules/y">"#;

        assert_eq!(rewrite_vendor_refs(html), html);
    }

    #[test]
    fn parses_build_blocks() {
        let html = r#"
<!-- build:css assets/css/vendor.min.css -->
<link rel="stylesheet" href="a.css">
<link rel="stylesheet" href="b.css">
<!-- endbuild -->
<!-- build:js assets/js/vendor.min.js -->
<script src="c.js"></script>
<!-- endbuild -->
"#;

        assert_eq!(
            parse_blocks(html),
            vec![
                BuildBlock {
                    kind: BlockKind::Css,
                    target: "assets/css/vendor.min.css".to_string(),
                    assets: vec!["a.css".to_string(), "b.css".to_string()],
                },
                BuildBlock {
                    kind: BlockKind::Js,
                    target: "assets/js/vendor.min.js".to_string(),
                    assets: vec!["c.js".to_string()],
                },
            ]
        );
    }

    #[test]
    fn finishes_pages_with_single_tags() {
        let html = r#"<head>
<!-- build:css assets/css/site.min.css -->
<link rel="stylesheet" href="node_modules/a/a.css">
<!-- endbuild -->
</head>
<body>
<!-- build:js assets/js/site.js -->
<script src="assets/js/one.js"></script>
<!-- endbuild -->
</body>
"#;

        assert_eq!(
            finish_page(html),
            r#"<head>
<link rel="stylesheet" href="assets/css/site.min.css">
</head>
<body>
<script src="assets/js/site.js"></script>
</body>
"#
        );
    }

    #[test]
    fn concatenates_and_minifies_build_blocks() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        let src = &paths.src.base.dir;
        write(&src.join("assets/css/a.css"), "body { color: red; }\n");
        write(&src.join("assets/css/b.css"), "p { margin: 0; }\n");
        write(&src.join("assets/js/one.js"), "// first\nvar one = 1;\n");
        write(&src.join("assets/js/two.js"), "var two = 2;\n");
        write(
            &src.join("index.html"),
            r#"<!-- build:css assets/css/site.min.css -->
<link rel="stylesheet" href="assets/css/a.css">
<link rel="stylesheet" href="assets/css/b.css">
<!-- endbuild -->
<!-- build:js assets/js/site.js -->
<script src="assets/js/one.js"></script>
<script src="assets/js/two.js?v=2"></script>
<!-- endbuild -->
"#,
        );

        assemble_html(&paths).unwrap();

        let dist = &paths.dist.base.dir;
        assert_eq!(
            fs::read_to_string(dist.join("assets/css/site.min.css")).unwrap(),
            "body{color:red}p{margin:0}"
        );
        let js = fs::read_to_string(dist.join("assets/js/site.js")).unwrap();
        assert!(js.contains("one") && js.contains("two"));
        assert!(!js.contains("// first"));
        assert!(!js.trim_end().contains('\n'));
    }

    #[test]
    fn does_not_write_pages() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        write(&paths.src.base.dir.join("index.html"), "<p>Home</p>");

        assert_eq!(assemble_html(&paths).unwrap(), 0);
        assert!(!paths.dist.base.dir.join("index.html").exists());
    }

    #[test]
    fn bundles_vendor_libraries_straight_from_node_modules() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        write(
            &paths.base.node_modules.join("lib/dist/lib.js"),
            "window.libLoaded = true;",
        );
        write(
            &paths.src.base.dir.join("pages/index.html"),
            r#"<!-- build:js /assets/js/vendor.js -->
<script src="../node_modules/lib/lib.js"></script>
<!-- endbuild -->"#,
        );

        let files = bundle_outputs(&paths).unwrap();

        assert!(!paths.dist.libs.exists());
        assert!(bundle(&files, "assets/js/vendor.js").contains("libLoaded"));
    }

    #[test]
    fn ignores_stale_build_output() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        write(&paths.dist.base.dir.join("app.js"), "var stale = 1;");
        write(
            &paths.src.base.dir.join("index.html"),
            r#"<!-- build:js bundle.js --><script src="app.js"></script><!-- endbuild -->"#,
        );

        let files = bundle_outputs(&paths).unwrap();

        assert!(!bundle(&files, "bundle.js").contains("stale"));
    }

    #[test]
    fn skips_missing_assets() {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        write(
            &paths.src.base.dir.join("index.html"),
            r#"<!-- build:js app.js --><script src="missing.js"></script><!-- endbuild -->"#,
        );

        let files = bundle_outputs(&paths).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].contents.iter().all(u8::is_ascii_whitespace));
    }
}
