//! Template expansion for HTML pages.
//!
//! Pages under the source tree are rendered with minijinja. Partials are
//! pulled in with `{% include "partials/header.html" %}`; include names are
//! resolved against the source root.
//!
//! The emitted pages are final: vendor references are rewritten and build
//! blocks collapsed by [`crate::html::finish_page`].

use std::path::Path;

use minijinja::{context, path_loader, Environment};

use crate::copy::{collect, SourceFile};
use crate::error::AssetError;
use crate::html::finish_page;
use crate::output::{emit, OutputFile};
use crate::paths::Paths;

/// Template engine rooted at a source directory.
pub struct TemplateExpander {
    env: Environment<'static>,
}

impl TemplateExpander {
    /// Create an expander that loads templates from `src_dir`.
    pub fn new(src_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(src_dir.to_path_buf()));
        env.set_keep_trailing_newline(true);

        Self { env }
    }

    /// Render the template at `name`, a `/`-separated path under the root.
    pub fn expand(&self, name: &str) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(context! {})
    }
}

/// HTML pages to expand: every HTML file outside the partials directory.
pub fn pages(paths: &Paths) -> Result<Vec<SourceFile>, AssetError> {
    let partials = &paths.src.partials.dir;

    Ok(collect(&paths.src.html)?
        .into_iter()
        .filter(|page| !page.path.starts_with(partials))
        .collect())
}

/// Template name for a path relative to the source root.
pub fn template_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Expand a single page.
pub fn expand_page(expander: &TemplateExpander, page: &SourceFile) -> Result<String, AssetError> {
    expander
        .expand(&template_name(&page.relative))
        .map_err(|e| AssetError::TemplateError {
            path: page.path.display().to_string(),
            message: e.to_string(),
        })
}

/// Expand and finish every page, returning records relative to the output root.
pub fn page_outputs(paths: &Paths) -> Result<Vec<OutputFile>, AssetError> {
    let expander = TemplateExpander::new(&paths.src.base.dir);

    pages(paths)?
        .into_iter()
        .map(|page| {
            let html = finish_page(&expand_page(&expander, &page)?);
            Ok(OutputFile::new(page.relative, html))
        })
        .collect()
}

/// Expand pages into the output root.
pub fn expand_templates(paths: &Paths) -> Result<usize, AssetError> {
    let files = page_outputs(paths)?;
    let written = emit(&paths.dist.base.dir, &files)?;

    tracing::debug!("Expanded {} pages ({} changed)", files.len(), written);

    Ok(files.len())
}
