//! One-off site build.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use sitepipe_server::PreviewConfig;

use super::Project;
use crate::pipeline::BUILD;

/// Run the build pipeline.
pub async fn run(root: PathBuf) -> Result<()> {
    tracing::info!("Building site...");
    let start = Instant::now();

    let project = Project::load(root, PreviewConfig::default())?;
    project.run(BUILD).await?;

    tracing::info!(
        "Built {} in {}ms",
        project.paths.dist.base.dir.display(),
        start.elapsed().as_millis()
    );

    Ok(())
}
