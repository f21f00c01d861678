//! Build, serve and watch.

use std::path::PathBuf;

use anyhow::Result;
use sitepipe_server::PreviewConfig;

use super::Project;
use crate::pipeline::DEFAULT;

/// Run the default pipeline and keep serving until interrupted.
pub async fn run(root: PathBuf, host: String, port: u16, open: bool) -> Result<()> {
    let project = Project::load(
        root,
        PreviewConfig {
            host,
            port,
            open,
            ..Default::default()
        },
    )?;

    project.run(DEFAULT).await?;
    project.wait().await
}
