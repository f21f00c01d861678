//! Run a single task.

use std::path::PathBuf;

use anyhow::{bail, Result};
use sitepipe_server::PreviewConfig;

use super::Project;

/// Run any registered task; a task that starts the server or watcher keeps
/// running until interrupted.
pub async fn run(root: PathBuf, task: &str) -> Result<()> {
    let project = Project::load(root, PreviewConfig::default())?;

    if !project.registry.contains(task) {
        bail!(
            "Unknown task '{}'. Available tasks: {}",
            task,
            project.registry.names().join(", ")
        );
    }

    project.run(task).await?;
    project.wait().await
}
