pub mod build;
pub mod dev;
pub mod run;
pub mod tasks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sitepipe_server::PreviewConfig;
use sitepipe_static::Paths;
use sitepipe_tasks::TaskRegistry;

use crate::pipeline::{build_registry, Services};

/// A project ready to run tasks.
pub struct Project {
    pub paths: Paths,
    pub services: Services,
    pub registry: Arc<TaskRegistry>,
}

impl Project {
    /// Resolve the path table and register the pipeline.
    ///
    /// Every check runs here, before any task touches the filesystem.
    pub fn load(root: PathBuf, preview: PreviewConfig) -> Result<Self> {
        let paths = Paths::new(root);
        paths
            .validate()
            .with_context(|| format!("Invalid project at {}", paths.root.display()))?;

        let services = Services::new(&paths, preview).context("Invalid watch bindings")?;
        let registry = build_registry(&paths, &services).context("Invalid task registry")?;

        Ok(Self {
            paths,
            services,
            registry,
        })
    }

    /// Run a registered task by name.
    pub async fn run(&self, name: &str) -> Result<()> {
        self.registry.run(name).await?;
        Ok(())
    }

    /// Block until Ctrl+C if a server or watcher is running.
    pub async fn wait(&self) -> Result<()> {
        if !self.services.is_running() {
            return Ok(());
        }

        tracing::info!("Press Ctrl+C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        tracing::info!("Shutting down");

        Ok(())
    }
}
