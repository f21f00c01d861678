//! List registered tasks.

use std::path::PathBuf;

use anyhow::Result;
use sitepipe_server::PreviewConfig;

use super::Project;

/// Print each task with its composition.
pub fn run(root: PathBuf) -> Result<()> {
    let project = Project::load(root, PreviewConfig::default())?;
    let registry = &project.registry;

    let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);

    for name in registry.names() {
        if let Some(task) = registry.get(name) {
            println!("{:width$}  {}", name, task, width = width);
        }
    }

    for binding in project.services.watcher.bindings() {
        let patterns: Vec<&str> = binding.patterns.iter().map(|p| p.as_str()).collect();
        println!("watch {}  {} -> {}", binding.name, patterns.join(", "), binding.task);
    }

    Ok(())
}
