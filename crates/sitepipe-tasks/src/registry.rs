//! Named task registry.
//!
//! The registry owns every task descriptor and runs them by name. It is an
//! explicit value rather than process-wide state, so several pipeline
//! configurations can coexist.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::join::join_all;
use crate::task::{BoxFuture, Task};

/// Errors that can occur when registering or running tasks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already registered: {0}")]
    Duplicate(String),

    #[error("Task '{task}' references unknown task '{missing}'")]
    UnknownReference { task: String, missing: String },

    #[error("Task '{0}' depends on itself")]
    Cycle(String),

    #[error("Task '{task}' failed: {message}")]
    Failed { task: String, message: String },
}

impl TaskError {
    /// Name of the task that failed, if this is a run failure.
    pub fn task(&self) -> Option<&str> {
        match self {
            TaskError::Failed { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// A registry of named tasks.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under a unique name.
    pub fn register(&mut self, name: impl Into<String>, task: Task) -> Result<(), TaskError> {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(TaskError::Duplicate(name));
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Check if a task exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Get all registered task names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check that every reference resolves and no task reaches itself.
    ///
    /// Meant to run once after registration, before any task does I/O.
    pub fn validate(&self) -> Result<(), TaskError> {
        for name in self.names() {
            for missing in self.tasks[name].references() {
                if !self.tasks.contains_key(missing) {
                    return Err(TaskError::UnknownReference {
                        task: name.to_string(),
                        missing: missing.to_string(),
                    });
                }
            }
        }

        let mut done = HashSet::new();
        for name in self.names() {
            self.check_cycles(name, &mut Vec::new(), &mut done)?;
        }

        Ok(())
    }

    fn check_cycles<'a>(
        &'a self,
        name: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), TaskError> {
        if done.contains(name) {
            return Ok(());
        }
        if path.contains(&name) {
            return Err(TaskError::Cycle(name.to_string()));
        }

        path.push(name);
        if let Some(task) = self.tasks.get(name) {
            for child in task.references() {
                self.check_cycles(child, path, done)?;
            }
        }
        path.pop();
        done.insert(name);

        Ok(())
    }

    /// Run a registered task by name.
    pub fn run<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            let task = self
                .tasks
                .get(name)
                .ok_or_else(|| TaskError::NotFound(name.to_string()))?;

            tracing::info!("Starting '{}'...", name);
            let start = Instant::now();

            let result = self.run_task(name, task).await;
            let elapsed = start.elapsed().as_millis();

            match &result {
                Ok(()) => tracing::info!("Finished '{}' after {}ms", name, elapsed),
                Err(e) => tracing::error!("'{}' errored after {}ms: {}", name, elapsed, e),
            }

            result
        })
    }

    /// Run an unregistered task, resolving any references it holds.
    ///
    /// `label` names the task in failures raised by its own actions.
    pub fn run_task<'a>(
        &'a self,
        label: &'a str,
        task: &'a Task,
    ) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            match task {
                Task::Action(action) => action().await.map_err(|e| TaskError::Failed {
                    task: label.to_string(),
                    message: e.to_string(),
                }),
                Task::Ref(name) => self.run(name).await,
                Task::Series(steps) => {
                    for step in steps {
                        self.run_task(label, step).await?;
                    }
                    Ok(())
                }
                Task::Parallel(steps) => {
                    join_all(steps.iter().map(|step| self.run_task(label, step)).collect()).await
                }
            }
        })
    }
}
