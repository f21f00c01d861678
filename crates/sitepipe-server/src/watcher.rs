//! File watching and watch bindings.
//!
//! A [`WatchSession`] owns a set of [`WatchBinding`]s, each mapping path
//! patterns to a task composition. Every binding gets its own worker with a
//! single-slot trigger queue: changes arriving while a run is pending fold
//! into it, changes arriving while a run is in progress schedule exactly one
//! more run.
//!
//! Dropping the session stops its workers and the file watcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use glob::{MatchOptions, Pattern};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use sitepipe_tasks::{Task, TaskRegistry};

/// Delay between a change and the run it triggers.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Errors that can occur when watching.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Invalid watch pattern {pattern}: {message}")]
    PatternError { pattern: String, message: String },

    #[error("File watch error: {0}")]
    NotifyError(String),

    #[error("Watch session is not attached to a task registry")]
    Detached,
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given paths.
    ///
    /// Returns the watcher and a channel receiving every changed path.
    /// Paths that do not exist are skipped.
    pub fn new(paths: &[PathBuf]) -> Result<(Self, mpsc::Receiver<PathBuf>), WatchError> {
        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in event.paths {
                        // The receiver is gone once the session shuts down.
                        if tx.blocking_send(path).is_err() {
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("File watch error: {}", e),
            }
        })
        .map_err(|e| WatchError::NotifyError(e.to_string()))?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(|e| WatchError::NotifyError(e.to_string()))?;
            } else {
                tracing::warn!("Not watching {}: no such directory", path.display());
            }
        }

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// A rule mapping changed paths to a task composition.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    /// Label used in logs and task failures
    pub name: String,

    /// Patterns matched against paths relative to the project root
    pub patterns: Vec<Pattern>,

    /// Composition run on a match
    pub task: Task,
}

impl WatchBinding {
    /// Create a binding from glob patterns.
    pub fn new<I, S>(name: impl Into<String>, patterns: I, task: Task) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|e| WatchError::PatternError {
                    pattern: p.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.into(),
            patterns,
            task,
        })
    }

    /// Check whether a path relative to the project root triggers this binding.
    pub fn matches(&self, relative: &Path) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(relative, MATCH_OPTIONS))
    }
}

struct Running {
    /// One per binding, in binding order
    triggers: Vec<mpsc::Sender<()>>,

    /// Workers and the forwarding task
    tasks: Vec<JoinHandle<()>>,
}

/// Watches a project and runs bound compositions on change.
pub struct WatchSession {
    root: PathBuf,
    watch_dirs: Vec<PathBuf>,
    bindings: Vec<Arc<WatchBinding>>,
    settle: Duration,
    registry: OnceLock<Weak<TaskRegistry>>,
    running: OnceCell<Running>,
}

impl WatchSession {
    /// Create a session for `root`, watching `watch_dirs` recursively.
    pub fn new(
        root: impl Into<PathBuf>,
        watch_dirs: Vec<PathBuf>,
        bindings: Vec<WatchBinding>,
    ) -> Self {
        Self {
            root: root.into(),
            watch_dirs,
            bindings: bindings.into_iter().map(Arc::new).collect(),
            settle: DEFAULT_SETTLE,
            registry: OnceLock::new(),
            running: OnceCell::new(),
        }
    }

    /// Set the delay between a change and the run it triggers.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn bindings(&self) -> impl Iterator<Item = &WatchBinding> {
        self.bindings.iter().map(Arc::as_ref)
    }

    /// Connect the session to the registry its compositions run against.
    ///
    /// Only the first registry attached is kept.
    pub fn attach(&self, registry: &Arc<TaskRegistry>) {
        if self.registry.set(Arc::downgrade(registry)).is_err() {
            tracing::debug!("Watch session already attached");
        }
    }

    /// Whether the workers and the file watcher are running.
    pub fn is_started(&self) -> bool {
        self.running.initialized()
    }

    /// Install the watch bindings if they are not installed yet.
    pub async fn start(&self) -> Result<(), WatchError> {
        self.running.get_or_try_init(|| self.launch()).await?;
        Ok(())
    }

    async fn launch(&self) -> Result<Running, WatchError> {
        let registry = self.registry.get().cloned().ok_or(WatchError::Detached)?;

        let mut triggers = Vec::with_capacity(self.bindings.len());
        let mut tasks = Vec::with_capacity(self.bindings.len() + 1);
        for binding in &self.bindings {
            let (tx, rx) = mpsc::channel(1);
            tasks.push(tokio::spawn(worker(
                Arc::clone(binding),
                registry.clone(),
                self.settle,
                rx,
            )));
            triggers.push(tx);
        }

        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let watch_dirs: Vec<PathBuf> = self
            .watch_dirs
            .iter()
            .map(|dir| fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()))
            .collect();

        let (watcher, mut rx) = match FileWatcher::new(&watch_dirs) {
            Ok(watcher) => watcher,
            Err(e) => {
                tasks.iter().for_each(JoinHandle::abort);
                return Err(e);
            }
        };

        let bindings = self.bindings.clone();
        let senders = triggers.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                if let Ok(relative) = path.strip_prefix(&root) {
                    tracing::debug!("Changed: {}", relative.display());
                    fire(&bindings, &senders, relative);
                }
            }
            // Keep watcher alive
            drop(watcher);
        }));

        tracing::info!(
            "Watching {} with {} binding(s)",
            self.root.display(),
            self.bindings.len()
        );

        Ok(Running { triggers, tasks })
    }

    /// Trigger every binding matching a path relative to the project root.
    ///
    /// Returns the number of bindings triggered. Nothing is triggered before
    /// [`WatchSession::start`].
    pub fn dispatch(&self, relative: &Path) -> usize {
        match self.running.get() {
            Some(running) => fire(&self.bindings, &running.triggers, relative),
            None => 0,
        }
    }

    /// Names of the bindings a path relative to the project root triggers.
    pub fn bindings_for(&self, relative: &Path) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| b.matches(relative))
            .map(|b| b.name.as_str())
            .collect()
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.get() {
            running.tasks.iter().for_each(JoinHandle::abort);
        }
    }
}

fn fire(bindings: &[Arc<WatchBinding>], triggers: &[mpsc::Sender<()>], relative: &Path) -> usize {
    let mut fired = 0;

    for (binding, trigger) in bindings.iter().zip(triggers) {
        if !binding.matches(relative) {
            continue;
        }
        match trigger.try_send(()) {
            // A full queue already holds a pending run
            Ok(()) | Err(TrySendError::Full(())) => fired += 1,
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Watch worker '{}' has stopped", binding.name);
            }
        }
    }

    fired
}

async fn worker(
    binding: Arc<WatchBinding>,
    registry: Weak<TaskRegistry>,
    settle: Duration,
    mut rx: mpsc::Receiver<()>,
) {
    while rx.recv().await.is_some() {
        tokio::time::sleep(settle).await;
        // Changes made while settling belong to this run.
        while rx.try_recv().is_ok() {}

        let Some(registry) = registry.upgrade() else {
            break;
        };

        tracing::info!("Change detected, running '{}'", binding.name);
        if let Err(e) = registry.run_task(&binding.name, &binding.task).await {
            tracing::error!("Watch task '{}' failed: {}", binding.name, e);
        }
    }
}
