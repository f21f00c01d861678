//! Task descriptors.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error reported by an action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Completion signal of an action.
pub type ActionResult = Result<(), ActionError>;

/// A zero-argument operation producing a completion signal.
pub type Action = Arc<dyn Fn() -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// A unit of work: an action, a reference to a registered task, or a
/// composition of nested tasks.
#[derive(Clone)]
pub enum Task {
    /// Run an action
    Action(Action),

    /// Run the task registered under this name
    Ref(String),

    /// Run each step after the previous one completes
    Series(Vec<Task>),

    /// Start every step, then wait for all of them
    Parallel(Vec<Task>),
}

impl Task {
    /// Wrap an async closure as an action task.
    pub fn action<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        Task::Action(Arc::new(move || Box::pin(f())))
    }

    /// Refer to a registered task by name.
    pub fn named(name: impl Into<String>) -> Self {
        Task::Ref(name.into())
    }

    /// Compose steps that run strictly one after another.
    pub fn series<I, T>(steps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        Task::Series(steps.into_iter().map(Into::into).collect())
    }

    /// Compose steps that run concurrently behind a join barrier.
    pub fn parallel<I, T>(steps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        Task::Parallel(steps.into_iter().map(Into::into).collect())
    }

    /// Names this task refers to, including those of nested steps.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Task::Action(_) => {}
            Task::Ref(name) => names.push(name),
            Task::Series(steps) | Task::Parallel(steps) => {
                for step in steps {
                    step.collect_references(names);
                }
            }
        }
    }
}

impl From<&str> for Task {
    fn from(name: &str) -> Self {
        Task::named(name)
    }
}

impl From<String> for Task {
    fn from(name: String) -> Self {
        Task::named(name)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, steps) = match self {
            Task::Action(_) => return f.write_str("<action>"),
            Task::Ref(name) => return f.write_str(name),
            Task::Series(steps) => ("series", steps),
            Task::Parallel(steps) => ("parallel", steps),
        };

        write!(f, "{}(", label)?;
        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", step)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self)
    }
}
