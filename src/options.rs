//! Task queue options

use std::default::Default;

/// Options for a [`TaskQueue`](crate::TaskQueue).
#[derive(Debug, Clone)]
pub struct Options {
    /// Label used in log lines.
    pub name: Option<String>,
    /// Maximum number of tasks a single `run_until_stalled` call may run.
    pub task_budget: Option<usize>,
}

impl Options {
    pub fn new() -> Options {
        Options {
            name: None,
            task_budget: None,
        }
    }

    pub fn name(&mut self, name: String) -> &mut Options {
        self.name = Some(name);
        self
    }

    pub fn task_budget(&mut self, budget: usize) -> &mut Options {
        self.task_budget = Some(budget);
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("task-queue")
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}
