//! Linear training DAG: `run_etl → validate_data → train_model → pipeline_success`.
//!
//! Tasks are plain descriptors and edges are data. The runner walks the
//! chain in order, applies one global retry policy to every task and stops
//! at the first task that still fails after its retries.

pub mod executor;
pub mod schedule;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{info, warn};

use crate::config::Settings;

pub use executor::{ProcessExecutor, TaskExecutor, TaskFailure};
pub use schedule::Schedule;

pub const PIPELINE_NAME: &str = "house_price_training_pipeline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Spawn an external process.
    Command { program: PathBuf, args: Vec<String> },
    /// Succeed only if the file exists (relative paths resolve against the workdir).
    RequireFile(PathBuf),
    /// Print a message.
    Notify(String),
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Command { program, args } => {
                write!(f, "{}", program.display())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            TaskAction::RequireFile(path) => write!(f, "require {}", path.display()),
            TaskAction::Notify(message) => write!(f, "echo {message:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: String,
    pub action: TaskAction,
    pub workdir: PathBuf,
    /// Checked after the action succeeds; absence fails the task.
    pub expected_output: Option<PathBuf>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, action: TaskAction, workdir: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            action,
            workdir: workdir.as_ref().to_path_buf(),
            expected_output: None,
        }
    }

    pub fn expecting(mut self, output: impl AsRef<Path>) -> Self {
        self.expected_output = Some(output.as_ref().to_path_buf());
        self
    }

    /// Resolve `path` against the task's working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid pipeline graph: {0}")]
    InvalidGraph(String),

    #[error("task '{task}' failed after {attempts} attempt(s): {reason}")]
    TaskFailed {
        task: String,
        attempts: u32,
        reason: TaskFailure,
    },
}

/// Outcome of one task in a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task: String,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    tasks: Vec<TaskSpec>,
    edges: Vec<(String, String)>,
    /// Task indices in execution order.
    order: Vec<usize>,
    pub retry: RetryPolicy,
    pub schedule: Schedule,
}

impl Pipeline {
    /// Build a pipeline, checking that `edges` chain every task exactly once.
    pub fn new(
        name: impl Into<String>,
        tasks: Vec<TaskSpec>,
        edges: Vec<(String, String)>,
        retry: RetryPolicy,
        schedule: Schedule,
    ) -> Result<Self, PipelineError> {
        let order = linear_order(&tasks, &edges)?;
        Ok(Self {
            name: name.into(),
            tasks,
            edges,
            order,
            retry,
            schedule,
        })
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Tasks in execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.order.iter().map(|&i| &self.tasks[i])
    }

    /// Execute every task in order. Returns the per-task attempt counts.
    pub fn run(&self, executor: &dyn TaskExecutor) -> Result<Vec<TaskRecord>, PipelineError> {
        info!(pipeline = %self.name, tasks = self.order.len(), "pipeline run started");
        let mut records = Vec::with_capacity(self.order.len());

        for task in self.tasks() {
            let attempts = self.run_task(executor, task)?;
            records.push(TaskRecord {
                task: task.id.clone(),
                attempts,
            });
        }

        info!(pipeline = %self.name, "pipeline run finished");
        Ok(records)
    }

    fn run_task(&self, executor: &dyn TaskExecutor, task: &TaskSpec) -> Result<u32, PipelineError> {
        let max_attempts = self.retry.retries + 1;
        let mut attempt = 1;
        loop {
            info!(task = %task.id, attempt, "task started");
            let failure = match executor.execute(task) {
                Ok(()) => match self.check_output(task) {
                    Ok(()) => {
                        info!(task = %task.id, attempt, "task succeeded");
                        return Ok(attempt);
                    }
                    Err(missing) => missing,
                },
                Err(failure) => failure,
            };

            if attempt >= max_attempts {
                return Err(PipelineError::TaskFailed {
                    task: task.id.clone(),
                    attempts: attempt,
                    reason: failure,
                });
            }
            warn!(task = %task.id, attempt, error = %failure, delay = ?self.retry.delay, "task failed, retrying");
            std::thread::sleep(self.retry.delay);
            attempt += 1;
        }
    }

    fn check_output(&self, task: &TaskSpec) -> Result<(), TaskFailure> {
        match &task.expected_output {
            Some(path) if !task.resolve(path).exists() => Err(TaskFailure::MissingOutput(task.resolve(path))),
            _ => Ok(()),
        }
    }
}

/// Topological order of a graph that must be a single chain.
fn linear_order(tasks: &[TaskSpec], edges: &[(String, String)]) -> Result<Vec<usize>, PipelineError> {
    let invalid = |msg: String| Err(PipelineError::InvalidGraph(msg));

    if tasks.is_empty() {
        return invalid("no tasks".into());
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(tasks.len(), edges.len());
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for (i, task) in tasks.iter().enumerate() {
        if index.insert(task.id.as_str(), graph.add_node(i)).is_some() {
            return invalid(format!("duplicate task id '{}'", task.id));
        }
    }

    for (from, to) in edges {
        let (Some(&a), Some(&b)) = (index.get(from.as_str()), index.get(to.as_str())) else {
            return invalid(format!("edge {from} >> {to} references an unknown task"));
        };
        graph.add_edge(a, b, ());
    }

    // n - 1 edges, degrees at most one and no cycle leave exactly one path
    if edges.len() != tasks.len() - 1 {
        return invalid(format!("{} tasks need {} edges, got {}", tasks.len(), tasks.len() - 1, edges.len()));
    }
    for node in graph.node_indices() {
        let id = &tasks[graph[node]].id;
        if graph.edges_directed(node, Direction::Outgoing).count() > 1 {
            return invalid(format!("task '{id}' has more than one downstream task"));
        }
        if graph.edges_directed(node, Direction::Incoming).count() > 1 {
            return invalid(format!("task '{id}' has more than one upstream task"));
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|node| graph[node]).collect()),
        Err(cycle) => invalid(format!("graph has a cycle through '{}'", tasks[graph[cycle.node_id()]].id)),
    }
}

/// The weekly ETL → validate → train → notify chain.
///
/// `program` is the `house-price` binary; each command step re-invokes it
/// with the same settings.
pub fn training_pipeline(settings: &Settings, program: &Path, workdir: &Path) -> Result<Pipeline, PipelineError> {
    let common = vec![
        "--data-dir".to_string(),
        settings.data_dir.display().to_string(),
        "--tracking-uri".to_string(),
        settings.tracking_uri.clone(),
    ];
    let command = |sub: &str| TaskAction::Command {
        program: program.to_path_buf(),
        args: common.iter().cloned().chain(std::iter::once(sub.to_string())).collect(),
    };

    let tasks = vec![
        TaskSpec::new("run_etl", command("etl"), workdir),
        TaskSpec::new(
            "validate_data",
            TaskAction::RequireFile(settings.processed_dir().join("train.csv")),
            workdir,
        ),
        TaskSpec::new("train_model", command("train"), workdir),
        TaskSpec::new(
            "pipeline_success",
            TaskAction::Notify(format!(
                "✓ Pipeline completed! New model logged to MLflow. Check MLflow UI: {}",
                settings.tracking_uri
            )),
            workdir,
        ),
    ];
    let edges = [
        ("run_etl", "validate_data"),
        ("validate_data", "train_model"),
        ("train_model", "pipeline_success"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();

    Pipeline::new(PIPELINE_NAME, tasks, edges, RetryPolicy::default(), Schedule::weekly_from_default_start())
}
