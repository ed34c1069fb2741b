use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use super::{TaskAction, TaskSpec};

#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("process exited with status {}", .0.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExitStatus(Option<i32>),

    #[error("required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("expected output not produced: {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Runs a single task attempt. Retries and ordering belong to the pipeline.
pub trait TaskExecutor {
    fn execute(&self, task: &TaskSpec) -> Result<(), TaskFailure>;
}

/// Executes commands as child processes inheriting stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl TaskExecutor for ProcessExecutor {
    fn execute(&self, task: &TaskSpec) -> Result<(), TaskFailure> {
        match &task.action {
            TaskAction::Command { program, args } => {
                debug!(task = %task.id, program = %program.display(), ?args, "spawning");
                let status = Command::new(program).args(args).current_dir(&task.workdir).status()?;
                if status.success() {
                    Ok(())
                } else {
                    Err(TaskFailure::ExitStatus(status.code()))
                }
            }
            TaskAction::RequireFile(path) => {
                let path = task.resolve(path);
                if path.is_file() {
                    info!(task = %task.id, path = %path.display(), "required file present");
                    Ok(())
                } else {
                    Err(TaskFailure::MissingFile(path))
                }
            }
            TaskAction::Notify(message) => {
                println!("{message}");
                Ok(())
            }
        }
    }
}
