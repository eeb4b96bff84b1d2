//! The `run` command: execute one array task on the compute node.
//!
//! Invoked by the generated script, never usually by hand. The task's
//! identity comes from the scheduler's environment, its command from the
//! job file, and its exit status becomes this process's exit status, so
//! the scheduler's accounting reflects what the task actually did.

use std::{fs::File, io::BufReader, process::ExitCode};

use jarray_core::{
    ArrayTask, JobFileError, RunnerError, TaskRecord, append_record, execute as execute_command,
    resolve_task, stats_path,
};
use tracing::info;

use super::{CliError, RunArgs};

pub(crate) fn execute(args: &RunArgs) -> Result<ExitCode, CliError> {
    let task = ArrayTask::from_env()?;
    info!(
        job_id = task.job_id,
        task_index = task.task_index,
        "resolving array task"
    );

    let io_err = |source| JobFileError::Io {
        path: args.job_file.clone(),
        source,
    };
    let file = File::open(&args.job_file).map_err(io_err)?;
    let command = resolve_task(BufReader::new(file), task.task_index)
        .map_err(io_err)?
        .ok_or(RunnerError::TaskNotFound {
            task_index: task.task_index,
            path: args.job_file.clone(),
        })?;

    let result = execute_command(&command)?;

    if let Some(template) = &args.stats_file {
        let destination = stats_path(template, task.job_id);
        let record = TaskRecord::from_execution(task, &result, &command);
        append_record(&destination, &record)?;
    }

    Ok(ExitCode::from(u8::try_from(result.exit_code).unwrap_or(1)))
}
