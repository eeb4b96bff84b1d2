//! Per-task execution and stats recording.
//!
//! On the compute node each array task resolves its own line of the job
//! file, runs it through the host shell with stdio inherited (the
//! scheduler's logging owns stdout/stderr capture), and appends exactly
//! one tab-separated stats row. Rows are self-contained and written with
//! a single append, so concurrently finishing tasks need no coordination.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::define_error_codes;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Environment variables the scheduler sets for each array task.
pub const ENV_ARRAY_JOB_ID: &str = "SLURM_ARRAY_JOB_ID";
/// See [`ENV_ARRAY_JOB_ID`].
pub const ENV_ARRAY_TASK_ID: &str = "SLURM_ARRAY_TASK_ID";

/// Errors raised while running one array task.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The task index lies beyond the job file; nothing to execute.
    #[error("job file `{}` has no line {task_index}", path.display())]
    TaskNotFound {
        /// The requested zero-based line number.
        task_index: usize,
        /// The job file that was searched.
        path: PathBuf,
    },
    /// A required scheduler environment variable is absent or unusable.
    #[error("environment variable `{name}` is missing or not a number")]
    MissingEnv {
        /// The variable's name.
        name: &'static str,
    },
    /// The host shell could not be spawned.
    #[error("failed to run task command through the shell: {source}")]
    Spawn {
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The stats row could not be appended.
    #[error("failed to append stats row to `{}`: {source}", path.display())]
    Stats {
        /// The stats destination.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

define_error_codes! {
    /// Stable codes describing [`RunnerError`] variants.
    enum RunnerErrorCode for RunnerError {
        /// The task index lies beyond the job file.
        TaskNotFound => TaskNotFound { .. } => "TASK_NOT_FOUND",
        /// A required scheduler environment variable is absent or unusable.
        MissingEnv => MissingEnv { .. } => "ARRAY_ENV_MISSING",
        /// The host shell could not be spawned.
        Spawn => Spawn { .. } => "TASK_SPAWN_FAILED",
        /// The stats row could not be appended.
        Stats => Stats { .. } => "STATS_APPEND_FAILED",
    }
}

/// Identity of the array task this invocation is running.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArrayTask {
    /// Parent job id of the whole array.
    pub job_id: u64,
    /// This task's zero-based index.
    pub task_index: usize,
}

impl ArrayTask {
    /// Reads the task identity from the scheduler's environment.
    ///
    /// # Errors
    /// Returns [`RunnerError::MissingEnv`] when either variable is absent
    /// or does not parse as a number, meaning this invocation is not
    /// running under an array allocation.
    pub fn from_env() -> Result<Self, RunnerError> {
        Ok(Self {
            job_id: env_number(ENV_ARRAY_JOB_ID)?,
            task_index: env_number::<usize>(ENV_ARRAY_TASK_ID)?,
        })
    }
}

fn env_number<T: std::str::FromStr>(name: &'static str) -> Result<T, RunnerError> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or(RunnerError::MissingEnv { name })
}

/// Outcome of executing one task command.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionResult {
    /// The command's exit code; signal deaths map to `128 + signal`.
    pub exit_code: i32,
    /// Wall-clock start.
    pub started_at: DateTime<Local>,
    /// Wall-clock end.
    pub ended_at: DateTime<Local>,
}

/// Runs one job-file line through the host shell and times it.
///
/// Stdio is inherited; the scheduler's per-task output files receive
/// whatever the command prints. The command failing is not an error of
/// this program — its exit code is captured faithfully for the caller to
/// record and propagate.
///
/// # Errors
/// Returns [`RunnerError::Spawn`] only when the shell itself cannot be
/// started.
pub fn execute(command: &str) -> Result<ExecutionResult, RunnerError> {
    info!(command, "executing task command");
    let started_at = Local::now();
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|source| RunnerError::Spawn { source })?;
    let ended_at = Local::now();
    let exit_code = exit_code_of(&status);
    debug!(exit_code, "task command finished");
    Ok(ExecutionResult {
        exit_code,
        started_at,
        ended_at,
    })
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// One finished task, as recorded in the stats file.
///
/// Created exactly once per executed task and never mutated after the
/// append.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRecord {
    /// The task's zero-based array index.
    pub task_index: usize,
    /// Exit code of the task command.
    pub exit_code: i32,
    /// Node the task ran on.
    pub hostname: String,
    /// Start time, `%Y-%m-%d %H:%M:%S`.
    pub time_start: String,
    /// End time, same format.
    pub time_end: String,
    /// Elapsed wall-clock seconds.
    pub elapsed_seconds: f64,
    /// The job-file line that was executed.
    pub command_string: String,
}

impl TaskRecord {
    /// Builds the record for one execution on the current host.
    #[must_use]
    pub fn from_execution(task: ArrayTask, result: &ExecutionResult, command: &str) -> Self {
        let elapsed = result.ended_at.signed_duration_since(result.started_at);
        Self {
            task_index: task.task_index,
            exit_code: result.exit_code,
            hostname: local_hostname(),
            time_start: result.started_at.format(TIME_FORMAT).to_string(),
            time_end: result.ended_at.format(TIME_FORMAT).to_string(),
            elapsed_seconds: elapsed.num_milliseconds() as f64 / 1000.0,
            command_string: command.to_owned(),
        }
    }

    /// Renders the record as one newline-terminated TSV row.
    ///
    /// Columns: `Array_Task_ID`, `Exit_Code`, `Hostname`, `Time_Start`,
    /// `Time_End`, `Time_Elapsed`, `Job_String`.
    #[must_use]
    pub fn tsv_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            self.task_index,
            self.exit_code,
            self.hostname,
            self.time_start,
            self.time_end,
            self.elapsed_seconds,
            self.command_string,
        )
    }
}

/// Resolves the stats destination for one array.
///
/// A `%A` placeholder in the user-supplied name is substituted with the
/// array's parent job id, giving every array its own destination.
#[must_use]
pub fn stats_path(template: &str, array_job_id: u64) -> PathBuf {
    PathBuf::from(template.replace("%A", &array_job_id.to_string()))
}

/// Appends one record to the stats file.
///
/// The row is written with a single `write_all` on a descriptor opened in
/// append mode, so concurrently finishing tasks each land one complete
/// row; no cross-task locking is involved.
///
/// # Errors
/// Returns [`RunnerError::Stats`] when the file cannot be opened or
/// written.
pub fn append_record(path: &Path, record: &TaskRecord) -> Result<(), RunnerError> {
    let stats_err = |source| RunnerError::Stats {
        path: path.to_owned(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(stats_err)?;
    file.write_all(record.tsv_row().as_bytes()).map_err(stats_err)?;
    info!(path = %path.display(), task_index = record.task_index, "stats row appended");
    Ok(())
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case::substituted("stats-%A.tsv", 991, "stats-991.tsv")]
    #[case::twice("%A/%A.tsv", 7, "7/7.tsv")]
    #[case::absent("stats.tsv", 991, "stats.tsv")]
    fn stats_path_substitutes_parent_job_id(
        #[case] template: &str,
        #[case] job_id: u64,
        #[case] expected: &str,
    ) {
        assert_eq!(stats_path(template, job_id), PathBuf::from(expected));
    }

    #[test]
    fn execute_reports_the_commands_own_exit_code() {
        let result = execute("exit 7").expect("shell must spawn");
        assert_eq!(result.exit_code, 7);
        assert!(result.ended_at >= result.started_at);

        let result = execute("true").expect("shell must spawn");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn record_row_is_tab_separated_and_newline_terminated() {
        let task = ArrayTask {
            job_id: 1234,
            task_index: 5,
        };
        let result = execute("true").expect("shell must spawn");
        let record = TaskRecord::from_execution(task, &result, "echo five");
        let row = record.tsv_row();
        assert!(row.ends_with('\n'));
        let columns: Vec<&str> = row.trim_end().split('\t').collect();
        assert_eq!(columns.len(), 7);
        assert_eq!(columns.first(), Some(&"5"));
        assert_eq!(columns.get(1), Some(&"0"));
        assert_eq!(columns.last(), Some(&"echo five"));
    }

    #[test]
    fn from_env_rejects_missing_variables() {
        // The test runner is not a Slurm allocation, so both lookups miss.
        let err = ArrayTask::from_env().expect_err("missing env must fail");
        assert!(matches!(err, RunnerError::MissingEnv { .. }));
    }
}
