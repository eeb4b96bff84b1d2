//! Command-line interface orchestration for jarray.
//!
//! Three subcommands mirror the life of a job array: `batch` turns a job
//! file into a submission script, `run` executes one task of it on the
//! compute node, and `status` reconciles accounting states back to the
//! job file. Scheduler flags jarray does not interpret itself are passed
//! after `--` and forwarded verbatim.

mod batch;
mod run;
mod status;

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use jarray_core::{
    FlagError, JobFileError, RangeError, RegistryError, RunnerError, Scheduler, SchedulerError,
    SchedulerErrorCode, StatusError, resolve_alias,
};
use thiserror::Error;

use crate::logging::{LogContext, LogLevel, parse_log_level};

const SUBCOMMANDS: &[&str] = &["batch", "run", "status"];

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser)]
#[command(
    name = "jarray",
    about = "Turn a text file of commands into a scheduler job array.",
    version
)]
pub struct Cli {
    /// Minimum log severity (debug, info, warning, error, critical).
    #[arg(long, global = true, hide = true, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a batch submission script for a job array based on a text
    /// file of jobs, one per line.
    Batch(BatchArgs),
    /// Run one array task from the job file (used by generated scripts).
    Run(RunArgs),
    /// Summarise per-task states for a job array and filter the job file.
    Status(StatusArgs),
}

impl Command {
    /// The subcommand's canonical name, for span labelling.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::Run(_) => "run",
            Self::Status(_) => "status",
        }
    }
}

/// Options accepted by the `batch` command.
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Job file, one self-contained job per line.
    #[arg(value_name = "jobs.txt")]
    pub job_file: PathBuf,

    /// Name for the batch script file. Defaults to jarray-<jobfile>-YYYY-MM-DD.sh.
    #[arg(long, value_name = "sub_script.sh")]
    pub batch_file: Option<PathBuf>,

    /// Name of your job array. Defaults to jarray-<jobfile>.
    #[arg(short = 'J', long, value_name = "jobname")]
    pub job_name: Option<String>,

    /// Scheduler output file pattern, one file per task. Set to /dev/null
    /// to suppress output files. Defaults to
    /// jarray_logs/jarray-<jobfile>-%A_%a-%N.out.
    #[arg(short = 'o', long, value_name = "fmt_string")]
    pub output: Option<String>,

    /// Maximum number of simultaneously running tasks from the array.
    #[arg(long, value_name = "number")]
    pub max_array_tasks: Option<usize>,

    /// Run only every STEP-th task from the array.
    #[arg(long, value_name = "number", hide = true)]
    pub step_array_tasks: Option<usize>,

    /// Save tab-separated task stats to this file. Add %A to the name to
    /// include the array job id.
    #[arg(long, value_name = "stats.tsv")]
    pub stats_file: Option<String>,

    /// Submit the job script after creating it.
    #[arg(long)]
    pub submit: bool,

    /// Write the script to stdout instead of a file.
    #[arg(long, hide = true)]
    pub stdout: bool,

    /// Forwarded to sbatch when submitting.
    #[arg(long, hide = true)]
    pub parsable: bool,

    /// Array specification; computed from the job file unless overridden.
    #[arg(short = 'a', long, hide = true, value_name = "spec")]
    pub array: Option<String>,

    /// Scheduler flags forwarded verbatim, given after `--`.
    #[arg(last = true, allow_hyphen_values = true, value_name = "SCHEDULER FLAGS")]
    pub passthrough: Vec<String>,
}

/// Options accepted by the `run` command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Job file, one self-contained job per line.
    #[arg(value_name = "jobs.txt")]
    pub job_file: PathBuf,

    /// Save tab-separated task stats to this file. Add %A to the name to
    /// include the array job id.
    #[arg(long, value_name = "stats.tsv")]
    pub stats_file: Option<String>,
}

/// Options accepted by the `status` command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// The JobID of a job array (e.g. 1234, not 1234_5).
    #[arg(value_name = "JobID", required_unless_present = "list_states")]
    pub job_id: Option<u64>,

    /// Job file, one job per line (not your job submission script).
    #[arg(short = 'f', long, value_name = "jobs.txt")]
    pub job_file: Option<PathBuf>,

    /// Print array indices in the state summary.
    #[arg(short = 'l', long)]
    pub long: bool,

    /// Print the job states this program knows about, then exit.
    #[arg(long)]
    pub list_states: bool,

    /// Output file for filtered jobs. Default is to print to stdout.
    #[arg(short = 'o', long, value_name = "new-jobs.txt")]
    pub output: Option<PathBuf>,

    /// Suppress printing the state summary.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Comma-separated states to filter the job file with. FAILED and
    /// TIMEOUT are not defaults because unchanged jobs are expected to
    /// reproduce those results.
    #[arg(
        short = 's',
        long,
        value_name = "states",
        default_value = jarray_core::DEFAULT_FILTER_STATES
    )]
    pub states: String,
}

/// Errors surfaced while executing CLI commands.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CliError {
    /// Job-file reading failed or found nothing runnable.
    #[error(transparent)]
    JobFile(#[from] JobFileError),
    /// Passthrough flag handling failed.
    #[error(transparent)]
    Flags(#[from] FlagError),
    /// A range specification did not parse.
    #[error(transparent)]
    Range(#[from] RangeError),
    /// Task execution machinery failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// Status aggregation failed.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// A scheduler tool could not be used.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// The flag-registry snapshot could not be produced.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Writing to an output stream failed.
    #[error(transparent)]
    Stream(#[from] io::Error),
    /// Mutually exclusive destinations requested.
    #[error("can't run sbatch without a script file; drop --stdout or --submit")]
    SubmitFromStdout,
    /// `status` was invoked without a job id or `--list-states`.
    #[error("please specify a JobID")]
    MissingJobId,
    /// A numeric owned flag carried a non-numeric value.
    #[error("flag `--{flag}` expects a number, got `{value}`")]
    InvalidNumber {
        /// The flag's long name.
        flag: String,
        /// The value as supplied.
        value: String,
    },
    /// An option of this program was supplied after the `--` separator.
    #[error("`--{flag}` is an option of this program; pass it before `--`")]
    OwnedAfterSeparator {
        /// The flag's long name.
        flag: String,
    },
    /// A file could not be created or written.
    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        /// The destination file.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

impl CliError {
    /// Stable machine-readable code, attached to the final error event.
    ///
    /// Core errors carry their own typed codes; only the handful of
    /// CLI-local conditions are named here.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::JobFile(source) => source.code().as_str(),
            Self::Flags(source) => source.code().as_str(),
            Self::Range(source) => source.code().as_str(),
            Self::Runner(source) => source.code().as_str(),
            Self::Status(source) => source.code().as_str(),
            Self::Scheduler(source) => source.code().as_str(),
            Self::Registry(source) => source.code().as_str(),
            Self::Stream(_) => "STREAM_IO",
            Self::SubmitFromStdout => "SUBMIT_FROM_STDOUT",
            Self::MissingJobId => "MISSING_JOB_ID",
            Self::InvalidNumber { .. } => "INVALID_NUMBER",
            Self::OwnedAfterSeparator { .. } => "OWNED_AFTER_SEPARATOR",
            Self::Write { .. } => "WRITE_FAILED",
        }
    }

    /// The scheduler-tool code buried in this failure, when there is one.
    #[must_use]
    pub fn scheduler_code(&self) -> Option<SchedulerErrorCode> {
        match self {
            Self::Scheduler(source) => Some(source.code()),
            Self::Registry(RegistryError::Scheduler { source }) => Some(source.code()),
            Self::Status(StatusError::Scheduler { source }) => Some(source.code()),
            _ => None,
        }
    }

    /// Process exit code: 2 for input errors, 66 for a task line missing
    /// from the job file, 1 for everything else fatal.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::JobFile(JobFileError::NoTasks { .. })
            | Self::Flags(_)
            | Self::Range(_)
            | Self::Runner(RunnerError::MissingEnv { .. })
            | Self::Status(StatusError::UnknownState { .. })
            | Self::SubmitFromStdout
            | Self::MissingJobId
            | Self::InvalidNumber { .. }
            | Self::OwnedAfterSeparator { .. } => 2,
            Self::Runner(RunnerError::TaskNotFound { .. }) => 66,
            _ => 1,
        }
    }
}

/// Executes the CLI command represented by `cli`.
///
/// Payload output (generated scripts on `--stdout`, filtered job lines,
/// state listings) goes to `out`; human summaries and warnings go to
/// `err`, keeping `stdout` parseable.
///
/// # Errors
/// Returns [`CliError`] when parsing or execution fails; `run` otherwise
/// reflects the task's own exit status in the returned [`ExitCode`].
pub fn run_cli(
    cli: Cli,
    ctx: &LogContext,
    scheduler: &dyn Scheduler,
    registry_cache: &Path,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<ExitCode, CliError> {
    match cli.command {
        Command::Batch(args) => batch::execute(args, ctx, scheduler, registry_cache, out),
        Command::Run(args) => run::execute(&args),
        Command::Status(args) => status::execute(&args, scheduler, out, err),
    }
}

/// Default location of the flag-registry snapshot.
#[must_use]
pub fn registry_cache_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "jarray")
        .map(|dirs| dirs.cache_dir().join("sbatch-flags.json"))
        .unwrap_or_else(|| PathBuf::from(".jarray-sbatch-flags.json"))
}

/// Resolves a unique left-anchored subcommand abbreviation in `args`.
///
/// Only the first token that does not look like an option is touched, so
/// `jarray st 1234` works while option values pass through untouched.
#[must_use]
pub fn normalise_args(args: Vec<String>) -> Vec<String> {
    let mut normalised = args;
    let mut skip_value = false;
    for token in normalised.iter_mut().skip(1) {
        if skip_value {
            skip_value = false;
            continue;
        }
        if token.as_str() == "--log-level" {
            skip_value = true;
            continue;
        }
        if token.starts_with('-') {
            continue;
        }
        let resolved = resolve_alias(SUBCOMMANDS, token.as_str()).to_owned();
        if resolved != *token {
            *token = resolved;
        }
        break;
    }
    normalised
}
