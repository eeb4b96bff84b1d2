//! Process seam to the scheduler and accounting binaries.
//!
//! `sbatch`, `sacct`, and `scontrol` are opaque external collaborators;
//! their textual output is the only contract. The [`Scheduler`] trait is
//! the narrow interface the rest of the crate depends on, so tests can
//! substitute canned output without a cluster in sight.

use std::{
    io,
    path::Path,
    process::{Command, Stdio},
};

use thiserror::Error;
use tracing::debug;

use crate::error::define_error_codes;

/// Errors raised while invoking the external scheduler tools.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The tool could not be invoked at all — a configuration problem
    /// outside this program's control, reported once with no retry.
    #[error("cannot invoke `{command}`: {source}")]
    Unavailable {
        /// The command line that failed to start.
        command: String,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The tool ran but reported failure.
    #[error("`{command}` exited with status {status}")]
    Failed {
        /// The command line that failed.
        command: String,
        /// The tool's exit status.
        status: i32,
    },
    /// The tool ran but produced no usable output.
    #[error("`{command}` produced no output")]
    EmptyOutput {
        /// The command line that produced nothing.
        command: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`SchedulerError`] variants.
    enum SchedulerErrorCode for SchedulerError {
        /// The tool could not be invoked at all.
        Unavailable => Unavailable { .. } => "SCHEDULER_UNAVAILABLE",
        /// The tool ran but reported failure.
        Failed => Failed { .. } => "SCHEDULER_FAILED",
        /// The tool ran but produced no usable output.
        EmptyOutput => EmptyOutput { .. } => "SCHEDULER_EMPTY_OUTPUT",
    }
}

/// Configuration facts reported by the scheduler.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchedulerInfo {
    /// Scheduler release, e.g. `23.02.7`.
    pub version: Option<String>,
    /// Upper bound on array indices the cluster accepts.
    pub max_array_size: Option<usize>,
}

/// Narrow interface to the scheduler and accounting binaries.
pub trait Scheduler {
    /// Full help text of the submission tool.
    ///
    /// # Errors
    /// Returns [`SchedulerError`] when the tool cannot run or prints
    /// nothing; downstream behaviour is undefined without its output.
    fn help_text(&self) -> Result<String, SchedulerError>;

    /// Version and limits from the scheduler configuration.
    ///
    /// # Errors
    /// Returns [`SchedulerError`] when the configuration tool cannot run.
    fn info(&self) -> Result<SchedulerInfo, SchedulerError>;

    /// Raw accounting lines for one job id.
    ///
    /// # Errors
    /// Returns [`SchedulerError`] when the accounting tool cannot run.
    fn accounting_lines(&self, job_id: u64) -> Result<Vec<String>, SchedulerError>;

    /// Submits a generated script, inheriting this process's stdio, and
    /// returns the submission tool's exit status.
    ///
    /// # Errors
    /// Returns [`SchedulerError::Unavailable`] when the tool cannot run.
    fn submit(&self, script: &Path, parsable: bool) -> Result<i32, SchedulerError>;
}

/// Production [`Scheduler`] backed by the Slurm command-line tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlurmCli;

impl SlurmCli {
    const SBATCH: &'static str = "sbatch";
    const SACCT: &'static str = "sacct";
    const SCONTROL: &'static str = "scontrol";

    fn capture(program: &str, args: &[&str]) -> Result<String, SchedulerError> {
        let rendered = render_command(program, args);
        debug!(command = %rendered, "invoking scheduler tool");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SchedulerError::Unavailable {
                command: rendered.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SchedulerError::Failed {
                command: rendered,
                status: output.status.code().unwrap_or(-1),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(SchedulerError::EmptyOutput { command: rendered });
        }
        Ok(text)
    }
}

impl Scheduler for SlurmCli {
    fn help_text(&self) -> Result<String, SchedulerError> {
        Self::capture(Self::SBATCH, &["--help"])
    }

    fn info(&self) -> Result<SchedulerInfo, SchedulerError> {
        let text = Self::capture(Self::SCONTROL, &["show", "conf"])?;
        Ok(parse_config_info(&text))
    }

    fn accounting_lines(&self, job_id: u64) -> Result<Vec<String>, SchedulerError> {
        let id = job_id.to_string();
        let text = Self::capture(Self::SACCT, &["-o", "JobName,JobID,State", "-nXPj", &id])?;
        Ok(text.lines().map(ToOwned::to_owned).collect())
    }

    fn submit(&self, script: &Path, parsable: bool) -> Result<i32, SchedulerError> {
        let mut command = Command::new(Self::SBATCH);
        if parsable {
            command.arg("--parsable");
        }
        command.arg(script);
        let rendered = format!("{} {}", Self::SBATCH, script.display());
        debug!(command = %rendered, parsable, "submitting batch script");
        let status = command
            .status()
            .map_err(|source| SchedulerError::Unavailable {
                command: rendered,
                source,
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Extracts version and MaxArraySize from `scontrol show conf` output.
///
/// Lines that do not carry either fact are ignored; both facts are
/// optional because the configuration dump varies across releases.
#[must_use]
pub fn parse_config_info(text: &str) -> SchedulerInfo {
    let mut info = SchedulerInfo::default();
    for line in text.lines() {
        if line.starts_with("SLURM_VERSION") {
            info.version = line.split_whitespace().last().map(ToOwned::to_owned);
        } else if line.starts_with("MaxArraySize") {
            info.max_array_size = line
                .split_whitespace()
                .last()
                .and_then(|value| value.parse().ok());
        }
    }
    info
}

fn render_command(program: &str, args: &[&str]) -> String {
    let mut rendered = program.to_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}
