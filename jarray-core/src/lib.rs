//! Jarray core library.
//!
//! Everything a job-array helper needs short of an argument parser: the
//! range codec shared by submission and status reporting, the scraped
//! flag registry with ownership partitioning, job-file reading, per-task
//! execution with race-safe stats recording, and status aggregation over
//! the accounting tool's output. The scheduler binaries themselves sit
//! behind the [`Scheduler`] trait so every algorithm here is testable
//! without a cluster.

mod alias;
mod error;
mod flags;
mod introspect;
mod jobfile;
mod range;
mod registry;
mod runner;
mod scheduler;
mod script;
mod status;

pub use crate::{
    alias::resolve_alias,
    flags::{FlagError, FlagErrorCode, FlagRegistry, FlagValue, Ownership, Partitioned, assemble},
    introspect::{FlagArity, FlagDescriptor, parse_help_text},
    jobfile::{JobFileError, JobFileErrorCode, TaskIndices, filter_tasks, resolve_task, scan_tasks},
    range::{RangeError, RangeErrorCode, collapse, expand},
    registry::{RegistryError, RegistryErrorCode, RegistrySnapshot, ensure_snapshot},
    runner::{
        ArrayTask, ENV_ARRAY_JOB_ID, ENV_ARRAY_TASK_ID, ExecutionResult, RunnerError,
        RunnerErrorCode, TaskRecord, append_record, execute, stats_path,
    },
    scheduler::{
        Scheduler, SchedulerError, SchedulerErrorCode, SchedulerInfo, SlurmCli, parse_config_info,
    },
    script::{BatchScript, run_invocation},
    status::{
        AccountingRow, DEFAULT_FILTER_STATES, JOB_STATES, JobState, StateBuckets, StatusError,
        StatusErrorCode, parse_accounting_line, query_rows, render_summary, resolve_state_filters,
    },
};
