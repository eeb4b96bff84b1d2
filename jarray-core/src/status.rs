//! Status aggregation over the accounting tool's output.
//!
//! One query per job id: every pipe-delimited accounting line is read
//! into `(task index, state)` pairs, indices are grouped by state, and
//! the grouping drives both the human summary and the job-file filter
//! that re-derives "only the tasks that did not complete". Buckets are
//! rebuilt fully on every query — the accounting source is the single
//! source of truth and may change between queries.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    alias::resolve_alias,
    error::define_error_codes,
    range::{collapse, expand},
    scheduler::{Scheduler, SchedulerError},
};

/// Errors raised while aggregating task states.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StatusError {
    /// The accounting tool returned nothing for the job id.
    #[error("accounting returned no results for job {job_id}")]
    NoRows {
        /// The queried job id.
        job_id: u64,
    },
    /// A state filter token matched nothing in the known vocabulary.
    #[error("unrecognised job state `{state}`")]
    UnknownState {
        /// The token as supplied.
        state: String,
    },
    /// Querying the accounting tool failed.
    #[error("querying the accounting tool failed: {source}")]
    Scheduler {
        /// Underlying scheduler invocation failure.
        #[from]
        source: SchedulerError,
    },
}

define_error_codes! {
    /// Stable codes describing [`StatusError`] variants.
    enum StatusErrorCode for StatusError {
        /// The accounting tool returned nothing for the job id.
        NoRows => NoRows { .. } => "ACCOUNTING_EMPTY",
        /// A state filter token matched nothing in the known vocabulary.
        UnknownState => UnknownState { .. } => "UNKNOWN_STATE",
        /// Querying the accounting tool failed.
        Scheduler => Scheduler { .. } => "ACCOUNTING_QUERY_FAILED",
    }
}

/// One parsed accounting line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccountingRow {
    /// Job name as reported.
    pub name: String,
    /// Task indices the line covers.
    pub indices: Vec<usize>,
    /// State name, truncated at the first whitespace.
    pub state: String,
}

/// Parses one pipe-delimited accounting line.
///
/// The expected shape is `name|jobid[_index]|state`. The index suffix is
/// decoded with the same bracket vocabulary as [`expand`]; an id without
/// any suffix degrades to a single-task reading at index 0. Lines of any
/// other shape, including ids whose suffix fails to decode, are skipped
/// with a `None`, because accounting scraping is best-effort.
///
/// # Examples
/// ```
/// use jarray_core::parse_accounting_line;
///
/// let row = parse_accounting_line("sweep|1234_[2-4]|FAILED").expect("row must parse");
/// assert_eq!(row.indices, vec![2, 3, 4]);
/// assert_eq!(row.state, "FAILED");
///
/// let row = parse_accounting_line("sweep|1234_7|CANCELLED by 1000").expect("row must parse");
/// assert_eq!(row.indices, vec![7]);
/// assert_eq!(row.state, "CANCELLED");
///
/// assert!(parse_accounting_line("some narrative line").is_none());
/// ```
#[must_use]
pub fn parse_accounting_line(line: &str) -> Option<AccountingRow> {
    let mut fields = line.split('|');
    let (name, id_field, state_field) = match (fields.next(), fields.next(), fields.next()) {
        (Some(name), Some(id), Some(state)) if fields.next().is_none() => (name, id, state),
        _ => return None,
    };

    let state = state_field.split_whitespace().next()?.to_owned();
    let indices = match id_field.split_once('_') {
        Some((_, suffix)) => match expand(suffix) {
            Ok(indices) => indices,
            Err(err) => {
                debug!(line, error = %err, "skipping accounting line with undecodable index");
                return None;
            }
        },
        None => {
            // Not an array id; read the job as a single task.
            warn!(id = id_field, "job does not look like an array");
            vec![0]
        }
    };

    Some(AccountingRow {
        name: name.to_owned(),
        indices,
        state,
    })
}

/// Queries the accounting source and parses its rows for one job id.
///
/// Lines that do not match the expected shape are dropped by
/// [`parse_accounting_line`]; if nothing usable remains the job id is
/// unknown to accounting and that is an input error, not a silent empty
/// report.
///
/// # Errors
/// Returns [`StatusError::Scheduler`] when the accounting tool cannot be
/// invoked and [`StatusError::NoRows`] when no line parses.
pub fn query_rows(
    scheduler: &dyn Scheduler,
    job_id: u64,
) -> Result<Vec<AccountingRow>, StatusError> {
    let lines = scheduler.accounting_lines(job_id)?;
    let rows: Vec<AccountingRow> = lines
        .iter()
        .filter_map(|line| parse_accounting_line(line))
        .collect();
    if rows.is_empty() {
        return Err(StatusError::NoRows { job_id });
    }
    debug!(job_id, rows = rows.len(), "parsed accounting rows");
    Ok(rows)
}

/// Task indices grouped by the state the accounting source reports.
///
/// State names are free-form strings rather than a fixed enum, so the
/// accounting vocabulary can grow without this program noticing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StateBuckets {
    by_state: BTreeMap<String, BTreeSet<usize>>,
    /// Job name from the first parsed row, if any.
    pub job_name: Option<String>,
}

impl StateBuckets {
    /// Builds buckets from accounting rows.
    ///
    /// A task index seen in several rows (retries) contributes only the
    /// most recent state encountered; callers needing full history should
    /// not use this aggregation.
    #[must_use]
    pub fn from_rows(rows: &[AccountingRow]) -> Self {
        let mut latest: BTreeMap<usize, &str> = BTreeMap::new();
        for row in rows {
            for &index in &row.indices {
                latest.insert(index, row.state.as_str());
            }
        }

        let mut by_state: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (index, state) in latest {
            by_state.entry(state.to_owned()).or_default().insert(index);
        }
        Self {
            by_state,
            job_name: rows.first().map(|row| row.name.clone()),
        }
    }

    /// Whether no task indices were grouped at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_state.is_empty()
    }

    /// Iterates over `(state, indices)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<usize>)> {
        self.by_state
            .iter()
            .map(|(state, indices)| (state.as_str(), indices))
    }

    /// Union of the index sets for the selected states.
    #[must_use]
    pub fn indices_for(&self, states: &BTreeSet<String>) -> BTreeSet<usize> {
        self.by_state
            .iter()
            .filter(|(state, _)| states.contains(*state))
            .flat_map(|(_, indices)| indices.iter().copied())
            .collect()
    }

    /// Every task index seen, across all states.
    #[must_use]
    pub fn all_indices(&self) -> BTreeSet<usize> {
        self.by_state
            .values()
            .flat_map(|indices| indices.iter().copied())
            .collect()
    }

    /// The highest task index seen, if any.
    #[must_use]
    pub fn max_index(&self) -> Option<usize> {
        self.by_state
            .values()
            .filter_map(|indices| indices.last().copied())
            .max()
    }
}

/// Writes the per-state summary table.
///
/// One row per observed state with its count; `long` adds the collapsed
/// index list. Column widths are computed from the data. No ordering
/// across states is guaranteed.
///
/// # Errors
/// Propagates I/O failures from the writer.
pub fn render_summary<W: Write>(buckets: &StateBuckets, long: bool, mut out: W) -> io::Result<()> {
    let rows: Vec<(String, String, String)> = buckets
        .iter()
        .map(|(state, indices)| {
            let sorted: Vec<usize> = indices.iter().copied().collect();
            (
                state.to_owned(),
                indices.len().to_string(),
                collapse(&sorted),
            )
        })
        .collect();

    let mut state_width = "Job_State".len();
    let mut count_width = "Count".len();
    for (state, count, _) in &rows {
        state_width = state_width.max(state.len());
        count_width = count_width.max(count.len());
    }

    let header = |out: &mut W, state: &str, count: &str, indices: &str| {
        if long {
            writeln!(out, "{state:<state_width$} {count:>count_width$} {indices}")
        } else {
            writeln!(out, "{state:<state_width$} {count:>count_width$}")
        }
    };
    header(&mut out, "Job_State", "Count", "Indices")?;
    header(
        &mut out,
        &"-".repeat("Job_State".len()),
        &"-".repeat("Count".len()),
        &"-".repeat("Indices".len()),
    )?;
    for (state, count, indices) in &rows {
        header(&mut out, state, count, indices)?;
    }
    Ok(())
}

/// A known scheduler job state, for validation and `--list-states`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobState {
    /// Accounting short code, e.g. `CD`.
    pub code: &'static str,
    /// Canonical long name, e.g. `COMPLETED`.
    pub name: &'static str,
    /// Human description.
    pub description: &'static str,
}

/// The job states the scheduler documents.
///
/// The accounting source's vocabulary can grow beyond this list; buckets
/// carry whatever it reports. This table only validates user filters and
/// feeds `--list-states`.
pub const JOB_STATES: &[JobState] = &[
    JobState {
        code: "BF",
        name: "BOOT_FAIL",
        description: "Job terminated due to launch failure, typically a hardware failure.",
    },
    JobState {
        code: "CA",
        name: "CANCELLED",
        description: "Job was explicitly cancelled by the user or system administrator.",
    },
    JobState {
        code: "CD",
        name: "COMPLETED",
        description: "Job terminated all processes on all nodes with an exit code of zero.",
    },
    JobState {
        code: "DL",
        name: "DEADLINE",
        description: "Job terminated on deadline.",
    },
    JobState {
        code: "F",
        name: "FAILED",
        description: "Job terminated with non-zero exit code or other failure condition.",
    },
    JobState {
        code: "NF",
        name: "NODE_FAIL",
        description: "Job terminated due to failure of one or more allocated nodes.",
    },
    JobState {
        code: "OOM",
        name: "OUT_OF_MEMORY",
        description: "Job experienced an out of memory error.",
    },
    JobState {
        code: "PD",
        name: "PENDING",
        description: "Job is awaiting resource allocation.",
    },
    JobState {
        code: "PR",
        name: "PREEMPTED",
        description: "Job terminated due to preemption.",
    },
    JobState {
        code: "R",
        name: "RUNNING",
        description: "Job currently has an allocation.",
    },
    JobState {
        code: "RQ",
        name: "REQUEUED",
        description: "Job was requeued.",
    },
    JobState {
        code: "RS",
        name: "RESIZING",
        description: "Job is about to change size.",
    },
    JobState {
        code: "RV",
        name: "REVOKED",
        description: "Sibling was removed from cluster due to other cluster starting the job.",
    },
    JobState {
        code: "S",
        name: "SUSPENDED",
        description: "Job has an allocation, but execution has been suspended.",
    },
    JobState {
        code: "TO",
        name: "TIMEOUT",
        description: "Job terminated upon reaching its time limit.",
    },
];

/// Default states for the job-file filter.
///
/// FAILED and TIMEOUT are deliberately absent: unchanged jobs are
/// expected to reproduce those results.
pub const DEFAULT_FILTER_STATES: &str = "CANCELLED,NODE_FAIL,PREEMPTED";

/// Resolves a comma-separated state filter to canonical state names.
///
/// Each token is upper-cased, then accepted as a short code, a long
/// name, or a unique left-anchored prefix of a long name.
///
/// # Errors
/// Returns [`StatusError::UnknownState`] for any token that resolves to
/// nothing.
///
/// # Examples
/// ```
/// use jarray_core::resolve_state_filters;
///
/// let states = resolve_state_filters("ca,node_fail,PREEMPT")?;
/// assert!(states.contains("CANCELLED"));
/// assert!(states.contains("NODE_FAIL"));
/// assert!(states.contains("PREEMPTED"));
/// # Ok::<(), jarray_core::StatusError>(())
/// ```
pub fn resolve_state_filters(raw: &str) -> Result<BTreeSet<String>, StatusError> {
    let names: Vec<&str> = JOB_STATES.iter().map(|state| state.name).collect();
    let mut resolved = BTreeSet::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let upper = token.to_uppercase();
        let canonical = JOB_STATES
            .iter()
            .find(|state| state.code == upper || state.name == upper)
            .map(|state| state.name)
            .or_else(|| {
                let aliased = resolve_alias(&names, &upper);
                names.contains(&aliased).then_some(aliased)
            })
            .ok_or_else(|| StatusError::UnknownState {
                state: token.to_owned(),
            })?;
        resolved.insert(canonical.to_owned());
    }
    Ok(resolved)
}
