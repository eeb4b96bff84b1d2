//! Job-file reading.
//!
//! A job file is user-owned plain text, one self-contained command per
//! line. Blank lines and lines starting with `#` are not tasks, but they
//! still occupy a line number: the array index space is over *all* lines,
//! because that is the space the array specification was built from.

use std::{
    collections::BTreeSet,
    io::{self, BufRead, Write},
    path::PathBuf,
};

use thiserror::Error;

use crate::error::define_error_codes;

/// Errors raised while reading a job file.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum JobFileError {
    /// The job file contained no runnable lines.
    #[error("no jobs found in file `{}`", path.display())]
    NoTasks {
        /// The job file that was scanned.
        path: PathBuf,
    },
    /// Reading the job file failed.
    #[error("failed to read job file `{}`: {source}", path.display())]
    Io {
        /// The job file being read.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

define_error_codes! {
    /// Stable codes describing [`JobFileError`] variants.
    enum JobFileErrorCode for JobFileError {
        /// The job file contained no runnable lines.
        NoTasks => NoTasks { .. } => "JOB_FILE_NO_TASKS",
        /// Reading the job file failed.
        Io => Io { .. } => "JOB_FILE_IO",
    }
}

/// Task indices discovered in a job file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskIndices {
    /// Zero-based line numbers of runnable lines, ascending.
    pub indices: Vec<usize>,
    /// Total number of lines in the file, runnable or not.
    pub total_lines: usize,
}

/// Scans a job file for runnable line numbers.
///
/// A line is runnable unless it is blank or starts with the `#` comment
/// marker. The returned indices are ascending and duplicate-free by
/// construction, ready for [`crate::collapse`].
///
/// # Errors
/// Propagates I/O failures from the reader.
///
/// # Examples
/// ```
/// use std::io::Cursor;
/// use jarray_core::scan_tasks;
///
/// let jobs = "echo one\n\n# a comment\necho two\n";
/// let scanned = scan_tasks(Cursor::new(jobs))?;
/// assert_eq!(scanned.indices, vec![0, 3]);
/// assert_eq!(scanned.total_lines, 4);
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn scan_tasks<R: BufRead>(reader: R) -> io::Result<TaskIndices> {
    let mut indices = Vec::new();
    let mut total_lines = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        total_lines = number + 1;
        if is_task(&line) {
            indices.push(number);
        }
    }
    Ok(TaskIndices {
        indices,
        total_lines,
    })
}

/// Resolves one task index to its job-file line.
///
/// The index is a zero-based line number over all lines, skipped or not.
/// Returns `None` when the index lies beyond the end of the file: there
/// is nothing to execute, which the caller reports as a fatal condition.
///
/// # Errors
/// Propagates I/O failures from the reader.
pub fn resolve_task<R: BufRead>(reader: R, task_index: usize) -> io::Result<Option<String>> {
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if number == task_index {
            return Ok(Some(line.trim().to_owned()));
        }
    }
    Ok(None)
}

/// Copies the job-file lines whose numbers are in `retain` to `out`.
///
/// Lines are written in original order with trailing whitespace removed.
/// Returns how many lines were retained.
///
/// # Errors
/// Propagates I/O failures from either side.
pub fn filter_tasks<R: BufRead, W: Write>(
    reader: R,
    retain: &BTreeSet<usize>,
    mut out: W,
) -> io::Result<usize> {
    let mut written = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if retain.contains(&number) {
            writeln!(out, "{}", line.trim_end())?;
            written += 1;
        }
    }
    Ok(written)
}

fn is_task(line: &str) -> bool {
    !(line.starts_with('#') || line.trim().is_empty())
}
