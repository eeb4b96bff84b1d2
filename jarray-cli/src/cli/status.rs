//! The `status` command: reconcile accounting states with the job file.
//!
//! The state summary and warnings go to stderr; filtered job lines go to
//! stdout or the chosen output file, so the filtered list can be piped
//! straight back into `batch`.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    process::ExitCode,
};

use jarray_core::{
    JOB_STATES, JobFileError, Scheduler, StateBuckets, collapse, filter_tasks, query_rows,
    render_summary, resolve_state_filters, scan_tasks,
};
use tracing::{info, warn};

use super::{CliError, StatusArgs};

pub(crate) fn execute(
    args: &StatusArgs,
    scheduler: &dyn Scheduler,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<ExitCode, CliError> {
    if args.list_states {
        for state in JOB_STATES {
            writeln!(out, "\n{} or {}:\n{}", state.code, state.name, state.description)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    // clap enforces this already; programmatic callers get the same answer.
    let Some(job_id) = args.job_id else {
        return Err(CliError::MissingJobId);
    };
    let selected = resolve_state_filters(&args.states)?;

    let rows = query_rows(scheduler, job_id)?;
    let buckets = StateBuckets::from_rows(&rows);
    info!(
        job_id,
        tasks = buckets.all_indices().len(),
        states = buckets.iter().count(),
        "aggregated accounting states"
    );

    if !args.quiet {
        let all: Vec<usize> = buckets.all_indices().into_iter().collect();
        writeln!(
            err,
            "JobName: {}",
            buckets.job_name.as_deref().unwrap_or("unknown")
        )?;
        writeln!(err, "JobID:   {job_id}[{}]", collapse(&all))?;
        writeln!(err, "Array Summary:")?;
        render_summary(&buckets, args.long, &mut *err)?;
    }

    if let Some(job_file) = &args.job_file {
        let io_err = |source| JobFileError::Io {
            path: job_file.clone(),
            source,
        };
        let scanned = scan_tasks(BufReader::new(File::open(job_file).map_err(io_err)?))
            .map_err(io_err)?;
        if let Some(max_index) = buckets.max_index() {
            if max_index + 1 != scanned.total_lines {
                warn!(
                    max_index,
                    total_lines = scanned.total_lines,
                    file = %job_file.display(),
                    "job file line count and accounting indices disagree"
                );
                writeln!(
                    err,
                    "Warning! Max array index and number of lines in {} don't match. \
                     Are you sure this file is for job {job_id}?",
                    job_file.display()
                )?;
            }
        }

        let retain = buckets.indices_for(&selected);
        let reader = BufReader::new(File::open(job_file).map_err(io_err)?);
        let matched = match &args.output {
            Some(path) => {
                let target = File::create(path).map_err(|source| CliError::Write {
                    path: path.clone(),
                    source,
                })?;
                let mut writer = BufWriter::new(target);
                let matched = filter_tasks(reader, &retain, &mut writer)?;
                writer.flush()?;
                matched
            }
            None => filter_tasks(reader, &retain, &mut *out)?,
        };
        writeln!(err, "{matched} jobs matched filter.")?;
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{fs, path::Path};

    use jarray_core::{SchedulerError, SchedulerInfo};
    use tempfile::TempDir;

    struct StubScheduler {
        lines: Vec<&'static str>,
    }

    impl Scheduler for StubScheduler {
        fn help_text(&self) -> Result<String, SchedulerError> {
            Err(SchedulerError::EmptyOutput {
                command: "sbatch --help".to_owned(),
            })
        }

        fn info(&self) -> Result<SchedulerInfo, SchedulerError> {
            Ok(SchedulerInfo::default())
        }

        fn accounting_lines(&self, _job_id: u64) -> Result<Vec<String>, SchedulerError> {
            Ok(self.lines.iter().map(|line| (*line).to_owned()).collect())
        }

        fn submit(&self, _script: &Path, _parsable: bool) -> Result<i32, SchedulerError> {
            Ok(0)
        }
    }

    fn status_args(job_id: Option<u64>) -> StatusArgs {
        StatusArgs {
            job_id,
            job_file: None,
            long: false,
            list_states: false,
            output: None,
            quiet: false,
            states: jarray_core::DEFAULT_FILTER_STATES.to_owned(),
        }
    }

    #[test]
    fn list_states_prints_the_vocabulary_and_exits() {
        let mut args = status_args(None);
        args.list_states = true;
        let scheduler = StubScheduler { lines: Vec::new() };
        let mut out = Vec::new();
        let mut err = Vec::new();
        execute(&args, &scheduler, &mut out, &mut err).expect("listing must succeed");
        let text = String::from_utf8(out).expect("listing must be UTF-8");
        assert!(text.contains("CD or COMPLETED:"));
        assert!(text.contains("NF or NODE_FAIL:"));
        assert!(err.is_empty());
    }

    #[test]
    fn summary_goes_to_stderr_and_filtered_lines_to_stdout() {
        let dir = TempDir::new().expect("temp dir must create");
        let job_file = dir.path().join("jobs.txt");
        fs::write(
            &job_file,
            "echo zero\necho one\necho two\necho three\necho four\n",
        )
        .expect("job file must write");

        let scheduler = StubScheduler {
            lines: vec![
                "sweep|3131_[0-1]|COMPLETED",
                "sweep|3131_2|CANCELLED by 77",
                "sweep|3131_3|NODE_FAIL",
                "sweep|3131_4|COMPLETED",
            ],
        };
        let mut args = status_args(Some(3131));
        args.job_file = Some(job_file);
        let mut out = Vec::new();
        let mut err = Vec::new();
        execute(&args, &scheduler, &mut out, &mut err).expect("status must succeed");

        let payload = String::from_utf8(out).expect("stdout must be UTF-8");
        assert_eq!(payload, "echo two\necho three\n");

        let summary = String::from_utf8(err).expect("stderr must be UTF-8");
        assert!(summary.contains("JobName: sweep"));
        assert!(summary.contains("JobID:   3131[0-4]"));
        assert!(summary.contains("COMPLETED"));
        assert!(summary.contains("2 jobs matched filter."));
        assert!(!summary.contains("Warning!"));
    }

    #[test]
    fn line_count_mismatch_warns_but_still_filters() {
        let dir = TempDir::new().expect("temp dir must create");
        let job_file = dir.path().join("jobs.txt");
        fs::write(&job_file, "echo zero\necho one\n").expect("job file must write");

        let scheduler = StubScheduler {
            lines: vec!["other|9_[0-6]|CANCELLED"],
        };
        let mut args = status_args(Some(9));
        args.job_file = Some(job_file);
        let mut out = Vec::new();
        let mut err = Vec::new();
        execute(&args, &scheduler, &mut out, &mut err).expect("status must succeed");

        let summary = String::from_utf8(err).expect("stderr must be UTF-8");
        assert!(summary.contains("Warning!"));
        let payload = String::from_utf8(out).expect("stdout must be UTF-8");
        assert_eq!(payload, "echo zero\necho one\n");
    }

    #[test]
    fn no_accounting_rows_is_a_reported_error() {
        let scheduler = StubScheduler { lines: Vec::new() };
        let args = status_args(Some(404));
        let mut out = Vec::new();
        let mut err = Vec::new();
        let failure = execute(&args, &scheduler, &mut out, &mut err)
            .expect_err("empty accounting must fail");
        assert_eq!(failure.code(), "ACCOUNTING_EMPTY");
    }

    #[test]
    fn unknown_state_filter_is_an_input_error() {
        let scheduler = StubScheduler {
            lines: vec!["sweep|1_0|COMPLETED"],
        };
        let mut args = status_args(Some(1));
        args.states = "COMPLETED,BOGUS".to_owned();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let failure = execute(&args, &scheduler, &mut out, &mut err)
            .expect_err("unknown state must fail");
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn filtered_lines_can_go_to_an_output_file() {
        let dir = TempDir::new().expect("temp dir must create");
        let job_file = dir.path().join("jobs.txt");
        fs::write(&job_file, "echo zero\necho one\n").expect("job file must write");
        let target = dir.path().join("retry.txt");

        let scheduler = StubScheduler {
            lines: vec!["sweep|5_[0-1]|PREEMPTED"],
        };
        let mut args = status_args(Some(5));
        args.job_file = Some(job_file);
        args.output = Some(target.clone());
        args.quiet = true;
        let mut out = Vec::new();
        let mut err = Vec::new();
        execute(&args, &scheduler, &mut out, &mut err).expect("status must succeed");

        assert!(out.is_empty());
        let written = fs::read_to_string(&target).expect("output file must read");
        assert_eq!(written, "echo zero\necho one\n");
    }
}
