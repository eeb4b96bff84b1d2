//! The `batch` command: job file in, submission script out.

use std::{
    env,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use chrono::Local;
use jarray_core::{
    BatchScript, FlagError, FlagRegistry, FlagValue, JobFileError, Scheduler, assemble, collapse,
    ensure_snapshot, run_invocation, scan_tasks,
};
use tracing::{info, warn};

use super::{BatchArgs, CliError};
use crate::logging::LogContext;

/// Long names of the options `batch` declares itself. Anything else the
/// scheduler accepts is forwarded verbatim.
const OWNED_LONG_NAMES: &[&str] = &[
    "array",
    "batch-file",
    "help",
    "job-name",
    "log-level",
    "max-array-tasks",
    "output",
    "parsable",
    "stats-file",
    "stdout",
    "step-array-tasks",
    "submit",
];

pub(crate) fn execute(
    args: BatchArgs,
    ctx: &LogContext,
    scheduler: &dyn Scheduler,
    registry_cache: &Path,
    out: &mut dyn Write,
) -> Result<ExitCode, CliError> {
    let mut opts = args;

    let scanned = {
        let file = open_job_file(&opts.job_file)?;
        scan_tasks(BufReader::new(file)).map_err(|source| JobFileError::Io {
            path: opts.job_file.clone(),
            source,
        })?
    };
    if scanned.indices.is_empty() {
        return Err(JobFileError::NoTasks {
            path: opts.job_file.clone(),
        }
        .into());
    }
    info!(
        jobs = scanned.indices.len(),
        lines = scanned.total_lines,
        file = %opts.job_file.display(),
        "scanned job file"
    );

    let (snapshot, scheduler_info) = ensure_snapshot(scheduler, registry_cache)?;
    let registry = FlagRegistry::new(&snapshot.descriptors, OWNED_LONG_NAMES);
    let partitioned = registry.partition(&opts.passthrough)?;
    for owned in &partitioned.owned {
        apply_owned(&mut opts, owned)?;
    }
    if opts.submit && opts.stdout {
        return Err(CliError::SubmitFromStdout);
    }

    if let (Some(limit), Some(max)) = (
        scheduler_info.and_then(|info| info.max_array_size),
        scanned.indices.last(),
    ) {
        if *max >= limit {
            warn!(
                max_index = max,
                max_array_size = limit,
                "array exceeds the scheduler's MaxArraySize; submission will be rejected"
            );
        }
    }

    let stem = job_file_stem(&opts.job_file);
    let job_name = opts
        .job_name
        .clone()
        .unwrap_or_else(|| format!("jarray-{stem}"));
    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| format!("jarray_logs/jarray-{stem}-%A_%a-%N.out"));
    ensure_output_dir(&output)?;

    let array_spec = opts.array.clone().unwrap_or_else(|| {
        let mut spec = collapse(&scanned.indices);
        if let Some(step) = opts.step_array_tasks {
            spec = format!("{spec}:{step}");
        }
        if let Some(max) = opts.max_array_tasks {
            spec = format!("{spec}%{max}");
        }
        spec
    });

    let computed = [
        FlagValue::with_value("job-name", job_name),
        FlagValue::with_value("output", output),
        FlagValue::with_value("array", array_spec),
    ];
    let directives = assemble(&computed, &partitioned.forwarded)?;

    let program = env::current_exe().unwrap_or_else(|_| PathBuf::from("jarray"));
    let script = BatchScript {
        directives,
        program: "jarray".to_owned(),
        run_line: run_invocation(
            &program,
            ctx.level.name(),
            &opts.job_file,
            opts.stats_file.as_deref(),
        ),
    };

    if opts.stdout {
        script.render(&mut *out)?;
        return Ok(ExitCode::SUCCESS);
    }

    let script_name = opts.batch_file.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "jarray-{stem}-{}.sh",
            Local::now().format("%Y-%m-%d")
        ))
    });
    write_script(&script, &script_name)?;
    info!(script = %script_name.display(), "batch script written");

    if opts.submit {
        let status = scheduler.submit(&script_name, opts.parsable)?;
        info!(status, "sbatch finished");
        return Ok(ExitCode::from(u8::try_from(status).unwrap_or(1)));
    }

    writeln!(
        out,
        "Batch script generated. To submit your job array, run:\n sbatch {}",
        script_name.display()
    )?;
    Ok(ExitCode::SUCCESS)
}

fn apply_owned(opts: &mut BatchArgs, flag: &FlagValue) -> Result<(), CliError> {
    let require_value = || {
        flag.value.clone().ok_or(FlagError::MissingValue {
            flag: flag.long.clone(),
        })
    };
    match flag.long.as_str() {
        "array" => opts.array = Some(require_value()?),
        "job-name" => opts.job_name = Some(require_value()?),
        "output" => opts.output = Some(require_value()?),
        "batch-file" => opts.batch_file = Some(PathBuf::from(require_value()?)),
        "stats-file" => opts.stats_file = Some(require_value()?),
        "max-array-tasks" => opts.max_array_tasks = Some(parse_count(&flag.long, &require_value()?)?),
        "step-array-tasks" => {
            opts.step_array_tasks = Some(parse_count(&flag.long, &require_value()?)?);
        }
        "submit" => opts.submit = true,
        "stdout" => opts.stdout = true,
        "parsable" => opts.parsable = true,
        other => {
            return Err(CliError::OwnedAfterSeparator {
                flag: other.to_owned(),
            });
        }
    }
    Ok(())
}

fn parse_count(flag: &str, value: &str) -> Result<usize, CliError> {
    value.parse().map_err(|_| CliError::InvalidNumber {
        flag: flag.to_owned(),
        value: value.to_owned(),
    })
}

fn open_job_file(path: &Path) -> Result<File, CliError> {
    File::open(path)
        .map_err(|source| {
            JobFileError::Io {
                path: path.to_owned(),
                source,
            }
            .into()
        })
}

fn ensure_output_dir(output: &str) -> Result<(), CliError> {
    let Some(parent) = Path::new(output).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|source| CliError::Write {
        path: parent.to_owned(),
        source,
    })
}

fn write_script(script: &BatchScript, path: &Path) -> Result<(), CliError> {
    let write_err = |source| CliError::Write {
        path: path.to_owned(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    script.render(&mut writer).map_err(write_err)?;
    writer.flush().map_err(write_err)
}

fn job_file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map_or_else(|| "jobs".to_owned(), ToOwned::to_owned)
}
