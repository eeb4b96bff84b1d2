//! CLI entry point for jarray.
//!
//! Normalises subcommand abbreviations, parses arguments with clap,
//! initialises logging from the explicit context, executes the command,
//! and maps failures to distinguishing exit codes. Diagnostics go to
//! stderr; generated scripts and filtered job lines own stdout.

use std::{
    env,
    io::{self, Write},
    process::ExitCode,
};

use clap::Parser;
use tracing::{error, field};

use jarray_cli::{
    cli::{self, Cli, run_cli},
    logging::{self, LogContext, LoggingError},
};
use jarray_core::SlurmCli;

fn main() -> ExitCode {
    let argv = cli::normalise_args(env::args().collect());
    let parsed = Cli::parse_from(argv);

    let ctx = LogContext::detect(parsed.log_level);
    if let Err(init_err) = logging::init_logging(&ctx) {
        report_logging_init_error(&init_err);
        return ExitCode::FAILURE;
    }

    let span = ctx.command_span(parsed.command.name());
    let _guard = span.enter();

    let scheduler = SlurmCli;
    let registry_cache = cli::registry_cache_path();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let outcome = {
        let mut out = stdout.lock();
        let mut err = stderr.lock();
        run_cli(
            parsed,
            &ctx,
            &scheduler,
            &registry_cache,
            &mut out,
            &mut err,
        )
    };

    match outcome {
        Ok(code) => code,
        Err(failure) => {
            let scheduler_code = failure
                .scheduler_code()
                .map(|code| field::display(code.as_str()));
            error!(
                error = %failure,
                code = failure.code(),
                scheduler_code,
                "command failed"
            );
            let _ = writeln!(io::stderr(), "jarray: {failure}");
            ExitCode::from(failure.exit_code())
        }
    }
}

fn report_logging_init_error(err: &LoggingError) {
    let _ = writeln!(io::stderr(), "failed to initialise logging: {err}");
}
