//! Logging initialisation for the jarray CLI.
//!
//! Installs a global `tracing` subscriber with optional JSON formatting
//! and bridges the `log` facade. Instead of hiding host and user in
//! process-wide logger state, an explicit [`LogContext`] carries them and
//! the minimum severity; its fields are attached to a per-command span so
//! every event names the command, host, and user that produced it.

use std::{env, sync::OnceLock};

use jarray_core::resolve_alias;
use thiserror::Error;
use tracing::Span;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

const LOG_FORMAT_ENV: &str = "JARRAY_LOG_FORMAT";

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Severity names accepted by `--log-level`, lowest first.
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "critical"];

/// Minimum severity selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    /// Everything, including scheduler invocations.
    Debug,
    /// Progress events.
    Info,
    /// Suspicious but non-fatal conditions (the default).
    Warning,
    /// Failures.
    Error,
    /// Alias for the most severe tier.
    Critical,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }

    /// The canonical name, as accepted by `--log-level`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Parses a `--log-level` value, accepting unique left-anchored prefixes.
///
/// # Errors
/// Returns a message naming the accepted levels when the token resolves
/// to none of them.
pub fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    let token = raw.trim().to_ascii_lowercase();
    match resolve_alias(LOG_LEVELS, &token) {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        "critical" => Ok(LogLevel::Critical),
        other => Err(format!(
            "unknown log level `{other}`; expected one of {}",
            LOG_LEVELS.join(", ")
        )),
    }
}

/// Explicit logging context passed to the components that log.
///
/// Replaces hidden global logger state: the minimum severity and the
/// structured identity fields travel as a value, and the observable log
/// lines stay the same.
#[derive(Clone, Debug)]
pub struct LogContext {
    /// Node this invocation runs on.
    pub hostname: String,
    /// User this invocation runs as.
    pub username: String,
    /// Minimum severity; [`LogLevel::Warning`] unless overridden.
    pub level: LogLevel,
}

impl LogContext {
    /// Detects host and user and applies the selected severity.
    #[must_use]
    pub fn detect(level: Option<LogLevel>) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_owned());
        let username = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_owned());
        Self {
            hostname,
            username,
            level: level.unwrap_or(LogLevel::Warning),
        }
    }

    /// A span carrying this context's identity fields for one command.
    #[must_use]
    pub fn command_span(&self, command: &'static str) -> Span {
        tracing::info_span!(
            "jarray",
            command,
            host = %self.hostname,
            user = %self.username,
        )
    }
}

/// Errors raised while initialising structured logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Environment variable contained invalid UTF-8 data.
    #[error("environment variable `{name}` contained invalid UTF-8: {source}")]
    InvalidUnicode {
        /// Name of the offending environment variable.
        name: &'static str,
        /// Underlying parse failure.
        #[source]
        source: env::VarError,
    },
    /// Unsupported log format requested via `JARRAY_LOG_FORMAT`.
    #[error("unsupported log format `{provided}`; expected `human` or `json`")]
    UnsupportedFormat {
        /// Raw value supplied by the user.
        provided: String,
    },
    /// Failed to install the global tracing subscriber.
    #[error("failed to install tracing subscriber: {source}")]
    InstallFailed {
        /// Error raised by `tracing_subscriber`.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
}

/// Install global structured logging if it has not already been configured.
///
/// The log format defaults to human-readable output, but can be switched
/// to JSON by setting `JARRAY_LOG_FORMAT=json`. Diagnostics are emitted
/// to `stderr` so generated scripts and filtered job lines on `stdout`
/// remain parseable. `RUST_LOG` overrides the context's minimum severity.
///
/// # Errors
/// Returns [`LoggingError`] if the environment variable contains invalid
/// Unicode, the requested format is unsupported, or the subscriber cannot
/// be installed.
pub fn init_logging(ctx: &LogContext) -> Result<(), LoggingError> {
    if INITIALISED.get().is_some() {
        return Ok(());
    }

    match install_subscriber(ctx) {
        Ok(()) => {}
        Err(LoggingError::InstallFailed { source }) => {
            // Another subscriber owns the global slot; keep it.
            tracing::debug!(error = %source, "structured logging already configured elsewhere");
        }
        Err(err) => return Err(err),
    }
    let _ = INITIALISED.set(());
    Ok(())
}

fn install_subscriber(ctx: &LogContext) -> Result<(), LoggingError> {
    let use_json = match env::var(LOG_FORMAT_ENV) {
        Ok(raw) => parse_log_format(&raw)?,
        Err(env::VarError::NotPresent) => false,
        Err(err @ env::VarError::NotUnicode(_)) => Err(LoggingError::InvalidUnicode {
            name: LOG_FORMAT_ENV,
            source: err,
        })?,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(ctx.level.directive()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr);

    let fmt_layer = if use_json {
        fmt_layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        fmt_layer.boxed()
    };

    // Installing the log bridge is best-effort; if another logger already
    // owns the global slot we keep the existing configuration.
    let _ = LogTracer::init();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|source| LoggingError::InstallFailed { source })
}

fn parse_log_format(raw: &str) -> Result<bool, LoggingError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "human" => Ok(false),
        "json" => Ok(true),
        other => Err(LoggingError::UnsupportedFormat {
            provided: other.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("human", false)]
    #[case("HUMAN", false)]
    #[case(" json ", true)]
    fn parse_log_format_accepts_supported_values(#[case] raw: &str, #[case] expected: bool) {
        let format = parse_log_format(raw).expect("format must parse");
        assert_eq!(format, expected);
    }

    #[test]
    fn parse_log_format_rejects_unknown_values() {
        let err = parse_log_format("xml").expect_err("xml is not supported");
        match err {
            LoggingError::UnsupportedFormat { provided } => assert_eq!(provided, "xml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case::full_name("warning", LogLevel::Warning)]
    #[case::prefix("deb", LogLevel::Debug)]
    #[case::single_letter_unique("c", LogLevel::Critical)]
    #[case::uppercase("ERROR", LogLevel::Error)]
    fn parse_log_level_accepts_prefixes(#[case] raw: &str, #[case] expected: LogLevel) {
        let level = parse_log_level(raw).expect("level must parse");
        assert_eq!(level, expected);
    }

    #[test]
    fn parse_log_level_rejects_ambiguity_and_unknowns() {
        // "e" could be "error"; nothing else starts with it, so it resolves.
        assert_eq!(parse_log_level("e"), Ok(LogLevel::Error));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn detect_defaults_to_warning() {
        let ctx = LogContext::detect(None);
        assert_eq!(ctx.level, LogLevel::Warning);
        assert!(!ctx.hostname.is_empty());
    }

    #[test]
    fn init_logging_is_idempotent() {
        let ctx = LogContext::detect(None);
        init_logging(&ctx).expect("logging must initialise");
        init_logging(&ctx).expect("subsequent calls must be no-ops");
    }
}
