//! Help-text introspection for the scheduler's submission tool.
//!
//! `sbatch --help` is the only machine-readable description of the flags a
//! given scheduler version accepts, so the submission surface is scraped
//! from it: one regex per line, capturing an optional short flag, the long
//! flag, and whether the flag takes a required, optional, or no value.
//! This is a best-effort heuristic, not a grammar — narrative lines and
//! entries whose argument indicator folds onto a continuation line are
//! skipped without complaint.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How many values a scraped flag accepts.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FlagArity {
    /// Boolean flag; its presence is the whole message.
    None,
    /// The flag requires exactly one value (`--flag=VALUE`).
    Required,
    /// The flag optionally takes one value (`--flag[=VALUE]`).
    Optional,
}

/// One flag recognised by the scheduler's submission tool.
///
/// Immutable once scraped; the registry snapshot serialises these.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlagDescriptor {
    /// Short single-letter form, when the tool advertises one.
    pub short: Option<char>,
    /// Long name without the leading dashes, e.g. `job-name`.
    pub long: String,
    /// Whether the flag takes a value.
    pub arity: FlagArity,
    /// Placeholder text shown in the help entry, e.g. `indexes`.
    pub placeholder: Option<String>,
}

// Matches e.g. "  -a, --array=indexes", "      --hold", "      --nice[=value]".
static HELP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\W{1,10}(-[a-zA-Z])?,?\W{1,3}(--[a-zA-Z\-]+)(=\[?[a-zA-Z\-_\[\]<>|.:!@{}]*\]?)?(\[=[a-zA-Z ]+\])?",
    )
    .unwrap_or_else(|err| panic!("help-line pattern must compile: {err}"))
});

/// Scrapes flag descriptors out of the submission tool's help text.
///
/// Lines that do not look like a flag definition are skipped silently;
/// partial coverage is expected and tolerable. A matching line with
/// neither `=VALUE` nor `[=VALUE]` denotes a boolean flag.
///
/// # Examples
/// ```
/// use jarray_core::{FlagArity, parse_help_text};
///
/// let help = "\
/// Usage: sbatch [OPTIONS...] executable [args...]
///
/// Parallel run options:
///   -a, --array=indexes         job array index values
///   -H, --hold                  submit job in held state
/// ";
/// let flags = parse_help_text(help);
/// assert_eq!(flags.len(), 2);
/// assert_eq!(flags[0].long, "array");
/// assert_eq!(flags[0].arity, FlagArity::Required);
/// assert_eq!(flags[1].arity, FlagArity::None);
/// ```
#[must_use]
pub fn parse_help_text(text: &str) -> Vec<FlagDescriptor> {
    text.lines().filter_map(parse_help_line).collect()
}

fn parse_help_line(line: &str) -> Option<FlagDescriptor> {
    let captures = HELP_LINE.captures(line)?;
    let short = captures
        .get(1)
        .and_then(|m| m.as_str().chars().nth(1));
    let long = captures.get(2)?.as_str().trim_start_matches('-').to_owned();

    let (arity, placeholder) = if let Some(required) = captures.get(3) {
        (
            FlagArity::Required,
            Some(required.as_str().trim_start_matches('=').to_owned()),
        )
    } else if let Some(optional) = captures.get(4) {
        let inner = optional
            .as_str()
            .trim_start_matches("[=")
            .trim_end_matches(']');
        (FlagArity::Optional, Some(inner.to_owned()))
    } else {
        (FlagArity::None, None)
    };

    Some(FlagDescriptor {
        short,
        long,
        arity,
        placeholder,
    })
}
