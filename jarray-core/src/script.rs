//! Submission-script rendering.
//!
//! The generated script is ordinary shell: an interpreter line, one
//! scheduler directive per assembled token, and the re-entrant line that
//! runs this program in single-task mode on the compute node.

use std::{
    io::{self, Write},
    path::Path,
};

/// A generated submission script, ready to render.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchScript {
    /// Assembled directive tokens, one `#SBATCH` line each.
    pub directives: Vec<String>,
    /// The program name shown in the do-not-edit marker.
    pub program: String,
    /// The per-task invocation line.
    pub run_line: String,
}

impl BatchScript {
    /// Writes the script.
    ///
    /// # Errors
    /// Propagates I/O failures from the writer.
    ///
    /// # Examples
    /// ```
    /// use jarray_core::BatchScript;
    ///
    /// let script = BatchScript {
    ///     directives: vec!["--array=0-2".into()],
    ///     program: "jarray".into(),
    ///     run_line: "/usr/bin/jarray run jobs.txt".into(),
    /// };
    /// let mut out = Vec::new();
    /// script.render(&mut out)?;
    /// let text = String::from_utf8(out)?;
    /// assert!(text.starts_with("#!/bin/bash\n"));
    /// assert!(text.contains("#SBATCH --array=0-2\n"));
    /// assert!(text.ends_with("/usr/bin/jarray run jobs.txt\n"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn render<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "#!/bin/bash")?;
        for directive in &self.directives {
            writeln!(out, "#SBATCH {directive}")?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "# DO NOT EDIT BELOW HERE, instead run {} batch again",
            self.program
        )?;
        writeln!(out, "{}", self.run_line)?;
        Ok(())
    }
}

/// Builds the per-task invocation line embedded in the script.
///
/// The generated script re-enters this program in single-task mode on
/// the compute node, forwarding the effective log level and, when stats
/// are wanted, the stats destination template.
#[must_use]
pub fn run_invocation(
    program: &Path,
    log_level: &str,
    job_file: &Path,
    stats_file: Option<&str>,
) -> String {
    let mut line = format!(
        "{} --log-level={log_level} run {}",
        program.display(),
        quote_word(&job_file.to_string_lossy()),
    );
    if let Some(stats) = stats_file {
        line.push_str(" --stats-file=");
        line.push_str(&quote_word(stats));
    }
    line
}

// Paths cannot contain NUL, the only input shlex refuses.
fn quote_word(word: &str) -> String {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| word.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_directives_in_order_between_shebang_and_run_line() {
        let script = BatchScript {
            directives: vec![
                "--job-name=jarray-jobs".to_owned(),
                "--output='jarray_logs/jarray-jobs-%A_%a-%N.out'".to_owned(),
                "--array=0-4,9".to_owned(),
                "--partition=general".to_owned(),
            ],
            program: "jarray".to_owned(),
            run_line: "/opt/bin/jarray --log-level=warning run jobs.txt".to_owned(),
        };
        let mut out = Vec::new();
        script.render(&mut out).expect("render must succeed");
        let text = String::from_utf8(out).expect("script must be UTF-8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"#!/bin/bash"));
        assert_eq!(lines.get(1), Some(&"#SBATCH --job-name=jarray-jobs"));
        assert_eq!(lines.get(3), Some(&"#SBATCH --array=0-4,9"));
        assert_eq!(
            lines.last(),
            Some(&"/opt/bin/jarray --log-level=warning run jobs.txt")
        );
        assert!(text.contains("# DO NOT EDIT BELOW HERE, instead run jarray batch again"));
    }

    #[test]
    fn run_invocation_quotes_awkward_paths() {
        let line = run_invocation(
            Path::new("/opt/bin/jarray"),
            "warning",
            Path::new("my jobs.txt"),
            Some("stats-%A.tsv"),
        );
        assert_eq!(
            line,
            "/opt/bin/jarray --log-level=warning run \"my jobs.txt\" --stats-file=\"stats-%A.tsv\""
        );
    }

    #[test]
    fn run_invocation_without_stats_omits_the_flag() {
        let line = run_invocation(
            Path::new("jarray"),
            "debug",
            Path::new("jobs.txt"),
            None,
        );
        assert_eq!(line, "jarray --log-level=debug run jobs.txt");
    }
}
