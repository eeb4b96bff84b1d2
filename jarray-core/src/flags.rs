//! Ownership partitioning for scheduler flags.
//!
//! The submission surface is a merge of two vocabularies: options this
//! program declares itself and options the scheduler's own tool accepts.
//! The registry classifies any supplied long name as owned or forwarded,
//! parses raw passthrough tokens against the scraped arity information,
//! and assembles the final directive tokens for the generated script.
//! Program-declared names always win ties, so a name the program shadows
//! deliberately (the array specification above all) is never forwarded.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    error::define_error_codes,
    introspect::{FlagArity, FlagDescriptor},
};

/// Errors raised while partitioning or assembling flag values.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FlagError {
    /// A supplied token is not a flag the scheduler or this program knows.
    #[error("unrecognised scheduler flag `{token}`")]
    UnknownFlag {
        /// The token as supplied.
        token: String,
    },
    /// A token appeared where a flag was expected.
    #[error("expected a flag, found `{token}`")]
    UnexpectedToken {
        /// The stray token.
        token: String,
    },
    /// A flag that requires a value was supplied without one.
    #[error("flag `--{flag}` requires a value")]
    MissingValue {
        /// Long name of the flag missing its value.
        flag: String,
    },
    /// A boolean flag was supplied with an inline value.
    #[error("flag `--{flag}` does not take a value")]
    UnexpectedValue {
        /// Long name of the flag.
        flag: String,
    },
    /// A value cannot be represented as a shell word.
    #[error("value for `--{flag}` cannot be quoted for the shell")]
    UnquotableValue {
        /// Long name of the flag.
        flag: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`FlagError`] variants.
    enum FlagErrorCode for FlagError {
        /// A supplied token is not a flag the scheduler or this program knows.
        UnknownFlag => UnknownFlag { .. } => "FLAG_UNKNOWN",
        /// A token appeared where a flag was expected.
        UnexpectedToken => UnexpectedToken { .. } => "FLAG_UNEXPECTED_TOKEN",
        /// A flag that requires a value was supplied without one.
        MissingValue => MissingValue { .. } => "FLAG_MISSING_VALUE",
        /// A boolean flag was supplied with an inline value.
        UnexpectedValue => UnexpectedValue { .. } => "FLAG_UNEXPECTED_VALUE",
        /// A value cannot be represented as a shell word.
        UnquotableValue => UnquotableValue { .. } => "FLAG_UNQUOTABLE_VALUE",
    }
}

/// Whether a flag belongs to this program or is forwarded verbatim.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ownership {
    /// Declared by this program; consumed locally, never forwarded.
    Owned,
    /// Known only to the scheduler; forwarded untouched.
    Forward,
}

/// One flag with its optional value, as supplied or as computed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlagValue {
    /// Long name without the leading dashes.
    pub long: String,
    /// Value, absent for boolean flags.
    pub value: Option<String>,
}

impl FlagValue {
    /// Convenience constructor for a flag carrying a value.
    #[must_use]
    pub fn with_value(long: &str, value: impl Into<String>) -> Self {
        Self {
            long: long.to_owned(),
            value: Some(value.into()),
        }
    }

    /// Convenience constructor for a boolean flag.
    #[must_use]
    pub fn switch(long: &str) -> Self {
        Self {
            long: long.to_owned(),
            value: None,
        }
    }
}

/// Result of partitioning passthrough tokens.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Partitioned {
    /// Values for flags this program declares; applied to its own options.
    pub owned: Vec<FlagValue>,
    /// Values forwarded verbatim to the scheduler.
    pub forwarded: Vec<FlagValue>,
}

/// The set of flags the scheduler accepts and the subset this program owns.
///
/// Built once per invocation from the scraped (or snapshotted) descriptors
/// and read-only afterwards.
#[derive(Clone, Debug)]
pub struct FlagRegistry {
    descriptors: BTreeMap<String, FlagDescriptor>,
    short_to_long: BTreeMap<char, String>,
    owned: Vec<String>,
}

impl FlagRegistry {
    /// Builds a registry from scheduler descriptors and the long names of
    /// this program's own declared options.
    ///
    /// Registering the same descriptor twice is harmless: later entries
    /// replace earlier ones keyed by long name, so classification outcomes
    /// do not change.
    #[must_use]
    pub fn new(descriptors: &[FlagDescriptor], owned: &[&str]) -> Self {
        let mut by_long = BTreeMap::new();
        let mut short_to_long = BTreeMap::new();
        for descriptor in descriptors {
            if let Some(short) = descriptor.short {
                short_to_long.insert(short, descriptor.long.clone());
            }
            by_long.insert(descriptor.long.clone(), descriptor.clone());
        }
        Self {
            descriptors: by_long,
            short_to_long,
            owned: owned.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    /// Classifies a long flag name.
    ///
    /// A flag is [`Ownership::Forward`] when the scheduler accepts it and
    /// this program does not declare it itself; everything else is
    /// [`Ownership::Owned`].
    ///
    /// # Examples
    /// ```
    /// use jarray_core::{FlagArity, FlagDescriptor, FlagRegistry, Ownership};
    ///
    /// let scraped = [FlagDescriptor {
    ///     short: None,
    ///     long: "array".into(),
    ///     arity: FlagArity::Required,
    ///     placeholder: None,
    /// }];
    /// let registry = FlagRegistry::new(&scraped, &["array"]);
    /// // The program's own name shadows the scheduler's.
    /// assert_eq!(registry.classify("array"), Ownership::Owned);
    /// ```
    #[must_use]
    pub fn classify(&self, long: &str) -> Ownership {
        if self.owned.iter().any(|name| name == long) {
            Ownership::Owned
        } else if self.descriptors.contains_key(long) {
            Ownership::Forward
        } else {
            Ownership::Owned
        }
    }

    /// Looks up the descriptor for a long name.
    #[must_use]
    pub fn descriptor(&self, long: &str) -> Option<&FlagDescriptor> {
        self.descriptors.get(long)
    }

    /// Whether the scheduler or this program recognises the long name.
    #[must_use]
    pub fn is_known(&self, long: &str) -> bool {
        self.descriptors.contains_key(long) || self.owned.iter().any(|name| name == long)
    }

    /// Partitions raw passthrough tokens into owned and forwarded values.
    ///
    /// Tokens are read as `--name=value`, `--name value`, `-x value`, or
    /// bare switches, with the value shape decided by each flag's scraped
    /// arity: a required value may be inline or the next token, an
    /// optional value is consumed only when inline or when the next token
    /// does not look like a flag, and boolean flags accept no value.
    ///
    /// # Errors
    /// Returns [`FlagError`] for unknown flags, stray non-flag tokens,
    /// missing required values, and inline values on boolean flags.
    pub fn partition(&self, tokens: &[String]) -> Result<Partitioned, FlagError> {
        let mut partitioned = Partitioned::default();
        let mut cursor = tokens.iter().peekable();

        while let Some(token) = cursor.next() {
            let (long, inline) = self.flag_name(token)?;

            let arity = match self.descriptor(&long) {
                Some(descriptor) => descriptor.arity,
                // Owned-only names (not scraped) behave as one-value flags
                // unless supplied bare.
                None if inline.is_some() => FlagArity::Required,
                None => FlagArity::None,
            };

            let value = match arity {
                FlagArity::None => {
                    if inline.is_some() {
                        return Err(FlagError::UnexpectedValue { flag: long });
                    }
                    None
                }
                FlagArity::Required => match inline {
                    Some(value) => Some(value),
                    None => Some(
                        cursor
                            .next()
                            .ok_or_else(|| FlagError::MissingValue { flag: long.clone() })?
                            .clone(),
                    ),
                },
                FlagArity::Optional => match inline {
                    Some(value) => Some(value),
                    None => cursor
                        .next_if(|next| !next.starts_with('-'))
                        .cloned(),
                },
            };

            let entry = FlagValue { long, value };
            match self.classify(&entry.long) {
                Ownership::Owned => partitioned.owned.push(entry),
                Ownership::Forward => partitioned.forwarded.push(entry),
            }
        }
        Ok(partitioned)
    }

    fn flag_name(&self, token: &str) -> Result<(String, Option<String>), FlagError> {
        if let Some(body) = token.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
                None => (body.to_owned(), None),
            };
            if !self.is_known(&name) {
                return Err(FlagError::UnknownFlag {
                    token: token.to_owned(),
                });
            }
            return Ok((name, inline));
        }
        if let Some(body) = token.strip_prefix('-') {
            let mut chars = body.chars();
            if let (Some(short), None) = (chars.next(), chars.next()) {
                if let Some(long) = self.short_to_long.get(&short) {
                    return Ok((long.clone(), None));
                }
                return Err(FlagError::UnknownFlag {
                    token: token.to_owned(),
                });
            }
        }
        Err(FlagError::UnexpectedToken {
            token: token.to_owned(),
        })
    }
}

/// Assembles directive tokens from computed and forwarded flag values.
///
/// Computed values come first and are always present; forwarded values
/// follow in supply order. A boolean flag emits `--name`, a valued flag
/// emits `--name=value` with the value quoted to survive embedded
/// whitespace and globs on the directive line. Supplying the same long
/// name twice keeps the last value at the first occurrence's position.
///
/// # Errors
/// Returns [`FlagError::UnquotableValue`] when a value cannot be
/// represented as a shell word (it contains a NUL byte).
///
/// # Examples
/// ```
/// use jarray_core::{FlagValue, assemble};
///
/// let computed = [FlagValue::with_value("array", "0-3,7")];
/// let forwarded = [
///     FlagValue::with_value("partition", "general"),
///     FlagValue::switch("hold"),
/// ];
/// let tokens = assemble(&computed, &forwarded)?;
/// assert_eq!(tokens, ["--array=0-3,7", "--partition=general", "--hold"]);
/// # Ok::<(), jarray_core::FlagError>(())
/// ```
pub fn assemble(computed: &[FlagValue], forwarded: &[FlagValue]) -> Result<Vec<String>, FlagError> {
    let mut merged: Vec<FlagValue> = Vec::new();
    for value in computed.iter().chain(forwarded) {
        match merged.iter_mut().find(|seen| seen.long == value.long) {
            Some(seen) => seen.value = value.value.clone(),
            None => merged.push(value.clone()),
        }
    }

    merged
        .iter()
        .map(|flag| match &flag.value {
            None => Ok(format!("--{}", flag.long)),
            Some(value) => {
                let quoted = shlex::try_quote(value).map_err(|_| FlagError::UnquotableValue {
                    flag: flag.long.clone(),
                })?;
                Ok(format!("--{}={quoted}", flag.long))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn descriptor(short: Option<char>, long: &str, arity: FlagArity) -> FlagDescriptor {
        FlagDescriptor {
            short,
            long: long.to_owned(),
            arity,
            placeholder: None,
        }
    }

    fn registry() -> FlagRegistry {
        let scraped = [
            descriptor(Some('a'), "array", FlagArity::Required),
            descriptor(Some('p'), "partition", FlagArity::Required),
            descriptor(None, "mem", FlagArity::Required),
            descriptor(Some('H'), "hold", FlagArity::None),
            descriptor(None, "nice", FlagArity::Optional),
            descriptor(Some('o'), "output", FlagArity::Required),
        ];
        FlagRegistry::new(&scraped, &["array", "output", "job-name", "submit"])
    }

    #[rstest]
    #[case::scheduler_only("partition", Ownership::Forward)]
    #[case::shadowed_by_program("array", Ownership::Owned)]
    #[case::shadowed_output("output", Ownership::Owned)]
    #[case::program_only("submit", Ownership::Owned)]
    #[case::unknown_everywhere("no-such-flag", Ownership::Owned)]
    fn classify_prefers_program_names(#[case] long: &str, #[case] expected: Ownership) {
        assert_eq!(registry().classify(long), expected);
    }

    #[test]
    fn classify_is_idempotent_under_reregistration() {
        let scraped = [
            descriptor(Some('p'), "partition", FlagArity::Required),
            descriptor(Some('p'), "partition", FlagArity::Required),
        ];
        let reg = FlagRegistry::new(&scraped, &["array"]);
        assert_eq!(reg.classify("partition"), Ownership::Forward);
        assert_eq!(reg.classify("array"), Ownership::Owned);
    }

    #[test]
    fn partition_splits_owned_from_forwarded() {
        let tokens: Vec<String> = ["--partition=general", "--array", "0-4", "--hold"]
            .iter()
            .map(|token| (*token).to_owned())
            .collect();
        let partitioned = registry().partition(&tokens).expect("tokens must partition");
        assert_eq!(
            partitioned.owned,
            [FlagValue::with_value("array", "0-4")]
        );
        assert_eq!(
            partitioned.forwarded,
            [
                FlagValue::with_value("partition", "general"),
                FlagValue::switch("hold"),
            ]
        );
    }

    #[test]
    fn partition_resolves_short_flags_through_descriptors() {
        let tokens: Vec<String> = ["-p", "short", "-H"]
            .iter()
            .map(|token| (*token).to_owned())
            .collect();
        let partitioned = registry().partition(&tokens).expect("tokens must partition");
        assert_eq!(
            partitioned.forwarded,
            [
                FlagValue::with_value("partition", "short"),
                FlagValue::switch("hold"),
            ]
        );
    }

    #[rstest]
    #[case::unknown_long(&["--no-such-flag"])]
    #[case::unknown_short(&["-z"])]
    #[case::stray_value(&["general"])]
    #[case::missing_value(&["--partition"])]
    #[case::value_on_boolean(&["--hold=yes"])]
    fn partition_rejects_malformed_input(#[case] raw: &[&str]) {
        let tokens: Vec<String> = raw.iter().map(|token| (*token).to_owned()).collect();
        let err = registry()
            .partition(&tokens)
            .expect_err("malformed input must fail");
        assert!(matches!(
            err,
            FlagError::UnknownFlag { .. }
                | FlagError::UnexpectedToken { .. }
                | FlagError::MissingValue { .. }
                | FlagError::UnexpectedValue { .. }
        ));
    }

    #[test]
    fn optional_arity_consumes_only_non_flag_followers() {
        let tokens: Vec<String> = ["--nice", "--hold"]
            .iter()
            .map(|token| (*token).to_owned())
            .collect();
        let partitioned = registry().partition(&tokens).expect("tokens must partition");
        assert_eq!(
            partitioned.forwarded,
            [FlagValue::switch("nice"), FlagValue::switch("hold")]
        );

        let tokens: Vec<String> = ["--nice", "100"]
            .iter()
            .map(|token| (*token).to_owned())
            .collect();
        let partitioned = registry().partition(&tokens).expect("tokens must partition");
        assert_eq!(
            partitioned.forwarded,
            [FlagValue::with_value("nice", "100")]
        );
    }

    #[test]
    fn assemble_quotes_values_with_whitespace_and_globs() {
        let tokens = assemble(
            &[FlagValue::with_value("job-name", "sweep run 3")],
            &[FlagValue::with_value("mem", "4G"), FlagValue::switch("hold")],
        )
        .expect("assembly must succeed");
        assert_eq!(tokens, ["--job-name=\"sweep run 3\"", "--mem=4G", "--hold"]);
    }

    #[test]
    fn assemble_last_value_wins_for_duplicates() {
        let tokens = assemble(
            &[],
            &[
                FlagValue::with_value("mem", "2G"),
                FlagValue::with_value("partition", "short"),
                FlagValue::with_value("mem", "8G"),
            ],
        )
        .expect("assembly must succeed");
        assert_eq!(tokens, ["--mem=8G", "--partition=short"]);
    }

    #[test]
    fn assemble_rejects_nul_bytes() {
        let err = assemble(&[FlagValue::with_value("comment", "a\0b")], &[])
            .expect_err("NUL must be unquotable");
        assert!(matches!(err, FlagError::UnquotableValue { .. }));
    }
}
