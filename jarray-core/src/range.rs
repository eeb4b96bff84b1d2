//! Array-index range codec.
//!
//! Converts between sparse sets of task indices and the compact
//! comma/dash notation understood by the scheduler: `collapse` builds the
//! specification sent with a submission, `expand` decodes the bracketed
//! form the accounting tool reports back (including its `%N` throttle
//! suffix, which bounds concurrency and carries no index information).

use thiserror::Error;

use crate::error::define_error_codes;

/// Errors raised while decoding a scheduler range specification.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RangeError {
    /// The specification opened a bracket that never closes.
    #[error("range specification `{spec}` opens `[` but never closes it")]
    UnterminatedBracket {
        /// The offending specification as received.
        spec: String,
    },
    /// A token inside the specification was not an index or `low-high` pair.
    #[error("range specification `{spec}` contains malformed token `{token}`")]
    MalformedToken {
        /// The token that failed to parse.
        token: String,
        /// The specification the token was found in.
        spec: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`RangeError`] variants.
    enum RangeErrorCode for RangeError {
        /// The specification opened a bracket that never closes.
        UnterminatedBracket => UnterminatedBracket { .. } => "RANGE_UNTERMINATED_BRACKET",
        /// A token was neither an index nor a `low-high` pair.
        MalformedToken => MalformedToken { .. } => "RANGE_MALFORMED_TOKEN",
    }
}

/// Collapses sorted task indices into the compact range notation.
///
/// Maximal contiguous runs become `low-high` tokens, isolated indices stay
/// singletons, and tokens are joined with commas. The caller must supply
/// the indices sorted ascending and deduplicated; this is a contract, not
/// a recoverable condition.
///
/// # Examples
/// ```
/// use jarray_core::collapse;
///
/// assert_eq!(collapse(&[1, 2, 3, 5]), "1-3,5");
/// assert_eq!(collapse(&[4]), "4");
/// assert_eq!(collapse(&[]), "");
/// ```
#[must_use]
pub fn collapse(indices: &[usize]) -> String {
    debug_assert!(
        indices.windows(2).all(|pair| match pair {
            [a, b] => a < b,
            _ => true,
        }),
        "collapse requires sorted, deduplicated indices"
    );

    let mut tokens = Vec::new();
    let mut runs = indices.iter().copied().peekable();
    while let Some(low) = runs.next() {
        let mut high = low;
        while runs.peek() == Some(&(high + 1)) {
            runs.next();
            high += 1;
        }
        if low == high {
            tokens.push(low.to_string());
        } else {
            tokens.push(format!("{low}-{high}"));
        }
    }
    tokens.join(",")
}

/// Expands a scheduler-reported range specification into task indices.
///
/// Accepts either a bare index (`"7"`) or the bracketed form
/// (`"[1-3,5]"`). A `%N` throttle suffix after the last token inside the
/// brackets is recognised and excluded from expansion. Indices come back
/// ascending with duplicates preserved as given; deduplication is the
/// caller's concern when merging into an existing set.
///
/// # Errors
/// Returns [`RangeError::UnterminatedBracket`] when the specification
/// opens `[` without closing it, and [`RangeError::MalformedToken`] for
/// tokens that are neither an index nor a `low-high` pair.
///
/// # Examples
/// ```
/// use jarray_core::expand;
///
/// assert_eq!(expand("[1-3,5]")?, vec![1, 2, 3, 5]);
/// assert_eq!(expand("[1-3,5%2]")?, vec![1, 2, 3, 5]);
/// assert_eq!(expand("7")?, vec![7]);
/// assert_eq!(expand("")?, Vec::<usize>::new());
/// assert!(expand("[4-6").is_err());
/// # Ok::<(), jarray_core::RangeError>(())
/// ```
pub fn expand(spec: &str) -> Result<Vec<usize>, RangeError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let region = match trimmed.strip_prefix('[') {
        Some(rest) => {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| RangeError::UnterminatedBracket {
                    spec: spec.to_owned(),
                })?;
            // The throttle suffix starts at the % after the last range token.
            match inner.rsplit_once('%') {
                Some((ranges, _throttle)) => ranges,
                None => inner,
            }
        }
        None => trimmed,
    };

    let mut indices = Vec::new();
    for token in region.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((low, high)) => {
                let low = parse_index(low, token, spec)?;
                let high = parse_index(high, token, spec)?;
                if low > high {
                    return Err(malformed(token, spec));
                }
                indices.extend(low..=high);
            }
            None => indices.push(parse_index(token, token, spec)?),
        }
    }
    Ok(indices)
}

fn parse_index(raw: &str, token: &str, spec: &str) -> Result<usize, RangeError> {
    raw.trim().parse().map_err(|_| malformed(token, spec))
}

fn malformed(token: &str, spec: &str) -> RangeError {
    RangeError::MalformedToken {
        token: token.to_owned(),
        spec: spec.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::{collection::btree_set, prelude::*};
    use rstest::rstest;

    #[rstest]
    #[case::empty(&[], "")]
    #[case::single(&[3], "3")]
    #[case::adjacent_pair(&[3, 4], "3-4")]
    #[case::run_with_gap(&[0, 1, 2, 4], "0-2,4")]
    #[case::gap_of_one(&[1, 3], "1,3")]
    #[case::mixed(&[0, 2, 3, 4, 9], "0,2-4,9")]
    fn collapse_produces_maximal_runs(#[case] indices: &[usize], #[case] expected: &str) {
        assert_eq!(collapse(indices), expected);
    }

    #[rstest]
    #[case::empty("", &[])]
    #[case::bare_index("7", &[7])]
    #[case::single_in_brackets("[7]", &[7])]
    #[case::pair("[3-4]", &[3, 4])]
    #[case::mixed("[1-3,5]", &[1, 2, 3, 5])]
    #[case::throttle_after_range("[1-3,5%2]", &[1, 2, 3, 5])]
    #[case::throttle_after_singleton("[9%4]", &[9])]
    #[case::duplicates_preserved("[2,2,3]", &[2, 2, 3])]
    fn expand_decodes_scheduler_syntax(#[case] spec: &str, #[case] expected: &[usize]) {
        let indices = expand(spec).expect("specification must expand");
        assert_eq!(indices, expected);
    }

    #[rstest]
    #[case::unterminated("[4-6")]
    fn expand_reports_unterminated_bracket(#[case] spec: &str) {
        let err = expand(spec).expect_err("unterminated bracket must fail");
        assert!(matches!(err, RangeError::UnterminatedBracket { .. }));
    }

    #[rstest]
    #[case::alpha_token("[1,x]", "x")]
    #[case::reversed_pair("[5-2]", "5-2")]
    #[case::stray_throttle("7%2", "7%2")]
    fn expand_reports_malformed_tokens(#[case] spec: &str, #[case] offending: &str) {
        let err = expand(spec).expect_err("malformed token must fail");
        match err {
            RangeError::MalformedToken { token, .. } => assert_eq!(token, offending),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn collapse_then_expand_round_trips(set in btree_set(0_usize..2_000, 0..64)) {
            let indices: Vec<usize> = set.into_iter().collect();
            let spec = collapse(&indices);
            let bracketed = format!("[{spec}]");
            let expanded = expand(&bracketed).expect("collapsed spec must expand");
            prop_assert_eq!(expanded, indices);
        }

        #[test]
        fn adjacent_tokens_never_merge(set in btree_set(0_usize..500, 1..32)) {
            let indices: Vec<usize> = set.into_iter().collect();
            let spec = collapse(&indices);
            let bounds: Vec<(usize, usize)> = spec
                .split(',')
                .map(|token| match token.split_once('-') {
                    Some((low, high)) => (
                        low.parse().expect("low bound must parse"),
                        high.parse().expect("high bound must parse"),
                    ),
                    None => {
                        let single = token.parse().expect("singleton must parse");
                        (single, single)
                    }
                })
                .collect();
            for pair in bounds.windows(2) {
                if let [(_, high), (low, _)] = pair {
                    prop_assert!(*low > *high + 1, "tokens {high} and {low} could merge");
                }
            }
        }
    }
}
