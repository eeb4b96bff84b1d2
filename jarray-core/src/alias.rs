//! Left-anchored alias resolution for command and state names.

/// Resolves a user token against a set of canonical choices.
///
/// Returns the canonical choice when the token is a left-anchored prefix
/// of exactly one of them, and the token unchanged otherwise — ambiguous
/// or unknown tokens pass through so the caller's own validation can
/// report them.
///
/// # Examples
/// ```
/// use jarray_core::resolve_alias;
///
/// let commands = ["batch", "run", "status"];
/// assert_eq!(resolve_alias(&commands, "st"), "status");
/// assert_eq!(resolve_alias(&commands, "b"), "batch");
/// // Unknown tokens pass through for the caller to reject.
/// assert_eq!(resolve_alias(&commands, "list"), "list");
/// ```
#[must_use]
pub fn resolve_alias<'a>(choices: &[&'a str], token: &'a str) -> &'a str {
    let mut matches = choices.iter().filter(|choice| choice.starts_with(token));
    match (matches.next(), matches.next()) {
        (Some(unique), None) => unique,
        _ => token,
    }
}
