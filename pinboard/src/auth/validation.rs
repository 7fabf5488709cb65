//! Input syntax checks shared by the identity operations.

use once_cell::sync::Lazy;
use regex::Regex;

/// Local part (dotted atoms or a quoted string), `@`, then a bracketed IPv4 literal or
/// dot-separated labels ending in a top-level label of at least two letters.
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email pattern is a valid regex")
});

/// Whether `email` is syntactically an email address. Matching is case-insensitive.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(&email.to_lowercase())
}

/// Length in characters, not bytes
pub fn char_len(input: &str) -> usize {
    input.chars().count()
}
