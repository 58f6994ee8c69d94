use std::sync::LazyLock;

use regex::Regex;

/// Alphanumeric runs joined by single `_` or `-`.
static USERNAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+(?:[_-][A-Za-z0-9]+)*$").ok());

/// Local part (dot-atoms or a quoted string) `@` a dotted domain with a
/// 2+ letter TLD, or an IPv4 literal in brackets.
static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(?:[^<>()\[\]\\.,;:\s@"]+(?:\.[^<>()\[\]\\.,;:\s@"]+)*)|(?:".+"))@(?:(?:\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(?:(?:[a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .ok()
});

pub fn is_valid_username(username: &str) -> bool {
    USERNAME.as_ref().is_some_and(|re| re.is_match(username))
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(email))
}
