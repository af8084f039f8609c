use std::sync::LazyLock;
use regex::Regex;
use crate::core::error::{Error, Result};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]{0,229}$").expect("static name pattern")
});

/// Index and field names: lowercase, start with a letter, at most 230 bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::schema(format!(
            "invalid name '{}': must match [a-z][a-z0-9_-]{{0,229}}",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_names() {
        assert!(validate_name("user").is_ok());
        assert!(validate_name("stats_2024-q1").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        let long = "a".repeat(231);
        for name in ["", "User", "_id", "1abc", "has space", long.as_str()] {
            assert!(validate_name(name).is_err(), "{} should be rejected", name);
        }
    }
}
