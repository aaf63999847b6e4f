//! Path Segment Sanitizer (spec.md §4.2).

use crate::error::ValidationError;

/// Maps an untrusted identifier to a filesystem-safe segment.
///
/// Rejects empty, `.`, `..`. If `value` already matches `[A-Za-z0-9._-]+`,
/// returns it unchanged. Otherwise every non-conforming character is
/// replaced by `_`; if the result is empty or collapses to `.`/`..`, fails
/// with `Invalid <label>`.
pub fn sanitize(value: &str, label: &'static str) -> Result<String, ValidationError> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(ValidationError::InvalidSegment(label));
    }

    if is_already_safe(value) {
        return Ok(value.to_string());
    }

    let rewritten: String = value
        .chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect();

    if rewritten.is_empty() || rewritten == "." || rewritten == ".." {
        return Err(ValidationError::InvalidSegment(label));
    }

    Ok(rewritten)
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

fn is_already_safe(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_safe_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_already_safe_values() {
        assert_eq!(sanitize("com.example.app", "bundleID").unwrap(), "com.example.app");
        assert_eq!(sanitize("1.2.3", "version").unwrap(), "1.2.3");
    }

    #[test]
    fn rejects_empty_dot_dotdot() {
        assert_eq!(
            sanitize("", "accountHash"),
            Err(ValidationError::InvalidSegment("accountHash"))
        );
        assert_eq!(
            sanitize(".", "accountHash"),
            Err(ValidationError::InvalidSegment("accountHash"))
        );
        assert_eq!(
            sanitize("..", "accountHash"),
            Err(ValidationError::InvalidSegment("accountHash"))
        );
    }

    #[test]
    fn rewrites_unsafe_characters() {
        assert_eq!(sanitize("a/b c", "accountHash").unwrap(), "a_b_c");
        assert_eq!(sanitize("../../etc", "accountHash").unwrap(), "____etc");
    }

    #[test]
    fn rewrite_of_all_unsafe_chars_still_succeeds_when_not_dot_or_dotdot() {
        assert_eq!(sanitize("//", "accountHash").unwrap(), "__");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize("weird name!@#", "bundleID").unwrap();
        let twice = sanitize(&once, "bundleID").unwrap();
        assert_eq!(once, twice);
    }
}
