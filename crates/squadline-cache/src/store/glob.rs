//! Redis-style glob patterns (`KEYS` / `SCAN MATCH`) compiled to `regex`.

use regex::Regex;

use crate::error::{StoreError, StoreResult};

/// Compile a Redis glob pattern into an anchored regular expression.
///
/// Supported syntax: `*`, `?`, `[abc]`, `[^abc]` / `[!abc]`, `[a-z]`, and `\x`
/// to match `x` literally.
pub(crate) fn compile(pattern: &str) -> StoreResult<Regex> {
    let mut out = String::with_capacity(pattern.len() * 2 + 6);
    // Glob wildcards match any character, newlines included.
    out.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => out.push_str(r"\\"),
            },
            '[' => {
                let mut class = String::from("[");
                if matches!(chars.peek(), Some('^') | Some('!')) {
                    chars.next();
                    class.push('^');
                }
                let mut closed = false;
                while let Some(cc) = chars.next() {
                    match cc {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                class.push_str(&regex::escape(&escaped.to_string()));
                            }
                        }
                        '-' => class.push('-'),
                        other => class.push_str(&regex::escape(&other.to_string())),
                    }
                }
                if !closed {
                    return Err(StoreError::Command(format!(
                        "unterminated character class in pattern {pattern:?}"
                    )));
                }
                class.push(']');
                out.push_str(&class);
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).map_err(|e| StoreError::Command(format!("invalid pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, key: &str) -> bool {
        compile(pattern).unwrap().is_match(key)
    }

    #[test]
    fn test_star_and_question() {
        assert!(matches("user:42:*", "user:42:a"));
        assert!(matches("user:42:*", "user:42:"));
        assert!(!matches("user:42:*", "user:421:a"));
        assert!(!matches("user:42:*", "user:7:a"));
        assert!(matches("h?llo", "hello"));
        assert!(!matches("h?llo", "heello"));
    }

    #[test]
    fn test_wildcards_match_newlines() {
        assert!(matches("user:*", "user:a\nb"));
        assert!(matches("line?break", "line\nbreak"));
        assert!(!matches("user:?", "user:\n\n"));
    }

    #[test]
    fn test_classes() {
        assert!(matches("h[ae]llo", "hallo"));
        assert!(!matches("h[ae]llo", "hillo"));
        assert!(matches("h[^e]llo", "hallo"));
        assert!(!matches("h[!e]llo", "hello"));
        assert!(matches("stats:[a-c]", "stats:b"));
        assert!(!matches("stats:[a-c]", "stats:d"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("profile.1", "profile.1"));
        assert!(!matches("profile.1", "profileX1"));
        assert!(matches(r"lit\*", "lit*"));
        assert!(!matches(r"lit\*", "literal"));
    }

    #[test]
    fn test_unterminated_class_is_rejected() {
        assert!(compile("user:[abc").is_err());
    }
}
