//! Key construction.
//!
//! Keys on the wire are `"<prefix><logical key>"`. No collision detection is
//! performed: callers own the prefix namespace (`session:`, `cache:`, or none)
//! and must keep subsystems from overlapping.

/// Prefix for session records.
pub const SESSION_PREFIX: &str = "session:";

/// Build the fully-qualified key for `key` under an optional `prefix`.
pub fn build_key(key: &str, prefix: Option<&str>) -> String {
    let prefix = prefix.unwrap_or("");
    let mut full = String::with_capacity(prefix.len() + key.len());
    full.push_str(prefix);
    full.push_str(key);
    full
}

/// Escape glob metacharacters in `raw` so it matches itself literally inside
/// a `SCAN MATCH` / `KEYS` pattern.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key() {
        assert_eq!(build_key("abc", None), "abc");
        assert_eq!(build_key("abc", Some("session:")), "session:abc");
        assert_eq!(build_key("user:42:*", Some("")), "user:42:*");
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("42"), "42");
        assert_eq!(escape_glob("*"), r"\*");
        assert_eq!(escape_glob(r"a?[b]\c"), r"a\?\[b\]\\c");
    }

    #[test]
    fn test_prefixes_can_collide() {
        // "a:" + "b" and "" + "a:b" name the same entry.
        assert_eq!(build_key("b", Some("a:")), build_key("a:b", None));
    }
}
