//! `key=value&key=value` payloads carrying template variable overrides.

use anyhow::{Result, bail};
use regex::Regex;
use std::sync::LazyLock;
use url::form_urlencoded;

use super::VariableMap;

static QUERY_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_*]+=[^&]*(?:&[A-Za-z0-9_*]+=[^&]*)*$").expect("query string pattern")
});

pub fn is_query_string(payload: &str) -> bool {
    QUERY_STRING.is_match(payload)
}

/// Parses `payload` into one entry per key; the last occurrence of a key wins.
pub fn parse_query_string(payload: &str) -> Result<VariableMap> {
    if !is_query_string(payload) {
        bail!("Invalid query string format: expected key=value pairs joined by '&'");
    }

    let mut vars = VariableMap::new();
    for (key, value) in form_urlencoded::parse(payload.as_bytes()) {
        vars.insert(key.into_owned(), value.into_owned());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::{is_query_string, parse_query_string};

    #[test]
    fn recognises_key_value_pairs() {
        for payload in ["a=1", "content=hello&extra=world", "x_1=&y*=2", "k=v with spaces"] {
            assert!(is_query_string(payload), "should match: {payload:?}");
        }
    }

    #[test]
    fn rejects_free_text() {
        for payload in [
            "",
            "hello world",
            "=value",
            "a=1&",
            "a=1&&b=2",
            "bad-key=1",
            "what is 2+2? a=b",
        ] {
            assert!(!is_query_string(payload), "should not match: {payload:?}");
            assert!(parse_query_string(payload).is_err(), "should fail: {payload:?}");
        }
    }

    #[test]
    fn parses_one_entry_per_key() {
        let vars = parse_query_string("content=hello&extra=world").expect("should parse");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["content"], "hello");
        assert_eq!(vars["extra"], "world");
    }

    #[test]
    fn last_duplicate_wins() {
        let vars = parse_query_string("a=1&b=2&a=3").expect("should parse");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["a"], "3");
    }

    #[test]
    fn values_are_percent_decoded() {
        let vars = parse_query_string("q=rust%20lang+news&empty=").expect("should parse");
        assert_eq!(vars["q"], "rust lang news");
        assert_eq!(vars["empty"], "");
    }
}
