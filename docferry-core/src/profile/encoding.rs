//! Percent-encoding for URI userinfo and query components.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything except the RFC 3986 unreserved characters `A-Z a-z 0-9 . ~ _ -`.
pub const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'~')
    .remove(b'_')
    .remove(b'-');

/// Query values additionally keep `$` so `authSource=$external` stays readable.
const QUERY_VALUE: &AsciiSet = &USERINFO.remove(b'$');

/// Percent-encodes a userinfo component (username or password).
///
/// Every byte outside the unreserved allowlist becomes `%XX` with uppercase
/// hex digits, so multi-byte UTF-8 characters are encoded byte by byte.
///
/// # Example
/// ```rust
/// use docferry_core::profile::percent_encode_component;
///
/// assert_eq!(percent_encode_component("p@ss:1#"), "p%40ss%3A1%23");
/// ```
pub fn percent_encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, USERINFO).to_string()
}

/// Reverses [`percent_encode_component`].
///
/// Returns `None` when the decoded bytes are not valid UTF-8.
pub fn percent_decode_component(encoded: &str) -> Option<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

pub(crate) fn encode_query_value(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_VALUE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_reserved_characters() {
        assert_eq!(percent_encode_component("@"), "%40");
        assert_eq!(percent_encode_component(":"), "%3A");
        assert_eq!(percent_encode_component("/"), "%2F");
        assert_eq!(percent_encode_component("#"), "%23");
        assert_eq!(percent_encode_component("%"), "%25");
        assert_eq!(percent_encode_component(" "), "%20");
    }

    #[test]
    fn test_unreserved_characters_pass_through() {
        let unreserved = "AZaz09.~_-";
        assert_eq!(percent_encode_component(unreserved), unreserved);
    }

    #[test]
    fn test_encode_known_password() {
        assert_eq!(percent_encode_component("p@ss:1#"), "p%40ss%3A1%23");
    }

    #[test]
    fn test_encode_multibyte() {
        assert_eq!(percent_encode_component("é"), "%C3%A9");
    }

    #[test]
    fn test_round_trip() {
        let password = "we/ird pa%ss@word:#1";
        let encoded = percent_encode_component(password);
        assert!(!encoded.contains('@'));
        assert!(!encoded.contains(' '));
        assert_eq!(percent_decode_component(&encoded).as_deref(), Some(password));
    }

    #[test]
    fn test_query_value_keeps_dollar() {
        assert_eq!(encode_query_value("$external"), "$external");
        assert_eq!(encode_query_value("a&b=c"), "a%26b%3Dc");
    }
}
