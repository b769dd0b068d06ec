//! Content negotiation: deciding what to capture and how to decode it.
//!
//! These are pure functions over declared header values. They never fail:
//! absent or malformed values fall back to safe defaults (capture declined,
//! Latin-1 decoding, configured default length) so that a hostile or broken
//! client header can never disrupt the host request path.

use tracing::debug;

/// Decide whether a payload with the given `Content-Type` value is eligible
/// for capture.
///
/// Matching is a case-insensitive substring check against the configured
/// eligible-type list. Structured/diagnostic payload kinds (JSON-like,
/// form-encoded, query-language bodies) are in the default list; plain text
/// is excluded by policy.
pub fn should_capture(content_type: &str, eligible: &[String]) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    eligible
        .iter()
        .any(|kind| lowered.contains(&kind.to_ascii_lowercase()))
}

/// Extract a non-empty `charset=` parameter from a header value.
///
/// Returns `None` when the parameter is absent or empty. The value is
/// trimmed of whitespace and surrounding quotes.
pub fn parse_charset(header_value: &str) -> Option<String> {
    let lowered = header_value.to_ascii_lowercase();
    let start = lowered.find("charset=")? + "charset=".len();
    let rest = &header_value[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    let value = rest[..end].trim().trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a declared `Content-Length` value, falling back to `default` when
/// the value is absent or unparsable.
pub fn parse_content_length(header_value: Option<&str>, default: usize) -> usize {
    header_value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

/// A concrete decoder for captured payload bytes.
///
/// The variants cover the charsets the interception layer commits to
/// decoding itself. Anything else resolves to [`Charset::Latin1`], which can
/// render any byte sequence without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// UTF-8; invalid sequences are replaced, never rejected.
    Utf8,
    /// ISO-8859-1. Every byte maps to a char, so decoding cannot fail.
    /// This is the fallback for absent or unrecognized charset names.
    #[default]
    Latin1,
    /// US-ASCII; bytes above 0x7F are replaced.
    UsAscii,
}

impl Charset {
    /// Map a parsed/declared charset name to a concrete decoder.
    ///
    /// Falls back to [`Charset::Latin1`] when the name is absent, empty, or
    /// not recognized. Never errors.
    pub fn resolve(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Charset::Latin1;
        };
        let name = name.trim();
        if name.is_empty() {
            return Charset::Latin1;
        }
        match name.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Charset::Utf8,
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Charset::Latin1,
            "us-ascii" | "ascii" => Charset::UsAscii,
            other => {
                debug!(charset = other, "unrecognized charset, using Latin-1");
                Charset::Latin1
            }
        }
    }

    /// Render bytes as a string with this decoder. Lossy, never errors.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_types() -> Vec<String> {
        crate::config::CaptureConfig::default().capture_content_types
    }

    #[test]
    fn test_should_capture_structured_types() {
        let eligible = default_types();
        assert!(should_capture("application/json", &eligible));
        assert!(should_capture("application/graphql", &eligible));
        assert!(should_capture("application/x-www-form-urlencoded", &eligible));
    }

    #[test]
    fn test_should_capture_case_insensitive() {
        let eligible = default_types();
        assert!(should_capture("Application/JSON; charset=UTF-8", &eligible));
        assert!(should_capture("APPLICATION/GRAPHQL", &eligible));
    }

    #[test]
    fn test_should_not_capture_plain_text() {
        let eligible = default_types();
        assert!(!should_capture("text/plain", &eligible));
        assert!(!should_capture("text/html", &eligible));
        assert!(!should_capture("application/octet-stream", &eligible));
    }

    #[test]
    fn test_parse_charset_present() {
        assert_eq!(
            parse_charset("Content-Type: application/json; charset=utf-8"),
            Some("utf-8".to_string())
        );
        assert_eq!(
            parse_charset("application/json; charset=UTF-8; boundary=x"),
            Some("UTF-8".to_string())
        );
        assert_eq!(
            parse_charset("text/html; charset=\"iso-8859-1\""),
            Some("iso-8859-1".to_string())
        );
    }

    #[test]
    fn test_parse_charset_absent_or_empty() {
        assert_eq!(parse_charset("application/json"), None);
        assert_eq!(parse_charset("application/json; charset="), None);
        assert_eq!(parse_charset("application/json; charset=; boundary=x"), None);
        assert_eq!(parse_charset(""), None);
    }

    #[test]
    fn test_resolve_charset_fallback() {
        assert_eq!(Charset::resolve(None), Charset::Latin1);
        assert_eq!(Charset::resolve(Some("")), Charset::Latin1);
        assert_eq!(Charset::resolve(Some("  ")), Charset::Latin1);
        assert_eq!(Charset::resolve(Some("klingon-8")), Charset::Latin1);
    }

    #[test]
    fn test_resolve_charset_known_names() {
        assert_eq!(Charset::resolve(Some("utf-8")), Charset::Utf8);
        assert_eq!(Charset::resolve(Some("UTF-8")), Charset::Utf8);
        assert_eq!(Charset::resolve(Some("ISO-8859-1")), Charset::Latin1);
        assert_eq!(Charset::resolve(Some("us-ascii")), Charset::UsAscii);
    }

    #[test]
    fn test_decode_never_fails() {
        // Invalid UTF-8 decodes lossily
        let bytes = [0x66, 0x6F, 0xFF, 0x6F];
        assert_eq!(Charset::Utf8.decode(&bytes), "fo\u{FFFD}o");
        // Latin-1 renders every byte
        assert_eq!(Charset::Latin1.decode(&bytes), "fo\u{00FF}o");
        // ASCII replaces high bytes
        assert_eq!(Charset::UsAscii.decode(&bytes), "fo\u{FFFD}o");
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length(Some("512"), 4096), 512);
        assert_eq!(parse_content_length(Some(" 512 "), 4096), 512);
        assert_eq!(parse_content_length(Some("garbage"), 4096), 4096);
        assert_eq!(parse_content_length(Some("-5"), 4096), 4096);
        assert_eq!(parse_content_length(None, 4096), 4096);
    }
}
