//! Shared error and text plumbing used across the pipeline.

use std::borrow::Cow;

/// A transform error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input that cannot be recovered locally.
    #[error("client error: {0}")]
    Client(String),

    /// Pipeline misconfiguration or assertion violation. Never recovered;
    /// aborts the document.
    #[error("internal error: {0}")]
    Internal(String),

    /// A template range that has no legitimate wrap target.
    #[error("cannot encapsulate transclusion {about}")]
    Encapsulation {
        /// The about-id of the offending range.
        about: String,
    },

    /// An uncaught error inside a post-process pass. Post-processing stops
    /// and the partial DOM is not emitted.
    #[error("{pass} pass failed: {source}")]
    Pass {
        /// The pass shortcut name.
        pass: &'static str,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// A write to a buffer failed.
    #[error("fmt error: {0}")]
    Fmt(#[from] core::fmt::Error),

    /// A serialization of side data failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// The standard result type used by all fallible pipeline functions.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Decodes HTML entities.
#[inline]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(text)
}

/// Collapses whitespace runs to single spaces and trims the ends. Used when
/// normalizing extension tag options.
pub fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            in_ws = true;
        } else {
            if in_ws && !out.is_empty() {
                out.push(' ');
            }
            in_ws = false;
            out.push(c);
        }
    }
    out
}

/// Encodes section heading text into a fragment id.
///
/// The modern form keeps Unicode as-is: entities are decoded, the ends are
/// trimmed, and spaces become underscores.
pub fn anchor_encode(text: &str) -> String {
    let decoded = decode_entities(text.trim());
    let mut out = String::with_capacity(decoded.len());
    let mut in_ws = false;
    for c in decoded.chars() {
        if c.is_whitespace() {
            in_ws = true;
        } else {
            if in_ws && !out.is_empty() {
                out.push('_');
            }
            in_ws = false;
            out.push(c);
        }
    }
    out
}

/// Encodes heading text into the legacy dot-escaped fragment id used by old
/// clients: UTF-8 percent encoding with `.` in place of `%`.
pub fn legacy_anchor_encode(text: &str) -> String {
    let modern = anchor_encode(text);
    let mut out = String::with_capacity(modern.len());
    for byte in modern.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.' | b':' | b'-' => {
                out.push(byte as char);
            }
            _ => {
                use core::fmt::Write as _;
                let _ = write!(out, ".{byte:02X}");
            }
        }
    }
    out
}

/// The alphabet of characters to percent-encode when building hrefs.
pub const HREF_ALPHABET: percent_encoding::AsciiSet = percent_encoding::CONTROLS
    .add(b'%')
    .add(b'#')
    .add(b'\'')
    .add(b'"')
    .add(b'&')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b' ')
    .add(b'?');

/// Percent-encodes a URL part.
#[inline]
pub fn url_encode(input: &str) -> percent_encoding::PercentEncode<'_> {
    percent_encoding::utf8_percent_encode(input, &HREF_ALPHABET)
}

/// True when a string looks like an absolute URL. Used to exempt attribute
/// values from language-variant conversion.
pub fn looks_like_url(text: &str) -> bool {
    text.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    }) || text.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_encoding() {
        assert_eq!(anchor_encode("Test 1 2 3"), "Test_1_2_3");
        assert_eq!(anchor_encode("  padded  out  "), "padded_out");
        assert_eq!(anchor_encode("R&eacute;f"), "Réf", "entities should decode");
    }

    #[test]
    fn legacy_anchor_encoding() {
        assert_eq!(legacy_anchor_encode("Test 1 2 3"), "Test_1_2_3");
        assert_eq!(legacy_anchor_encode("Références"), "R.C3.A9f.C3.A9rences");
    }

    #[test]
    fn url_detection() {
        assert!(looks_like_url("https://example.org/x"));
        assert!(looks_like_url("//example.org/x"));
        assert!(!looks_like_url("Just a title"));
        assert!(!looks_like_url("a: b"));
    }

    #[test]
    fn ws_collapse() {
        assert_eq!(collapse_ws("  a \n b\t\tc "), "a b c");
    }
}
