//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::sync::OnceLock;

/// Bytes searched for a `<meta>` charset declaration
const META_SNIFF_LEN: usize = 1024;

/// Decode a response body.
///
/// The encoding comes from a byte-order mark, then the content-type
/// `charset`, then a `<meta>` declaration in the first kilobyte. Unknown or
/// missing labels fall back to UTF-8. Malformed sequences are replaced
/// rather than rejected.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .or_else(|| meta_charset(bytes).and_then(|label| Encoding::for_label(label.as_bytes())))
        .unwrap_or(UTF_8);

    let (cow, _encoding, _had_errors) = encoding.decode(bytes);
    cow.into_owned()
}

/// Charset declared by `<meta charset>` or `<meta http-equiv>` near the top
/// of an HTML document
pub fn meta_charset(bytes: &[u8]) -> Option<String> {
    static META_CHARSET: OnceLock<Regex> = OnceLock::new();

    let re = META_CHARSET.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
            .expect("Invalid regex pattern")
    });

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(META_SNIFF_LEN)]);
    re.captures(&head).map(|caps| caps[1].to_string())
}

/// Extract the `charset=` parameter from a content-type header value
pub fn charset_label(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

/// Media type of a content-type header value, lowercased, without parameters
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Sanitize filename by removing invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    static INVALID_CHARS: OnceLock<Regex> = OnceLock::new();

    let re = INVALID_CHARS
        .get_or_init(|| Regex::new(r#"[<>:"/\\|?*\s]"#).expect("Invalid regex pattern"));

    re.replace_all(filename, "_").to_string()
}
