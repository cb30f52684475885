//! Character reference and percent-encoding normalization.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// How far past `&#x` a malformed reference may reach for its `;`.
const MALFORMED_REFERENCE_SCAN: usize = 16;

lazy_static! {
    static ref SUSPICIOUS_PERCENT: Regex = Regex::new(r"(?i)%(3c|3e|22)").unwrap();
}

/// Rewrite hexadecimal character references as decimal ones.
///
/// `&#x3c;` becomes `&#60;` (the `;` may be missing). A reference that does
/// not name a usable character is turned into inert text, `&#x;` becomes
/// `&amp;#x&#59;`, so that later decoding cannot revive it.
pub fn decode_hex_entities(text: &str) -> Cow<'_, str> {
    if !text.contains("&#x") && !text.contains("&#X") {
        return Cow::Borrowed(text);
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut i = 0;

    while i + 3 <= bytes.len() {
        if !(bytes[i] == b'&' && bytes[i + 1] == b'#' && (bytes[i + 2] | 0x20) == b'x') {
            i += 1;
            continue;
        }
        out.push_str(&text[last..i]);

        let digits_start = i + 3;
        let mut j = digits_start;
        while j < bytes.len() && bytes[j].is_ascii_hexdigit() {
            j += 1;
        }

        match code_point(&text[digits_start..j]) {
            Some(value) => {
                out.push_str("&#");
                out.push_str(&value.to_string());
                out.push(';');
                if j < bytes.len() && bytes[j] == b';' {
                    j += 1;
                }
                i = j;
            }
            None => {
                out.push_str("&amp;#");
                out.push_str(&text[i + 2..digits_start]);
                match malformed_terminator(bytes, digits_start) {
                    Some(semicolon) => {
                        out.push_str(&text[digits_start..semicolon]);
                        out.push_str("&#59;");
                        i = semicolon + 1;
                    }
                    None => i = digits_start,
                }
            }
        }
        last = i;
    }

    out.push_str(&text[last..]);
    Cow::Owned(out)
}

fn code_point(digits: &str) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    // char::from_u32 rejects surrogates and values above U+10FFFF.
    match char::from_u32(value) {
        Some(c) if c != '\0' => Some(value),
        _ => None,
    }
}

/// Position of the `;` closing a malformed reference, if it is close by.
fn malformed_terminator(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .iter()
        .enumerate()
        .skip(from)
        .take(MALFORMED_REFERENCE_SCAN)
        .take_while(|(_, b)| !b.is_ascii_whitespace() && **b != b'<' && **b != b'&')
        .find(|(_, b)| **b == b';')
        .map(|(idx, _)| idx)
}

/// Undo the percent-encoding tricks used to hide markup from the script pass.
///
/// Doubled encodings (`%253c`) are collapsed first, then `%3c`, `%3e` and
/// `%22` become `<`, `>` and `"`.
pub fn url_decode_suspicious_sequences(text: &str) -> Cow<'_, str> {
    let current = collapse_percent_escapes(text);

    if !SUSPICIOUS_PERCENT.is_match(&current) {
        return current;
    }
    let decoded = SUSPICIOUS_PERCENT
        .replace_all(&current, |caps: &Captures| match caps[1].to_ascii_lowercase().as_str() {
            "3c" => "<",
            "3e" => ">",
            _ => "\"",
        })
        .into_owned();
    Cow::Owned(decoded)
}

/// Collapse `%25` chains so that `%252525` reads as `%`, in one pass.
fn collapse_percent_escapes(text: &str) -> Cow<'_, str> {
    if !text.contains("%25") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(percent) = rest.find('%') {
        out.push_str(&rest[..=percent]);
        rest = &rest[percent + 1..];
        while let Some(tail) = rest.strip_prefix("25") {
            rest = tail;
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode named and numeric character references.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(text)
}

/// Append `text` to `out` with `&`, `<` and `>` escaped and U+00A0 as `&nbsp;`.
pub fn push_encoded_text(out: &mut String, text: &str) {
    let encoded = html_escape::encode_text(text);
    push_with_nbsp(out, &encoded);
}

/// Escape `text` for use as plain text.
pub fn encode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_encoded_text(&mut out, text);
    out
}

/// Escape `value` for use inside a double quoted attribute.
pub fn encode_attribute(value: &str) -> String {
    let encoded = html_escape::encode_double_quoted_attribute(value);
    let mut out = String::with_capacity(encoded.len());
    push_with_nbsp(&mut out, &encoded);
    out
}

fn push_with_nbsp(out: &mut String, encoded: &str) {
    if !encoded.contains('\u{a0}') {
        out.push_str(encoded);
        return;
    }
    for c in encoded.chars() {
        match c {
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hex_references_become_decimal() {
        assert_eq!(decode_hex_entities("&#x3c;script&#x3E;"), "&#60;script&#62;");
        assert_eq!(decode_hex_entities("&#x6a&#x61;"), "&#106;&#97;");
        assert_eq!(decode_hex_entities("&#X41;"), "&#65;");
    }

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(decode_hex_entities("nothing &amp; here"), Cow::Borrowed(_)));
        assert!(matches!(url_decode_suspicious_sequences("100% safe"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_malformed_hex_references_are_escaped() {
        assert_eq!(decode_hex_entities("&#x;"), "&amp;#x&#59;");
        assert_eq!(decode_hex_entities("a&#xzz;b"), "a&amp;#xzz&#59;b");
        assert_eq!(decode_hex_entities("&#x0;"), "&amp;#x0&#59;");
        assert_eq!(decode_hex_entities("&#xD800;"), "&amp;#xD800&#59;");
        assert_eq!(decode_hex_entities("&#x110000;"), "&amp;#x110000&#59;");
        assert_eq!(decode_hex_entities("&#xFFFFFFFFFF;"), "&amp;#xFFFFFFFFFF&#59;");
        assert_eq!(decode_hex_entities("&#x no end"), "&amp;#x no end");
    }

    #[test]
    fn test_hex_decoding_is_stable() {
        let once = decode_hex_entities("&#x;&#x41;").into_owned();
        assert_eq!(decode_hex_entities(&once), once);
    }

    #[test]
    fn test_url_decode_suspicious_sequences() {
        assert_eq!(url_decode_suspicious_sequences("%3Cscript%3e"), "<script>");
        assert_eq!(url_decode_suspicious_sequences("%253cscript%25253E"), "<script>");
        assert_eq!(url_decode_suspicious_sequences("a=%22b%22"), "a=\"b\"");
        assert_eq!(url_decode_suspicious_sequences("%41%20"), "%41%20");
        assert_eq!(url_decode_suspicious_sequences("50%%2525 off"), "50%% off");
    }

    #[test]
    fn test_deeply_doubled_encoding_collapses() {
        let html = format!("%{}3cscript%{}3e", "25".repeat(50_000), "25".repeat(50_000));
        assert_eq!(url_decode_suspicious_sequences(&html), "<script>");
        assert_eq!(collapse_percent_escapes("%2%25"), "%2%");
    }

    #[test]
    fn test_text_encoding() {
        assert_eq!(encode_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(encode_text("x\u{a0}y"), "x&nbsp;y");
        assert_eq!(decode_entities("&lt;b&gt; &amp;&nbsp;"), "<b> &\u{a0}");
    }

    #[test]
    fn test_attribute_encoding() {
        assert_eq!(encode_attribute(r#"say "hi" & <go>"#), "say &quot;hi&quot; &amp; &lt;go&gt;");
    }
}
