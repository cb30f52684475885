//! URL value checks shared by the attribute filter and the CSS checker.

use bastion_policy::{scheme_of, UrlSchemeGuard};

const SCRIPT_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "livescript:"];

/// Lowercase `value` with every whitespace and control character removed.
///
/// This is the form browsers effectively see when resolving a scheme.
pub fn compact_lowercase(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c > ' ' && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `value` starts with a script scheme once obfuscation is removed.
pub fn has_script_scheme(value: &str) -> bool {
    let compact = compact_lowercase(value);
    SCRIPT_SCHEMES.iter().any(|scheme| compact.starts_with(scheme))
}

/// `cid:` references and inline `data:image/` URLs.
pub fn is_inline_image(value: &str) -> bool {
    let compact = compact_lowercase(value);
    compact.starts_with("cid:") || compact.starts_with("data:image/")
}

/// Empty values and bare file names such as `image001.png`.
pub fn is_local_reference(value: &str) -> bool {
    let value = value.trim();
    !value.contains([':', '/', '\\'])
}

/// Scheme guard check plus the media type restriction on `data:` URLs.
pub fn is_url_allowed(guard: &UrlSchemeGuard, value: &str) -> bool {
    if !guard.is_allowed(value) {
        return false;
    }
    match scheme_of(value).as_deref() {
        Some("data") => compact_lowercase(value).starts_with("data:image/"),
        _ => true,
    }
}
