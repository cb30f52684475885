//! Allow-list check for URL schemes.

use std::collections::HashSet;

use url::Url;

use crate::error::{PolicyError, PolicyResult};

/// Schemes allowed when the configuration supplies no list.
pub const DEFAULT_SCHEMES: [&str; 6] = ["http", "https", "ftp", "ftps", "mailto", "tel"];

/// Pseudo-schemes that are allowed regardless of configuration.
pub const ALWAYS_ALLOWED_SCHEMES: [&str; 2] = ["cid", "data"];

/// Rejects URLs whose scheme is not explicitly allowed.
///
/// `data:` passes this guard on the scheme alone; media type restrictions are
/// applied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSchemeGuard {
    allowed: HashSet<String>,
}

impl UrlSchemeGuard {
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed: HashSet<String> = schemes
            .into_iter()
            .map(|s| s.as_ref().trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        allowed.extend(ALWAYS_ALLOWED_SCHEMES.iter().map(|s| s.to_string()));
        Self { allowed }
    }

    /// Build from a comma separated list such as `"http, https, mailto"`.
    pub fn from_list(list: &str) -> PolicyResult<Self> {
        let schemes: Vec<&str> = list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        if let Some(bad) = schemes.iter().find(|s| !is_scheme_token(s)) {
            return Err(PolicyError::InvalidScheme { scheme: bad.to_string() });
        }
        Ok(Self::new(schemes))
    }

    /// Whether `url` is relative or uses an allowed scheme.
    pub fn is_allowed(&self, url: &str) -> bool {
        match scheme_of(url) {
            Some(scheme) => self.allowed.contains(&scheme),
            None => true,
        }
    }

    pub fn is_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed.contains(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

impl Default for UrlSchemeGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMES)
    }
}

/// Extract the lowercase scheme of `url`, or `None` for a relative URL.
pub fn scheme_of(url: &str) -> Option<String> {
    match Url::parse(url.trim()) {
        Ok(parsed) => Some(parsed.scheme().to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => None,
        Err(_) => manual_scheme(url),
    }
}

/// Scheme scan for URLs the `url` crate refuses (bad hosts, invalid ports).
fn manual_scheme(url: &str) -> Option<String> {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect();
    let colon = cleaned.find(':')?;
    let candidate = &cleaned[..colon];
    is_scheme_token(candidate).then(|| candidate.to_ascii_lowercase())
}

fn is_scheme_token(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
