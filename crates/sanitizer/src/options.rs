use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-call sanitizer options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizeOptions {
    /// Delete rejected elements instead of showing their markup as text
    pub strip_invalid_elements: bool,
    /// Keep runs of spaces and tabs visible with non-breaking spaces
    pub format_whitespace: bool,
    /// Blank image references that are not inline (`cid:` or `data:image/`)
    pub drop_external_images: bool,
    /// Named policy to apply; the default policy when `None`
    pub policy_name: Option<String>,
    /// Id used to scope the rules of `<style>` elements
    pub css_prefix: Option<String>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            strip_invalid_elements: true,
            format_whitespace: false,
            drop_external_images: false,
            policy_name: None,
            css_prefix: None,
        }
    }
}

impl SanitizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, name: impl Into<String>) -> Self {
        self.policy_name = Some(name.into());
        self
    }

    pub fn with_css_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.css_prefix = Some(prefix.into());
        self
    }
}

/// A sanitized document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizedHtml {
    /// The sanitized markup
    pub html: String,
    /// Whether an external image reference was removed
    pub images_found: bool,
}

impl fmt::Display for SanitizedHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html)
    }
}

impl From<SanitizedHtml> for String {
    fn from(sanitized: SanitizedHtml) -> Self {
        sanitized.html
    }
}
