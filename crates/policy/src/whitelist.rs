//! The immutable whitelist model consulted by the sanitizer.
//!
//! A [`Whitelist`] is built once by the loader and then only ever read. Reloads
//! build a new value and publish it through the [`crate::WhitelistStore`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Tags that are always present in the tag whitelist.
pub const STRUCTURAL_TAGS: [&str; 3] = ["html", "head", "body"];

/// Constraint placed on the value of a whitelisted attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ValueConstraint {
    /// Any value (still subject to URL scheme and script checks)
    Any,
    /// One of the listed values, compared case-insensitively
    Enumerated(HashSet<String>),
    /// ASCII digits only
    NumericOnly,
}

impl ValueConstraint {
    /// Build an enumerated constraint, normalizing values to lowercase.
    pub fn enumerated<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ValueConstraint::Enumerated(
            values
                .into_iter()
                .map(|v| v.as_ref().trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .collect(),
        )
    }

    /// Check a (decoded) attribute value against this constraint.
    pub fn permits(&self, value: &str) -> bool {
        match self {
            ValueConstraint::Any => true,
            ValueConstraint::Enumerated(values) => {
                values.contains(&value.trim().to_ascii_lowercase())
            }
            ValueConstraint::NumericOnly => {
                let value = value.trim();
                !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
            }
        }
    }
}

/// Attribute name to value constraint.
pub type AttributeRules = HashMap<String, ValueConstraint>;

/// `None` allows the tag with no attribute restriction.
pub type TagRule = Option<AttributeRules>;

/// Value shape markers usable in a style rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// `N`: number with an optional unit or `%`
    Length,
    /// `n`: unitless number
    Number,
    /// `c`: colour literal
    Color,
    /// `u`: `url(...)`
    Url,
    /// `t`: time literal
    Time,
    /// `0`: non-negative integer
    Integer,
    /// `*`: any token
    AnyToken,
}

impl ValueKind {
    /// Map a one-character marker from a policy definition to its kind.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "N" => Some(ValueKind::Length),
            "n" => Some(ValueKind::Number),
            "c" => Some(ValueKind::Color),
            "u" => Some(ValueKind::Url),
            "t" => Some(ValueKind::Time),
            "0" => Some(ValueKind::Integer),
            "*" => Some(ValueKind::AnyToken),
            _ => None,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ValueKind::Length => "N",
            ValueKind::Number => "n",
            ValueKind::Color => "c",
            ValueKind::Url => "u",
            ValueKind::Time => "t",
            ValueKind::Integer => "0",
            ValueKind::AnyToken => "*",
        }
    }
}

/// Allowed values for one CSS property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyleRule {
    /// Literal keywords, lowercase
    pub keywords: HashSet<String>,
    /// Value shapes accepted in addition to the keywords
    pub kinds: HashSet<ValueKind>,
}

impl StyleRule {
    /// Parse a comma separated token specification such as `N,c,auto,none`.
    pub fn from_spec(spec: &str) -> Self {
        let mut rule = StyleRule::default();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match ValueKind::from_marker(entry) {
                Some(kind) => {
                    rule.kinds.insert(kind);
                }
                None => {
                    rule.keywords.insert(entry.to_ascii_lowercase());
                }
            }
        }
        rule
    }

    pub fn allows_keyword(&self, token: &str) -> bool {
        self.keywords.contains(&token.to_ascii_lowercase())
    }

    pub fn has_kind(&self, kind: ValueKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Union another rule into this one.
    pub fn merge(&mut self, other: &StyleRule) {
        self.keywords.extend(other.keywords.iter().cloned());
        self.kinds.extend(other.kinds.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.kinds.is_empty()
    }
}

/// CSS property name to its allowed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyleWhitelist {
    properties: HashMap<String, StyleRule>,
}

impl StyleWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, property: &str, rule: StyleRule) {
        self.properties.insert(property.trim().to_ascii_lowercase(), rule);
    }

    /// Look up a property; `property` must already be lowercase.
    pub fn get(&self, property: &str) -> Option<&StyleRule> {
        self.properties.get(property)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.properties.contains_key(property)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// The whitelist used to detect external image references: `background`
    /// and `background-image` with URL values.
    pub fn image_styles() -> Self {
        let mut styles = StyleWhitelist::new();
        styles.insert("background", StyleRule::from_spec("u,c,N,*"));
        styles.insert("background-image", StyleRule::from_spec("u,none"));
        styles
    }
}

/// Complete sanitization policy: tag rules and style rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Whitelist {
    tags: HashMap<String, TagRule>,
    styles: StyleWhitelist,
}

impl Whitelist {
    /// Build a whitelist, inserting the structural tags when they are missing.
    pub fn new(mut tags: HashMap<String, TagRule>, styles: StyleWhitelist) -> Self {
        for tag in STRUCTURAL_TAGS {
            tags.entry(tag.to_string()).or_insert(None);
        }
        Self { tags, styles }
    }

    /// Rule for a tag; `None` when the tag is not whitelisted at all.
    pub fn tag_rule(&self, name: &str) -> Option<&TagRule> {
        self.tags.get(name)
    }

    pub fn is_tag_allowed(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Whether `attribute` may appear on `tag`, and with which constraint.
    ///
    /// A tag without attribute restriction reports [`ValueConstraint::Any`].
    pub fn attribute_constraint(&self, tag: &str, attribute: &str) -> Option<&ValueConstraint> {
        match self.tags.get(tag)? {
            None => Some(&ValueConstraint::Any),
            Some(rules) => rules.get(attribute),
        }
    }

    pub fn styles(&self) -> &StyleWhitelist {
        &self.styles
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}
