//! Parser for the line oriented whitelist definition format.
//!
//! ```text
//! html.tag.img=",alt,src,width[],align[left:right],"
//! html.style.color="c"
//! html.style.background=""
//! html.style.combimap.background="background-color,background-image"
//! ```
//!
//! Individual malformed lines are skipped; they never fail the whole load.

use std::collections::HashMap;

use crate::error::{PolicyError, PolicyResult};
use crate::whitelist::{AttributeRules, StyleRule, StyleWhitelist, TagRule, ValueConstraint, Whitelist};

const TAG_PREFIX: &str = "html.tag.";
const STYLE_PREFIX: &str = "html.style.";
const COMBIMAP_PREFIX: &str = "html.style.combimap.";

/// The compiled-in default policy.
pub const DEFAULT_DEFINITION: &str = include_str!("../resources/whitelist.properties");

/// Name used for the default policy in logs and errors.
pub const DEFAULT_POLICY_NAME: &str = "default";

/// Parse a whitelist definition.
///
/// Fails only when not a single tag rule could be read from `definition`.
pub fn parse_whitelist(definition: &str) -> PolicyResult<Whitelist> {
    parse_named(DEFAULT_POLICY_NAME, definition)
}

/// Parse a definition, naming it in diagnostics.
pub fn parse_named(name: &str, definition: &str) -> PolicyResult<Whitelist> {
    let mut tags: HashMap<String, TagRule> = HashMap::new();
    let mut styles: Vec<(String, String)> = Vec::new();
    let mut combimap: HashMap<String, Vec<String>> = HashMap::new();

    for (line_no, raw) in definition.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log::debug!("policy {}: line {} has no '=', skipped", name, line_no + 1);
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = unquote(value.trim());

        if let Some(prop) = key.strip_prefix(COMBIMAP_PREFIX) {
            if !is_valid_name(prop) {
                log::debug!("policy {}: line {} bad combimap property, skipped", name, line_no + 1);
                continue;
            }
            let longhands = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_ascii_lowercase)
                .collect();
            combimap.insert(prop.to_string(), longhands);
        } else if let Some(prop) = key.strip_prefix(STYLE_PREFIX) {
            if !is_valid_name(prop) {
                log::debug!("policy {}: line {} bad style property, skipped", name, line_no + 1);
                continue;
            }
            styles.push((prop.to_string(), value.to_string()));
        } else if let Some(tag) = key.strip_prefix(TAG_PREFIX) {
            if !is_valid_name(tag) {
                log::debug!("policy {}: line {} bad tag name, skipped", name, line_no + 1);
                continue;
            }
            match parse_attribute_specs(value) {
                Some(rules) => {
                    tags.insert(tag.to_string(), Some(rules));
                }
                None => {
                    log::debug!("policy {}: line {} bad attribute list, skipped", name, line_no + 1);
                }
            }
        } else {
            log::debug!("policy {}: line {} unknown key `{}`, skipped", name, line_no + 1, key);
        }
    }

    if tags.is_empty() {
        return Err(PolicyError::Empty { name: name.to_string() });
    }

    Ok(Whitelist::new(tags, resolve_styles(styles, &combimap)))
}

/// Build the style whitelist, expanding empty entries through the combination map.
fn resolve_styles(entries: Vec<(String, String)>, combimap: &HashMap<String, Vec<String>>) -> StyleWhitelist {
    let mut explicit: HashMap<String, StyleRule> = HashMap::new();
    let mut deferred = Vec::new();

    for (prop, spec) in entries {
        if spec.trim().is_empty() {
            deferred.push(prop);
        } else {
            explicit.insert(prop, StyleRule::from_spec(&spec));
        }
    }

    let mut styles = StyleWhitelist::new();
    for prop in deferred {
        let Some(longhands) = combimap.get(&prop) else {
            log::debug!("style `{}` is empty and has no combimap entry, skipped", prop);
            continue;
        };
        let mut rule = StyleRule::default();
        for longhand in longhands {
            match explicit.get(longhand) {
                Some(longhand_rule) => rule.merge(longhand_rule),
                None => rule.merge(&StyleRule::from_spec(longhand)),
            }
        }
        if rule.is_empty() {
            continue;
        }
        styles.insert(&prop, rule);
    }
    for (prop, rule) in explicit {
        styles.insert(&prop, rule);
    }
    styles
}

/// Parse `,href,align[left:right],width[],` into attribute rules.
fn parse_attribute_specs(value: &str) -> Option<AttributeRules> {
    let mut rules = AttributeRules::new();
    for spec in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, constraint) = match spec.find('[') {
            Some(open) => {
                let inner = spec[open + 1..].strip_suffix(']')?;
                let constraint = if inner.trim().is_empty() {
                    ValueConstraint::NumericOnly
                } else {
                    ValueConstraint::enumerated(inner.split(':'))
                };
                (&spec[..open], constraint)
            }
            None => (spec, ValueConstraint::Any),
        };
        let name = name.trim().to_ascii_lowercase();
        if !is_valid_name(&name) {
            return None;
        }
        rules.insert(name, constraint);
    }
    Some(rules)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}
