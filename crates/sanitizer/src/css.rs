//! CSS declaration and stylesheet checking against a [`StyleWhitelist`].
//!
//! Declarations are validated one by one; a bad declaration is dropped and
//! the rest of the block survives. Surviving declarations keep their source
//! text unless some of their tokens had to be removed.

use std::borrow::Cow;

use bastion_policy::{StyleRule, StyleWhitelist, UrlSchemeGuard, ValueKind};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::urls::{compact_lowercase, is_inline_image, is_url_allowed};

/// Substrings that disqualify a declaration value outright
const FORBIDDEN_VALUE_PATTERNS: &[&str] = &[
    "expression(",
    "javascript:",
    "vbscript:",
    "behavior",
    "-moz-binding",
    "@import",
    "\\",
    "<",
    ">",
    "&",
];

/// Substrings that disqualify a selector together with its block
const FORBIDDEN_SELECTOR_PATTERNS: &[&str] = &["<", "\\", "@", "expression", "javascript"];

/// Default limit on nested `@media` blocks
const DEFAULT_MAX_BLOCK_DEPTH: usize = 256;

/// Properties that can load an image
const IMAGE_PROPERTIES: &[&str] = &["background", "background-image"];

const NAMED_COLORS: &[&str] = &[
    "aqua", "black", "blue", "fuchsia", "gray", "grey", "green", "lime", "maroon", "navy",
    "olive", "orange", "purple", "red", "silver", "teal", "white", "yellow", "aliceblue",
    "antiquewhite", "aquamarine", "azure", "beige", "bisque", "blanchedalmond", "blueviolet",
    "brown", "burlywood", "cadetblue", "chartreuse", "chocolate", "coral", "cornflowerblue",
    "cornsilk", "crimson", "cyan", "darkblue", "darkcyan", "darkgoldenrod", "darkgray",
    "darkgreen", "darkkhaki", "darkmagenta", "darkolivegreen", "darkorange", "darkorchid",
    "darkred", "darksalmon", "darkseagreen", "darkslateblue", "darkslategray", "darkturquoise",
    "darkviolet", "deeppink", "deepskyblue", "dimgray", "dodgerblue", "firebrick",
    "floralwhite", "forestgreen", "gainsboro", "ghostwhite", "gold", "goldenrod", "greenyellow",
    "honeydew", "hotpink", "indianred", "indigo", "ivory", "khaki", "lavender", "lavenderblush",
    "lawngreen", "lemonchiffon", "lightblue", "lightcoral", "lightcyan", "lightgray",
    "lightgreen", "lightpink", "lightsalmon", "lightseagreen", "lightskyblue", "lightslategray",
    "lightsteelblue", "lightyellow", "limegreen", "linen", "magenta", "mediumaquamarine",
    "mediumblue", "mediumorchid", "mediumpurple", "mediumseagreen", "mediumslateblue",
    "mediumspringgreen", "mediumturquoise", "mediumvioletred", "midnightblue", "mintcream",
    "mistyrose", "moccasin", "navajowhite", "oldlace", "olivedrab", "orangered", "orchid",
    "palegoldenrod", "palegreen", "paleturquoise", "palevioletred", "papayawhip", "peachpuff",
    "peru", "pink", "plum", "powderblue", "rosybrown", "royalblue", "saddlebrown", "salmon",
    "sandybrown", "seagreen", "seashell", "sienna", "skyblue", "slateblue", "slategray", "snow",
    "springgreen", "steelblue", "tan", "thistle", "tomato", "turquoise", "violet", "wheat",
    "whitesmoke", "yellowgreen", "transparent", "currentcolor",
];

lazy_static! {
    static ref LENGTH: Regex =
        Regex::new(r"^[-+]?(\d+|\d*\.\d+)(px|em|ex|pt|pc|cm|mm|in|%|rem|vh|vw|ch)?$").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^[-+]?(\d+|\d*\.\d+)$").unwrap();
    static ref HEX_COLOR: Regex =
        Regex::new(r"^#([0-9a-f]{3}|[0-9a-f]{4}|[0-9a-f]{6}|[0-9a-f]{8})$").unwrap();
    static ref COLOR_FUNCTION: Regex =
        Regex::new(r"^(rgb|rgba|hsl|hsla)\([-+0-9a-z.%,\s/]*\)$").unwrap();
    static ref TIME: Regex = Regex::new(r"^(\d+|\d*\.\d+)(s|ms)$").unwrap();
    static ref INTEGER: Regex = Regex::new(r"^\d+$").unwrap();
    static ref IMPORTANT: Regex = Regex::new(r"(?i)!\s*important\s*$").unwrap();
    static ref SCOPE_PREFIX: Regex = Regex::new(r"^[A-Za-z][-A-Za-z0-9_]*$").unwrap();
}

/// Result of a CSS check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssOutput {
    /// The sanitized CSS
    pub css: String,
    /// Whether an external image reference was removed
    pub images_found: bool,
    /// Number of declarations dropped
    pub dropped: usize,
}

/// Validates CSS against a style whitelist.
#[derive(Debug, Clone, Copy)]
pub struct CssChecker<'a> {
    styles: &'a StyleWhitelist,
    guard: &'a UrlSchemeGuard,
    require_all_values_valid: bool,
    drop_external_images: bool,
    max_block_depth: usize,
}

impl<'a> CssChecker<'a> {
    /// A checker that drops any declaration with an invalid token.
    pub fn new(styles: &'a StyleWhitelist, guard: &'a UrlSchemeGuard) -> Self {
        Self {
            styles,
            guard,
            require_all_values_valid: true,
            drop_external_images: false,
            max_block_depth: DEFAULT_MAX_BLOCK_DEPTH,
        }
    }

    /// With `false`, invalid tokens are removed and the rest of the value kept.
    pub fn require_all_values_valid(mut self, require: bool) -> Self {
        self.require_all_values_valid = require;
        self
    }

    /// Remove `url(...)` image references that are not inline images.
    pub fn drop_external_images(mut self, drop: bool) -> Self {
        self.drop_external_images = drop;
        self
    }

    /// Drop `@media` blocks nested deeper than `depth`.
    pub fn max_block_depth(mut self, depth: usize) -> Self {
        self.max_block_depth = depth;
        self
    }

    /// Check a declaration block such as the content of a `style` attribute.
    pub fn check_declarations(&self, css: &str) -> CssOutput {
        let cleaned = strip_comments(css);
        let mut output = CssOutput::default();
        let mut kept: Vec<Cow<'_, str>> = Vec::new();

        for declaration in split_top_level(&cleaned, ';') {
            let declaration = declaration.trim();
            if declaration.is_empty() {
                continue;
            }
            match self.check_declaration(declaration, &mut output.images_found) {
                Some(text) => kept.push(text),
                None => {
                    debug!("🚫 CSS declaration `{}` dropped", declaration);
                    output.dropped += 1;
                }
            }
        }

        output.css = kept.join("; ");
        output
    }

    fn check_declaration<'d>(&self, declaration: &'d str, images_found: &mut bool) -> Option<Cow<'d, str>> {
        let colon = find_top_level(declaration, ':')?;
        let property_text = declaration[..colon].trim();
        let property = property_text.to_ascii_lowercase();
        let rule = self.styles.get(&property)?;

        let raw_value = declaration[colon + 1..].trim();
        if is_forbidden_value(raw_value) {
            return None;
        }

        let (value, important) = match IMPORTANT.find(raw_value) {
            Some(found) => (raw_value[..found.start()].trim_end(), true),
            None => (raw_value, false),
        };

        let tokens = split_value(value);
        if tokens.is_empty() {
            return None;
        }

        let blocks_images = self.drop_external_images && IMAGE_PROPERTIES.contains(&property.as_str());
        let mut changed = false;
        let mut kept = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !self.token_allowed(rule, token.text) {
                if self.require_all_values_valid {
                    return None;
                }
                changed = true;
                continue;
            }
            if blocks_images && url_target(token.text).is_some_and(|href| !is_inline_image(href)) {
                *images_found = true;
                changed = true;
                continue;
            }
            kept.push(token);
        }

        if kept.is_empty() {
            return None;
        }
        if !changed {
            return Some(Cow::Borrowed(declaration));
        }

        let mut rebuilt = format!("{}: ", property_text);
        for (i, token) in kept.iter().enumerate() {
            if i > 0 {
                rebuilt.push_str(if token.after_comma { ", " } else { " " });
            }
            rebuilt.push_str(token.text);
        }
        if important {
            rebuilt.push_str(" !important");
        }
        Some(Cow::Owned(rebuilt))
    }

    fn token_allowed(&self, rule: &StyleRule, token: &str) -> bool {
        if rule.allows_keyword(token) {
            return true;
        }
        let lower = token.to_ascii_lowercase();
        rule.kinds.iter().any(|kind| match kind {
            ValueKind::Length => LENGTH.is_match(&lower),
            ValueKind::Number => NUMBER.is_match(&lower),
            ValueKind::Color => is_color(&lower),
            ValueKind::Url => url_target(token).is_some_and(|href| is_url_allowed(self.guard, href)),
            ValueKind::Time => TIME.is_match(&lower),
            ValueKind::Integer => INTEGER.is_match(&lower),
            ValueKind::AnyToken => !token.contains('('),
        })
    }

    /// Check the content of a `<style>` element.
    ///
    /// With `scope`, every selector is prefixed with `#scope` so the rules
    /// only apply inside the element carrying that id.
    pub fn check_stylesheet(&self, css: &str, scope: Option<&str>) -> CssOutput {
        let scope = scope.filter(|prefix| {
            let valid = SCOPE_PREFIX.is_match(prefix);
            if !valid {
                debug!("CSS scope prefix `{}` ignored", prefix);
            }
            valid
        });

        let cleaned = strip_comments(css);
        let mut output = CssOutput::default();
        let rules = self.check_rules(&cleaned, scope, 0, &mut output);
        output.css = rules.join("\n").replace('<', "");
        output
    }

    fn check_rules(&self, css: &str, scope: Option<&str>, depth: usize, output: &mut CssOutput) -> Vec<String> {
        let mut rules = Vec::new();
        let mut rest = css;

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            if rest.starts_with('@') {
                match find_first_top_level(rest, &['{', ';']) {
                    Some((semicolon, ';')) => {
                        debug!("🚫 CSS at-rule `{}` dropped", rest[..semicolon].trim());
                        rest = &rest[semicolon + 1..];
                    }
                    Some((open, _)) => {
                        let head = rest[..open].trim();
                        let close = block_end(rest, open).unwrap_or(rest.len());
                        let body = &rest[open + 1..close];
                        rest = rest.get(close + 1..).unwrap_or("");

                        let lower = head.to_ascii_lowercase();
                        if !lower.starts_with("@media") || is_forbidden_selector(&lower[1..]) {
                            debug!("🚫 CSS at-rule `{}` dropped", head);
                            continue;
                        }
                        if depth >= self.max_block_depth {
                            debug!("🚫 CSS at-rule `{}` nested too deep, dropped", head);
                            continue;
                        }
                        let inner = self.check_rules(body, scope, depth + 1, output);
                        if !inner.is_empty() {
                            rules.push(format!("{} {{\n{}\n}}", head, inner.join("\n")));
                        }
                    }
                    None => break,
                }
                continue;
            }

            let Some(open) = find_top_level(rest, '{') else {
                break;
            };
            let selector = rest[..open].trim();
            let close = block_end(rest, open).unwrap_or(rest.len());
            let body = &rest[open + 1..close];
            rest = rest.get(close + 1..).unwrap_or("");

            if selector.is_empty() || is_forbidden_selector(&selector.to_ascii_lowercase()) {
                debug!("🚫 CSS rule `{}` dropped", selector);
                continue;
            }

            let declarations = self.check_declarations(body);
            output.images_found |= declarations.images_found;
            output.dropped += declarations.dropped;
            if declarations.css.is_empty() {
                continue;
            }

            let selector = match scope {
                Some(prefix) => scope_selector(selector, prefix),
                None => selector.to_string(),
            };
            rules.push(format!("{} {{ {} }}", selector, declarations.css));
        }

        rules
    }
}

/// Check `declarations` against `styles` with the default scheme guard.
pub fn check_css(declarations: &str, styles: &StyleWhitelist, require_all_values_valid: bool) -> String {
    let guard = UrlSchemeGuard::default();
    CssChecker::new(styles, &guard)
        .require_all_values_valid(require_all_values_valid)
        .check_declarations(declarations)
        .css
}

/// Whether `css` references an image that is not inline through
/// `background` or `background-image`.
pub fn contains_forbidden_image_reference(css: &str, guard: &UrlSchemeGuard) -> bool {
    let styles = StyleWhitelist::image_styles();
    CssChecker::new(&styles, guard)
        .require_all_values_valid(false)
        .drop_external_images(true)
        .check_declarations(css)
        .images_found
}

/// One token of a declaration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueToken<'v> {
    text: &'v str,
    /// Separated from the previous token by a comma
    after_comma: bool,
}

/// Split a value on whitespace and top-level commas.
fn split_value(value: &str) -> Vec<ValueToken<'_>> {
    let mut tokens = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut after_comma = false;

    for (i, c) in value.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                start.get_or_insert(i);
            }
            '(' => {
                depth += 1;
                start.get_or_insert(i);
            }
            ')' => depth = depth.saturating_sub(1),
            ',' | ' ' | '\t' | '\n' | '\r' | '\x0c' if depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(ValueToken { text: &value[s..i], after_comma });
                    after_comma = false;
                }
                if c == ',' {
                    after_comma = true;
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        tokens.push(ValueToken { text: &value[s..], after_comma });
    }
    tokens
}

/// The href inside a `url(...)` token.
fn url_target(token: &str) -> Option<&str> {
    let open = token.find('(')?;
    if !token[..open].eq_ignore_ascii_case("url") {
        return None;
    }
    let inner = token[open + 1..].strip_suffix(')')?.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| inner.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)));
    Some(unquoted.unwrap_or(inner).trim())
}

fn is_color(lower: &str) -> bool {
    NAMED_COLORS.contains(&lower) || HEX_COLOR.is_match(lower) || COLOR_FUNCTION.is_match(lower)
}

fn is_forbidden_value(value: &str) -> bool {
    let compact = compact_lowercase(value);
    FORBIDDEN_VALUE_PATTERNS.iter().any(|pattern| compact.contains(pattern))
}

fn is_forbidden_selector(lower: &str) -> bool {
    FORBIDDEN_SELECTOR_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Prefix each selector of a group with `#prefix`.
fn scope_selector(selector: &str, prefix: &str) -> String {
    let scope = format!("#{}", prefix);
    selector
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part == scope || part.starts_with(&format!("{} ", scope)) {
                return part.to_string();
            }
            let lower = part.to_ascii_lowercase();
            for root in ["html", "body"] {
                if lower == root {
                    return scope.clone();
                }
                if lower.starts_with(root) && lower[root.len()..].starts_with(char::is_whitespace) {
                    return format!("{} {}", scope, part[root.len()..].trim_start());
                }
            }
            format!("{} {}", scope, part)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Remove `/* */` comments and HTML comment delimiters.
fn strip_comments(css: &str) -> Cow<'_, str> {
    if !css.contains("/*") && !css.contains("<!--") && !css.contains("-->") {
        return Cow::Borrowed(css);
    }

    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(open) = rest.find("/*") {
        out.push_str(&rest[..open]);
        match rest[open + 2..].find("*/") {
            Some(close) => rest = &rest[open + 2 + close + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    if !out.contains("<!--") && !out.contains("-->") {
        return Cow::Owned(out);
    }
    // Removing a delimiter can join its neighbours into a new one, so
    // check the tail after every character.
    let mut stripped = String::with_capacity(out.len());
    for c in out.chars() {
        stripped.push(c);
        for delimiter in ["<!--", "-->"] {
            if stripped.ends_with(delimiter) {
                stripped.truncate(stripped.len() - delimiter.len());
            }
        }
    }
    Cow::Owned(stripped)
}

/// Split on `separator` outside quotes and parentheses.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// First `target` outside quotes and parentheses.
fn find_top_level(text: &str, target: char) -> Option<usize> {
    find_first_top_level(text, &[target]).map(|(idx, _)| idx)
}

/// First of `targets` outside quotes and parentheses, with the one found.
fn find_first_top_level(text: &str, targets: &[char]) -> Option<(usize, char)> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            c if depth == 0 && targets.contains(&c) => return Some((i, c)),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Index of the `}` closing the block opened at `open`.
fn block_end(text: &str, open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}
