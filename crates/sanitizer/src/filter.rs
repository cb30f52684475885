//! The tag and attribute filter.
//!
//! One forward walk over the token stream. Every start tag is accepted and
//! rewritten, or rejected; a rejected tag is deleted (with or without its
//! content) or shown as escaped text depending on the options and on whether
//! the walk is inside an accepted `<body>`.

use std::borrow::Cow;
use std::collections::HashSet;

use bastion_policy::{UrlSchemeGuard, Whitelist};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::config::SanitizerConfig;
use crate::css::CssChecker;
use crate::elements::{end_tag, is_always_removed, is_list_container, is_void, EndTag};
use crate::entities::{decode_entities, encode_attribute, push_encoded_text};
use crate::error::SanitizeResult;
use crate::options::SanitizeOptions;
use crate::structure::{Closing, Structure};
use crate::tokenizer::{Attribute, Span, Token, Tokenizer};
use crate::urls::{has_script_scheme, is_inline_image, is_local_reference, is_url_allowed};

lazy_static! {
    static ref ATTRIBUTE_NAME: Regex = Regex::new(r"^[a-zA-Z_:][-a-zA-Z0-9_:.]*$").unwrap();
}

/// Attributes whose value is a URL
const URL_ATTRIBUTES: &[&str] = &[
    "action", "background", "cite", "codebase", "data", "dynsrc", "formaction", "href",
    "longdesc", "lowsrc", "poster", "profile", "src", "usemap", "xlink:href",
];

/// Counters for one filter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub tags_rejected: usize,
    pub attributes_dropped: usize,
    pub css_declarations_dropped: usize,
}

/// Result of filtering one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutput {
    pub html: String,
    /// Whether an external image reference was blanked
    pub images_found: bool,
    pub stats: FilterStats,
}

/// Applies a [`Whitelist`] to a document.
#[derive(Debug, Clone, Copy)]
pub struct HtmlFilter<'a> {
    whitelist: &'a Whitelist,
    guard: &'a UrlSchemeGuard,
    config: &'a SanitizerConfig,
}

impl<'a> HtmlFilter<'a> {
    pub fn new(whitelist: &'a Whitelist, guard: &'a UrlSchemeGuard, config: &'a SanitizerConfig) -> Self {
        Self { whitelist, guard, config }
    }

    /// Filter `html`, failing only when a resource limit is exceeded.
    pub fn filter(&self, html: &str, options: &SanitizeOptions) -> SanitizeResult<FilterOutput> {
        let tokens = Tokenizer::new(html, self.config.max_attributes).tokenize()?;
        let structure = Structure::analyze(&tokens, self.config.max_nesting_depth)?;

        // Without a <body> the input is a fragment and counts as body content.
        let fragment = !tokens
            .iter()
            .any(|token| matches!(token, Token::StartTag { name, .. } if name == "body"));

        let mut walk = Walk {
            filter: *self,
            options,
            html,
            tokens: &tokens,
            structure: &structure,
            out: String::with_capacity(html.len()),
            stack: Vec::new(),
            body_open: fragment,
            text_tail: '\0',
            images_found: false,
            stats: FilterStats::default(),
        };
        walk.run();

        Ok(FilterOutput {
            html: walk.out,
            images_found: walk.images_found,
            stats: walk.stats,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    /// Rewritten and emitted
    Accepted,
    /// Tag deleted, content kept
    Dropped,
    /// Tag shown as escaped text
    Escaped,
}

#[derive(Debug)]
struct OpenElement<'t> {
    start: usize,
    name: &'t str,
    fate: Fate,
}

struct Walk<'f, 't> {
    filter: HtmlFilter<'f>,
    options: &'t SanitizeOptions,
    html: &'t str,
    tokens: &'t [Token],
    structure: &'t Structure,
    out: String,
    stack: Vec<OpenElement<'t>>,
    body_open: bool,
    /// Last character of the text emitted since the last tag
    text_tail: char,
    images_found: bool,
    stats: FilterStats,
}

impl<'f, 't> Walk<'f, 't> {
    fn run(&mut self) {
        let tokens = self.tokens;
        let mut idx = 0;

        while idx < tokens.len() {
            self.close_implicit(idx);
            idx = match &tokens[idx] {
                Token::StartTag { name, attributes, span, .. } => self.start_tag(idx, name, attributes, *span),
                Token::EndTag { span, .. } => {
                    self.end_tag(idx, *span);
                    idx + 1
                }
                Token::Text { span } => {
                    self.text(*span);
                    idx + 1
                }
                Token::Comment { .. } => idx + 1,
            };
        }

        self.close_implicit(tokens.len());
    }

    /// Emit end tags for accepted elements closing before token `idx`.
    fn close_implicit(&mut self, idx: usize) {
        let structure = self.structure;
        for &start in structure.closes_before(idx) {
            let Some(pos) = self.stack.iter().rposition(|open| open.start == start) else {
                continue;
            };
            while self.stack.len() > pos {
                if let Some(open) = self.stack.pop() {
                    self.close(&open);
                }
            }
        }
    }

    fn close(&mut self, open: &OpenElement<'t>) {
        if open.fate == Fate::Accepted {
            self.push_end_tag(open.name);
            if open.name == "body" {
                self.body_open = false;
            }
        }
    }

    /// Handle a start tag, returning the index of the next token to visit.
    fn start_tag(&mut self, idx: usize, name: &'t str, attributes: &'t [Attribute], span: Span) -> usize {
        let closing = self.structure.closing(idx);

        if let Some(reason) = self.rejection(name, closing) {
            self.stats.tags_rejected += 1;
            debug!("🚫 Element <{}> blocked: {}", name, reason);

            if is_always_removed(name) || name == "style" {
                return self.structure.region_end(idx);
            }
            if !self.options.strip_invalid_elements {
                self.push_text(span.slice(self.html));
                self.open(idx, name, Fate::Escaped, closing);
                return idx + 1;
            }
            if !self.body_open {
                return self.skip_before_body(idx);
            }
            self.open(idx, name, Fate::Dropped, closing);
            return idx + 1;
        }

        self.write_start_tag(name, attributes);
        if name == "body" {
            self.body_open = true;
        }
        if closing == Some(Closing::Immediate) {
            if !is_void(name) {
                self.push_end_tag(name);
            }
        } else {
            self.open(idx, name, Fate::Accepted, closing);
        }
        idx + 1
    }

    /// Skip a rejected element outside the body.
    ///
    /// The skip stops at a `<body>` start tag inside the element, so an
    /// unclosed element in the head cannot swallow the body.
    fn skip_before_body(&mut self, idx: usize) -> usize {
        let end = self.structure.region_end(idx);
        self.tokens[idx + 1..end]
            .iter()
            .position(|token| matches!(token, Token::StartTag { name, .. } if name == "body"))
            .map_or(end, |offset| idx + 1 + offset)
    }

    fn open(&mut self, start: usize, name: &'t str, fate: Fate, closing: Option<Closing>) {
        if closing != Some(Closing::Immediate) {
            self.stack.push(OpenElement { start, name, fate });
        }
    }

    fn rejection(&self, name: &str, closing: Option<Closing>) -> Option<&'static str> {
        if is_always_removed(name) {
            return Some("always removed");
        }
        if !self.filter.whitelist.is_tag_allowed(name) {
            return Some("not whitelisted");
        }
        if end_tag(name) == EndTag::Mandatory && matches!(closing, Some(Closing::Implicit(_))) {
            return Some("missing end tag");
        }
        if name == "li"
            && !self
                .stack
                .last()
                .is_some_and(|open| open.fate == Fate::Accepted && is_list_container(open.name))
        {
            return Some("list item outside an accepted list");
        }
        None
    }

    fn end_tag(&mut self, idx: usize, span: Span) {
        let Some(start) = self.structure.matched_start(idx) else {
            debug!("🚫 Stray end tag {} dropped", span.slice(self.html));
            return;
        };
        let Some(pos) = self.stack.iter().rposition(|open| open.start == start) else {
            return;
        };
        while self.stack.len() > pos + 1 {
            if let Some(open) = self.stack.pop() {
                self.close(&open);
            }
        }
        if let Some(open) = self.stack.pop() {
            match open.fate {
                Fate::Accepted => self.close(&open),
                Fate::Escaped => self.push_text(span.slice(self.html)),
                Fate::Dropped => {}
            }
        }
    }

    fn text(&mut self, span: Span) {
        let raw = span.slice(self.html);

        if self
            .stack
            .last()
            .is_some_and(|open| open.name == "style" && open.fate == Fate::Accepted)
        {
            let checked = CssChecker::new(self.filter.whitelist.styles(), self.filter.guard)
                .drop_external_images(self.options.drop_external_images)
                .max_block_depth(self.filter.config.max_nesting_depth)
                .check_stylesheet(raw, self.options.css_prefix.as_deref());
            self.images_found |= checked.images_found;
            self.stats.css_declarations_dropped += checked.dropped;
            self.out.push_str(&checked.css);
            return;
        }

        let decoded = decode_entities(raw);
        self.push_text(&decoded);
    }

    /// Append text, formatted as one stream with the text before it.
    fn push_text(&mut self, text: &str) {
        if self.options.format_whitespace {
            let formatted = format_whitespace(text, &mut self.text_tail);
            push_encoded_text(&mut self.out, &formatted);
        } else {
            push_encoded_text(&mut self.out, text);
        }
    }

    fn push_end_tag(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
        self.text_tail = '\0';
    }

    fn write_start_tag(&mut self, name: &str, attributes: &[Attribute]) {
        self.out.push('<');
        self.out.push_str(name);

        let mut seen = HashSet::new();
        for attribute in attributes {
            if !seen.insert(attribute.name.as_str()) {
                self.stats.attributes_dropped += 1;
                continue;
            }
            match self.rewrite_attribute(name, attribute) {
                Some(rendered) => self.out.push_str(&rendered),
                None => {
                    self.stats.attributes_dropped += 1;
                    debug!("🚫 Attribute {} dropped from <{}>", attribute.name, name);
                }
            }
        }

        self.out.push('>');
        self.text_tail = '\0';
    }

    /// The rendered attribute (with its leading space), or `None` to drop it.
    fn rewrite_attribute(&mut self, tag: &str, attribute: &Attribute) -> Option<String> {
        let name = attribute.name.as_str();
        if !ATTRIBUTE_NAME.is_match(name) || name.starts_with("on") {
            return None;
        }

        let value = attribute.value.as_deref().map(decode_entities);
        let text = value.as_deref().unwrap_or("");
        if has_script_scheme(text) {
            return None;
        }

        if name == "class" || name == "id" {
            return Some(render(name, value.as_deref()));
        }

        let whitelist = self.filter.whitelist;
        let constraint = whitelist.attribute_constraint(tag, name)?;

        if name == "style" {
            let checked = CssChecker::new(whitelist.styles(), self.filter.guard)
                .drop_external_images(self.options.drop_external_images)
                .check_declarations(text);
            self.images_found |= checked.images_found;
            self.stats.css_declarations_dropped += checked.dropped;
            if checked.css.is_empty() {
                return None;
            }
            return Some(render(name, Some(checked.css.as_str())));
        }

        if self.options.drop_external_images
            && is_image_attribute(tag, name)
            && !(is_inline_image(text) || is_local_reference(text))
        {
            self.images_found = true;
            return Some(render(name, Some("")));
        }

        if !constraint.permits(text) {
            return None;
        }
        if URL_ATTRIBUTES.contains(&name) && !text.trim().is_empty() && !is_url_allowed(self.filter.guard, text) {
            return None;
        }

        Some(render(name, value.as_deref()))
    }
}

fn is_image_attribute(tag: &str, attribute: &str) -> bool {
    attribute == "background" || (attribute == "src" && matches!(tag, "img" | "input"))
}

fn render(name: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!(" {}=\"{}\"", name, encode_attribute(value)),
        None => format!(" {}", name),
    }
}

/// Make repeated spaces and tabs survive rendering.
///
/// `previous` is the character before `text` and is updated to its last one.
fn format_whitespace<'s>(text: &'s str, previous: &mut char) -> Cow<'s, str> {
    let joins_space = *previous == ' ' && text.starts_with(' ');
    if let Some(last) = text.chars().last() {
        if !joins_space && !text.contains("  ") && !text.contains('\t') {
            *previous = last;
            return Cow::Borrowed(text);
        }
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            ' ' if *previous == ' ' => out.push('\u{a0}'),
            '\t' => out.push_str("\u{a0}\u{a0}\u{a0}\u{a0}"),
            c => out.push(c),
        }
        *previous = c;
    }
    Cow::Owned(out)
}
