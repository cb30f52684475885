//! Static HTML element categories.

/// How an element's end tag behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTag {
    /// Never has content or an end tag
    Void,
    /// The end tag may be left out
    Optional,
    /// The end tag must be present
    Mandatory,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const OPTIONAL_END_ELEMENTS: &[&str] = &[
    "body", "caption", "colgroup", "dd", "dt", "head", "html", "li", "optgroup", "option", "p",
    "rp", "rt", "tbody", "td", "tfoot", "th", "thead", "tr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "textarea",
    "title", "xmp",
];

/// Elements whose start tag closes an open `<p>`
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "dd", "details", "dialog", "dir",
    "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "header", "hgroup", "hr", "li", "main", "menu", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

const TABLE_SECTIONS: &[&str] = &["tbody", "tfoot", "thead"];

/// Microsoft Word markup namespaces
const WORD_PREFIXES: &[&str] = &["o:", "w:", "m:", "v:", "st1:"];

pub fn end_tag(name: &str) -> EndTag {
    if VOID_ELEMENTS.contains(&name) {
        EndTag::Void
    } else if OPTIONAL_END_ELEMENTS.contains(&name) {
        EndTag::Optional
    } else {
        EndTag::Mandatory
    }
}

pub fn is_void(name: &str) -> bool {
    end_tag(name) == EndTag::Void
}

/// Elements whose content is not markup
pub fn is_raw_text(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

/// Elements removed together with their content whatever the policy says.
pub fn is_always_removed(name: &str) -> bool {
    name == "script" || name == "xml" || WORD_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

pub fn is_list_container(name: &str) -> bool {
    name == "ul" || name == "ol"
}

/// Whether a start tag for `incoming` implicitly ends the open element `open`.
pub fn closes_implicitly(open: &str, incoming: &str) -> bool {
    match open {
        "p" => CLOSES_PARAGRAPH.contains(&incoming),
        "li" => incoming == "li",
        "dt" | "dd" => matches!(incoming, "dt" | "dd"),
        "option" => matches!(incoming, "option" | "optgroup"),
        "optgroup" => incoming == "optgroup",
        "rt" | "rp" => matches!(incoming, "rt" | "rp"),
        "tr" => incoming == "tr" || TABLE_SECTIONS.contains(&incoming),
        "td" | "th" => matches!(incoming, "td" | "th" | "tr") || TABLE_SECTIONS.contains(&incoming),
        "thead" | "tbody" | "tfoot" => TABLE_SECTIONS.contains(&incoming),
        "colgroup" => incoming != "col",
        "caption" => matches!(incoming, "tr" | "td" | "th" | "col" | "colgroup")
            || TABLE_SECTIONS.contains(&incoming),
        "head" => incoming == "body",
        _ => false,
    }
}
