//! Security-focused tests for the Bastion sanitizer
//!
//! These tests feed hostile markup through the public facade and check the
//! properties every output must have, whatever the input.

use std::sync::Arc;
use std::thread;

use bastion_policy::{StaticPolicySource, Whitelist, WhitelistStore, DEFAULT_DEFINITION};
use bastion_sanitizer::{SanitizeOptions, Sanitizer, SanitizerConfig, Token, Tokenizer};
use pretty_assertions::assert_eq;

fn sanitize(html: &str) -> String {
    Sanitizer::builtin()
        .sanitize(html, &SanitizeOptions::default())
        .unwrap()
        .html
}

/// Every tag and attribute in `html` must be permitted by `whitelist`.
fn assert_only_whitelisted(html: &str, whitelist: &Whitelist) {
    let tokens = Tokenizer::new(html, 1024).tokenize().unwrap();
    for token in tokens {
        let Token::StartTag { name, attributes, .. } = token else {
            continue;
        };
        assert!(whitelist.is_tag_allowed(&name), "<{}> leaked into {:?}", name, html);
        for attribute in attributes {
            assert!(
                !attribute.name.starts_with("on"),
                "event handler {} leaked into {:?}",
                attribute.name,
                html
            );
            let permitted = attribute.name == "class"
                || attribute.name == "id"
                || whitelist.attribute_constraint(&name, &attribute.name).is_some();
            assert!(permitted, "{} on <{}> leaked into {:?}", attribute.name, name, html);
        }
    }
}

const HOSTILE_INPUTS: &[&str] = &[
    r#"<img src="http://evil/x.png" onerror="alert(1)">"#,
    r#"<a href="javascript:alert(1)">click</a>"#,
    r#"<<SCRIPT>alert("XSS")//<</SCRIPT>"#,
    r#"<div style="color:red;behavior:url(evil.htc)">x</div>"#,
    "<ul><li>ok</li></ul><li>orphan</li>",
    r#"<iframe src="http://evil/"></iframe><object data="x.swf"></object>"#,
    r#"<body onload="steal()"><p onclick="x()" title="t">hi</p></body>"#,
    r#"<svg><g onload="alert(1)"></g></svg><math><mi>x</mi></math>"#,
    r#"<form action="http://evil/"><input name="pw" type="password"></form>"#,
    r#"<p>one<p>two <b>bold <i>both</b> italic</i>"#,
    r#"<table><tr><td>a<td>b<tr><td>c</table>"#,
    r#"<meta http-equiv="refresh" content="0;url=javascript:alert(1)">"#,
    r#"<base href="http://evil/"><link rel="stylesheet" href="http://evil/x.css">"#,
    r#"<div data-x="1" style="width: expression(alert(1))">e</div>"#,
];

#[test]
fn test_example_scenarios() {
    assert_eq!(
        sanitize(r#"<img src="http://evil/x.png" onerror="alert(1)">"#),
        r#"<img src="http://evil/x.png">"#
    );
    assert_eq!(sanitize(r#"<a href="javascript:alert(1)">click</a>"#), "<a>click</a>");
    assert!(!sanitize(r#"<<SCRIPT>alert("XSS")//<</SCRIPT>"#)
        .to_ascii_lowercase()
        .contains("script"));
    assert_eq!(
        sanitize(r#"<div style="color:red;behavior:url(evil.htc)">x</div>"#),
        r#"<div style="color:red">x</div>"#
    );
    assert_eq!(sanitize("<ul><li>ok</li></ul><li>orphan</li>"), "<ul><li>ok</li></ul>orphan");
}

#[test]
fn test_no_unauthorized_tags_or_attributes() {
    let store = WhitelistStore::builtin();
    let whitelist = store.whitelist(None);
    for input in HOSTILE_INPUTS {
        assert_only_whitelisted(&sanitize(input), &whitelist);
    }
}

#[test]
fn test_sanitize_is_idempotent() {
    let inputs = [
        "<p>one<p>two",
        "<ul><li>a<li>b</ul>",
        r#"<div style="color: red; behavior: x">t</div>"#,
        "a &lt; b &amp;&amp; c &nbsp; d",
        r#"<img src="http://x/y.png" alt='"q"'>"#,
        "<blink>x</blink><table><tr><td>1",
        "<<SCRIPT>alert(1)//<</SCRIPT>tail",
        "text with %3cscript%3e",
        r#"<a href="javascript:alert(1)">click</a>"#,
        "<html><head><title>t</title></head><body><p>x</body></html>",
    ];

    let whitespace_inputs = [
        "a <!-- c --> b",
        "a <blink></blink> b",
        "x\t<o:p> </o:p>  y",
        "<blink\ttitle=x>y</blink>",
        "<p>a </p> <p> b\t</p>  c",
    ];

    let sanitizer = Sanitizer::builtin();
    let formatted = SanitizeOptions {
        format_whitespace: true,
        ..SanitizeOptions::default()
    };
    let formatted_escaped = SanitizeOptions {
        strip_invalid_elements: false,
        ..formatted.clone()
    };
    let runs = [
        (SanitizeOptions::default(), inputs.iter().chain(HOSTILE_INPUTS).collect::<Vec<_>>()),
        (formatted, inputs.iter().chain(HOSTILE_INPUTS).chain(&whitespace_inputs).collect()),
        (formatted_escaped, whitespace_inputs.iter().collect()),
    ];
    for (options, inputs) in runs {
        for input in inputs {
            let once = sanitizer.sanitize(input, &options).unwrap().html;
            let twice = sanitizer.sanitize(&once, &options).unwrap().html;
            assert_eq!(once, twice, "not idempotent for {:?} with {:?}", input, options);
        }
    }
}

#[test]
fn test_whitespace_runs_across_removed_markup() {
    let sanitizer = Sanitizer::builtin();
    let options = SanitizeOptions {
        format_whitespace: true,
        ..SanitizeOptions::default()
    };
    let out = sanitizer.sanitize("a <!-- c --> b", &options).unwrap();
    assert_eq!(out.html, "a &nbsp;b");
}

#[test]
fn test_script_eradication() {
    let inputs = [
        "<script>alert(1)</script>",
        "<SCRIPT SRC=//evil/x.js></SCRIPT>",
        "<<script>alert(1)//<</script>",
        "%3cscript%3ealert(1)%3c/script%3e",
        "%253cscript%253ealert(1)%253c/script%253e",
        "<scr<script>ipt>alert(1)</script>",
        "'<scr'+'ipt>alert(1)'",
        "\"<scr\" %2B \"ipt src=//evil/x.js>\"",
        "<p>a<script>\ndocument.write('x')\n</script>b</p>",
    ];

    for input in inputs {
        let out = sanitize(input).to_ascii_lowercase();
        assert!(!out.contains("<script"), "script tag survived {:?}: {:?}", input, out);
        assert!(!out.contains("script"), "script text survived {:?}: {:?}", input, out);
    }
}

#[test]
fn test_script_schemes_dropped() {
    let cases = [
        (r#"<a href="java&#x09;script:alert(1)">x</a>"#, "<a>x</a>"),
        (r#"<a href="&#106;avascript:alert(1)">x</a>"#, "<a>x</a>"),
        (r#"<a href="  JAVASCRIPT:alert(1)">x</a>"#, "<a>x</a>"),
        (r#"<img src="vbscript:msgbox(1)">"#, "<img>"),
        (r#"<table background="javascript:x"></table>"#, "<table></table>"),
        (r#"<a href="file:///etc/passwd">x</a>"#, "<a>x</a>"),
        (r#"<a href="https://example.com/">x</a>"#, r#"<a href="https://example.com/">x</a>"#),
        (r#"<a href="mailto:me@example.com">x</a>"#, r#"<a href="mailto:me@example.com">x</a>"#),
    ];

    for (input, expected) in cases {
        assert_eq!(sanitize(input), expected, "input {:?}", input);
    }
}

#[test]
fn test_css_containment() {
    let inputs = [
        r#"<div style="width: expression(alert(1))">x</div>"#,
        r#"<div style="-moz-binding: url(evil.xml#x)">x</div>"#,
        r#"<div style="color: red; behavior: url(x.htc)">x</div>"#,
        r#"<div style="background-image: url(javascript:alert(1))">x</div>"#,
        r#"<div style="color: e\x70ression(1)">x</div>"#,
        "<style>@import url(http://evil/x.css); p { color: red }</style>",
        "<style>p { width: expression(alert(1)) }</style>",
    ];

    for input in inputs {
        let out = sanitize(input).to_ascii_lowercase();
        for forbidden in ["expression", "behavior", "-moz-binding", "@import", "javascript"] {
            assert!(!out.contains(forbidden), "{} survived in {:?}", forbidden, out);
        }
    }

    let styled = sanitize("<style>@import url(http://evil/x.css); p { color: red }</style>");
    assert!(styled.contains("color: red"));
}

#[test]
fn test_hostile_stylesheets_stay_bounded() {
    let nested = format!("<style>{}p {{ color: red }}</style>x", "@media a{".repeat(20_000));
    assert_eq!(sanitize(&nested), "<style></style>x");

    let statements = format!("<style>{}p {{ color: red }}</style>ok", "@a;".repeat(50_000));
    assert_eq!(sanitize(&statements), "<style>p { color: red }</style>ok");
}

#[test]
fn test_nested_percent_encoding_collapses() {
    let html = format!("%{}3cscript%3ealert(1)", "25".repeat(20_000));
    assert_eq!(sanitize(&html), "alert(1)");
}

#[test]
fn test_unclosed_head_markup_keeps_body() {
    assert_eq!(
        sanitize("<html><blink>x<body><p>Hello</p></body></html>"),
        "<html><body><p>Hello</p></body></html>"
    );
}

#[test]
fn test_style_element_scoped_to_prefix() {
    let sanitizer = Sanitizer::builtin();
    let options = SanitizeOptions::default().with_css_prefix("msg");
    let out = sanitizer
        .sanitize("<style>body p { color: red }</style><p>x</p>", &options)
        .unwrap();
    assert!(out.html.contains("#msg p { color: red }"), "{}", out.html);
}

#[test]
fn test_list_structure_integrity() {
    assert_eq!(sanitize("<div><li>x</li></div>"), "<div>x</div>");
    assert_eq!(sanitize("<ol><li>a<li>b</ol>"), "<ol><li>a</li><li>b</li></ol>");
    assert_eq!(sanitize("<li>lonely"), "lonely");
    assert_eq!(
        sanitize("<ul><li>a<ul><li>b</li></ul></li></ul>"),
        "<ul><li>a<ul><li>b</li></ul></li></ul>"
    );
}

#[test]
fn test_external_images_dropped() {
    let sanitizer = Sanitizer::builtin();
    let options = SanitizeOptions {
        drop_external_images: true,
        ..SanitizeOptions::default()
    };

    let out = sanitizer
        .sanitize(r#"<img src="http://tracker/pixel.gif"><img src="cid:logo">"#, &options)
        .unwrap();
    assert!(out.images_found);
    assert_eq!(out.html, r#"<img src=""><img src="cid:logo">"#);

    let out = sanitizer
        .sanitize(
            r#"<div style="background: url(http://tracker/p.gif)">x</div>"#,
            &options,
        )
        .unwrap();
    assert!(out.images_found);
    assert!(!out.html.contains("tracker"));

    let out = sanitizer
        .sanitize(r#"<img src="cid:logo">"#, &options)
        .unwrap();
    assert!(!out.images_found);
}

#[test]
fn test_escape_mode_keeps_rejected_markup_visible() {
    let sanitizer = Sanitizer::builtin();
    let options = SanitizeOptions {
        strip_invalid_elements: false,
        ..SanitizeOptions::default()
    };
    let out = sanitizer.sanitize("<blink>hi</blink>", &options).unwrap();
    assert_eq!(out.html, "&lt;blink&gt;hi&lt;/blink&gt;");

    // Script is never shown, even as text.
    let out = sanitizer.sanitize("<script>alert(1)</script>ok", &options).unwrap();
    assert_eq!(out.html, "ok");
}

#[test]
fn test_fallbacks_never_return_the_input() {
    let config = SanitizerConfig {
        max_input_length: 64,
        max_nesting_depth: 3,
        ..SanitizerConfig::default()
    };
    let sanitizer = Sanitizer::with_config(Arc::new(WhitelistStore::builtin()), config);
    let options = SanitizeOptions::default();

    let huge = "<p>".repeat(100);
    assert_eq!(sanitizer.sanitize_or_escape(&huge, &options), "");

    let deep = "<b><i><u><s>x";
    assert_eq!(
        sanitizer.sanitize_or_escape(deep, &options),
        "&lt;b&gt;&lt;i&gt;&lt;u&gt;&lt;s&gt;x"
    );
    assert_eq!(sanitizer.metrics().snapshot().aborted_calls, 2);
}

#[test]
fn test_named_policy() {
    let source = StaticPolicySource::new()
        .with_default(DEFAULT_DEFINITION)
        .with_policy("plain", "html.tag.p=\"\"");
    let sanitizer = Sanitizer::new(Arc::new(WhitelistStore::new(Arc::new(source))));

    let plain = SanitizeOptions::default().with_policy("plain");
    let out = sanitizer.sanitize("<p align=\"left\"><b>x</b></p>", &plain).unwrap();
    assert_eq!(out.html, "<p>x</p>");

    let out = sanitizer
        .sanitize("<p align=\"left\"><b>x</b></p>", &SanitizeOptions::default())
        .unwrap();
    assert_eq!(out.html, "<p align=\"left\"><b>x</b></p>");

    // Unknown policies fall back to the default one.
    let missing = SanitizeOptions::default().with_policy("missing");
    let out = sanitizer.sanitize("<b>x</b>", &missing).unwrap();
    assert_eq!(out.html, "<b>x</b>");
}

#[test]
fn test_configured_scheme_list() {
    let source = StaticPolicySource::new()
        .with_default(DEFAULT_DEFINITION)
        .with_schemes("https");
    let sanitizer = Sanitizer::new(Arc::new(WhitelistStore::new(Arc::new(source))));

    assert_eq!(
        sanitizer.sanitize_or_escape(r#"<a href="http://example.com/">x</a>"#, &SanitizeOptions::default()),
        "<a>x</a>"
    );
    assert!(sanitizer.is_allowed_url_scheme("https://example.com/"));
    assert!(!sanitizer.is_allowed_url_scheme("mailto:me@example.com"));
}

#[test]
fn test_concurrent_sanitize_during_reload() {
    let sanitizer = Arc::new(Sanitizer::builtin());
    let input = r#"<div style="color: red">a</div><a href="javascript:x">b</a><li>c</li>"#;
    let expected = sanitize(input);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let sanitizer = Arc::clone(&sanitizer);
            let expected = expected.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    if i == 0 {
                        sanitizer.store().reload();
                    }
                    let out = sanitizer.sanitize(input, &SanitizeOptions::default()).unwrap();
                    assert_eq!(out.html, expected);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(sanitizer.metrics().snapshot().documents_sanitized, 400);
}
