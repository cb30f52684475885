#![no_main]
//! Fuzz testing for the CSS declaration checker

use bastion_policy::{parse_whitelist, UrlSchemeGuard, DEFAULT_DEFINITION};
use bastion_sanitizer::CssChecker;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(css) = std::str::from_utf8(data) else {
        return;
    };
    if css.len() > 10_000 {
        return;
    }

    let Ok(whitelist) = parse_whitelist(DEFAULT_DEFINITION) else {
        return;
    };
    let guard = UrlSchemeGuard::default();
    let checker = CssChecker::new(whitelist.styles(), &guard);

    let checked = checker.check_declarations(css);
    let lower = checked.css.to_ascii_lowercase();
    for forbidden in ["expression(", "javascript:", "behavior", "-moz-binding", "@import"] {
        assert!(!lower.contains(forbidden), "{} survived in {:?}", forbidden, checked.css);
    }

    // Checked output passes a second check unchanged.
    assert_eq!(checker.check_declarations(&checked.css).css, checked.css);

    let sheet = checker.check_stylesheet(css, Some("msg"));
    assert!(!sheet.css.contains('<'));
});
