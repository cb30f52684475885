#![no_main]
//! Fuzz testing for the whitelist definition loader

use bastion_policy::{parse_whitelist, STRUCTURAL_TAGS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let definition = String::from_utf8_lossy(data);

    // Malformed lines are skipped; only an empty result is an error.
    if let Ok(whitelist) = parse_whitelist(&definition) {
        for tag in STRUCTURAL_TAGS {
            assert!(whitelist.is_tag_allowed(tag));
        }
        for property in whitelist.styles().properties() {
            assert!(!property.is_empty());
        }
    }
});
