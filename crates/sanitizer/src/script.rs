//! Fixed-point removal of script elements that survive tokenization.
//!
//! Broken tags (`<<script>`), percent-encoded brackets and quote
//! concatenation tricks are normalized first; the normalization is only a
//! matching aid and is discarded when nothing was removed.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::entities::url_decode_suspicious_sequences;
use crate::error::{SanitizeError, SanitizeResult};

lazy_static! {
    static ref QUOTE_JOIN: Regex = Regex::new(r#""\s*(?:\+|%2[bB])\s*"|'\s*(?:\+|%2[bB])\s*'"#).unwrap();
    static ref SCRIPT_REGION: Regex =
        Regex::new(r"(?is)<+\s*script[^>]*>.*?<+\s*/\s*script[^>]*>").unwrap();
    static ref SCRIPT_TAG: Regex = Regex::new(r"(?i)<+\s*/?\s*script[^>]*>?").unwrap();
}

/// Outcome of one script removal pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPass {
    pub output: String,
    /// Whether anything was removed
    pub removed: bool,
}

/// Run one script removal pass over `html`.
pub fn sane_script_tags(html: &str) -> ScriptPass {
    let decoded = url_decode_suspicious_sequences(html);
    let joined = QUOTE_JOIN.replace_all(&decoded, "");

    let (output, removed) = if SCRIPT_REGION.is_match(&joined) {
        (SCRIPT_REGION.replace_all(&joined, "").into_owned(), true)
    } else if SCRIPT_TAG.is_match(&joined) {
        (SCRIPT_TAG.replace_all(&joined, "").into_owned(), true)
    } else {
        (String::new(), false)
    };

    if removed {
        ScriptPass { output, removed }
    } else {
        ScriptPass {
            output: html.to_string(),
            removed: false,
        }
    }
}

/// Repeat [`sane_script_tags`] until a pass removes nothing.
///
/// Returns the output and the number of passes that removed something.
pub fn remove_scripts(html: &str, max_passes: usize) -> SanitizeResult<(String, usize)> {
    let mut current = html.to_string();
    for pass in 0..max_passes {
        let result = sane_script_tags(&current);
        if !result.removed {
            return Ok((current, pass));
        }
        debug!("script pass {} removed script markup", pass + 1);
        current = result.output;
    }
    warn!("script removal still changing input after {} passes", max_passes);
    Err(SanitizeError::ScriptPassLimit(max_passes))
}
