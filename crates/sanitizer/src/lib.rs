//! Bastion's whitelist-based HTML/CSS sanitizer
//!
//! Untrusted markup (typically the body of an email) is tokenized, checked
//! against a [`bastion_policy::Whitelist`] and re-serialized. Script markup is
//! removed to a fixed point before and after filtering, so that fragments
//! reassembled by the filter cannot survive into the output.

use std::sync::Arc;

use bastion_policy::WhitelistStore;
use tracing::{debug, warn};

pub mod config;
pub mod css;
pub mod elements;
pub mod entities;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod options;
pub mod script;
pub mod structure;
pub mod tokenizer;
pub mod urls;

/// Re-export common types
pub use config::SanitizerConfig;
pub use css::{check_css, contains_forbidden_image_reference, CssChecker, CssOutput};
pub use entities::{decode_hex_entities, url_decode_suspicious_sequences};
pub use error::{SanitizeError, SanitizeResult};
pub use filter::{FilterOutput, FilterStats, HtmlFilter};
pub use metrics::{MetricsSnapshot, SanitizerMetrics};
pub use options::{SanitizeOptions, SanitizedHtml};
pub use script::{remove_scripts, sane_script_tags, ScriptPass};
pub use tokenizer::{Token, Tokenizer};

/// Entry point tying the policy store, limits and metrics together
#[derive(Debug)]
pub struct Sanitizer {
    store: Arc<WhitelistStore>,
    config: SanitizerConfig,
    metrics: Arc<SanitizerMetrics>,
}

impl Sanitizer {
    /// Create a sanitizer with the default limits
    pub fn new(store: Arc<WhitelistStore>) -> Self {
        Self::with_config(store, SanitizerConfig::default())
    }

    pub fn with_config(store: Arc<WhitelistStore>, config: SanitizerConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(SanitizerMetrics::new()),
        }
    }

    /// Sanitizer backed by the compiled-in default policy
    pub fn builtin() -> Self {
        Self::new(Arc::new(WhitelistStore::builtin()))
    }

    pub fn metrics(&self) -> Arc<SanitizerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<WhitelistStore> {
        &self.store
    }

    /// Sanitize `html` with the policy named in `options`.
    pub fn sanitize(&self, html: &str, options: &SanitizeOptions) -> SanitizeResult<SanitizedHtml> {
        match self.run(html, options) {
            Ok(sanitized) => {
                self.metrics.increment_documents();
                Ok(sanitized)
            }
            Err(err) => {
                self.metrics.increment_aborted();
                warn!("🚫 Sanitization aborted: {}", err);
                Err(err)
            }
        }
    }

    /// Like [`Sanitizer::sanitize`], but never fails.
    ///
    /// Oversized input yields an empty string; any other failure yields the
    /// whole input escaped as plain text.
    pub fn sanitize_or_escape(&self, html: &str, options: &SanitizeOptions) -> String {
        match self.sanitize(html, options) {
            Ok(sanitized) => sanitized.html,
            Err(SanitizeError::InputTooLarge { .. }) => String::new(),
            Err(_) => entities::encode_text(html),
        }
    }

    /// Check a declaration list against the styles of a policy.
    pub fn check_css(&self, declarations: &str, policy_name: Option<&str>) -> String {
        let whitelist = self.store.whitelist(policy_name);
        let guard = self.store.scheme_guard();
        let output = CssChecker::new(whitelist.styles(), &guard)
            .require_all_values_valid(true)
            .check_declarations(declarations);
        self.metrics.add_dropped_declarations(output.dropped);
        output.css
    }

    /// Scheme token check only; `cid:` and any `data:` URL pass.
    pub fn is_allowed_url_scheme(&self, url: &str) -> bool {
        self.store.scheme_guard().is_allowed(url)
    }

    /// The check applied to URL attributes: the scheme, and for `data:`
    /// URLs an image media type.
    pub fn is_allowed_url(&self, url: &str) -> bool {
        urls::is_url_allowed(&self.store.scheme_guard(), url)
    }

    pub fn contains_forbidden_image_reference(&self, css: &str) -> bool {
        css::contains_forbidden_image_reference(css, &self.store.scheme_guard())
    }

    fn run(&self, html: &str, options: &SanitizeOptions) -> SanitizeResult<SanitizedHtml> {
        if !self.config.accepts_length(html.len()) {
            return Err(SanitizeError::InputTooLarge {
                length: html.len(),
                limit: self.config.max_input_length,
            });
        }

        let guard = self.store.scheme_guard();
        let whitelist = self.store.whitelist(options.policy_name.as_deref());
        let filter = HtmlFilter::new(&whitelist, &guard, &self.config);

        let decoded = decode_hex_entities(html);
        let (mut current, passes) = remove_scripts(&decoded, self.config.max_script_passes)?;
        self.metrics.add_script_removals(passes);

        let mut images_found = false;
        for round in 0..self.config.max_filter_rounds {
            let output = filter.filter(&current, options)?;
            self.record(&output.stats);
            images_found |= output.images_found;

            let pass = sane_script_tags(&output.html);
            if !pass.removed {
                return Ok(SanitizedHtml {
                    html: output.html,
                    images_found,
                });
            }
            debug!("filter round {} reassembled script markup", round + 1);
            self.metrics.add_script_removals(1);
            current = pass.output;
        }

        warn!("filter output still changing after {} rounds", self.config.max_filter_rounds);
        Err(SanitizeError::FilterRoundLimit(self.config.max_filter_rounds))
    }

    fn record(&self, stats: &FilterStats) {
        self.metrics.add_rejected_tags(stats.tags_rejected);
        self.metrics.add_dropped_attributes(stats.attributes_dropped);
        self.metrics.add_dropped_declarations(stats.css_declarations_dropped);
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn sanitize(html: &str) -> String {
        Sanitizer::builtin()
            .sanitize(html, &SanitizeOptions::default())
            .unwrap()
            .html
    }

    #[test]
    fn test_hex_references_decoded_before_filtering() {
        assert_eq!(
            sanitize("<a href=\"&#x6A;avascript:alert(1)\">x</a>"),
            "<a>x</a>"
        );
        assert_eq!(
            sanitize("&#x3C;script&#x3E;alert(1)&#x3C;/script&#x3E;ok"),
            "&lt;script&gt;alert(1)&lt;/script&gt;ok"
        );
    }

    #[test]
    fn test_reassembled_script_removed() {
        // Dropping <blink> glues `%3cscr` and `ipt%3e` into an encoded tag.
        let sanitizer = Sanitizer::builtin();
        let out = sanitizer
            .sanitize("%3cscr<blink></blink>ipt%3ealert(1)done", &SanitizeOptions::default())
            .unwrap();
        assert_eq!(out.html, "alert(1)done");
        assert_eq!(sanitizer.metrics().snapshot().script_removals, 1);
    }

    #[test]
    fn test_input_too_large() {
        let config = SanitizerConfig {
            max_input_length: 8,
            ..SanitizerConfig::default()
        };
        let sanitizer = Sanitizer::with_config(Arc::new(WhitelistStore::builtin()), config);
        let err = sanitizer
            .sanitize("<p>far too long</p>", &SanitizeOptions::default())
            .unwrap_err();
        assert_eq!(err, SanitizeError::InputTooLarge { length: 19, limit: 8 });
        assert_eq!(sanitizer.sanitize_or_escape("<p>far too long</p>", &SanitizeOptions::default()), "");
        assert_eq!(sanitizer.metrics().aborted_calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_escape_fallback_on_limit() {
        let config = SanitizerConfig {
            max_nesting_depth: 2,
            ..SanitizerConfig::default()
        };
        let sanitizer = Sanitizer::with_config(Arc::new(WhitelistStore::builtin()), config);
        let out = sanitizer.sanitize_or_escape("<div><div><div>x</div></div></div>", &SanitizeOptions::default());
        assert_eq!(
            out,
            "&lt;div&gt;&lt;div&gt;&lt;div&gt;x&lt;/div&gt;&lt;/div&gt;&lt;/div&gt;"
        );
    }

    #[test]
    fn test_facade_css_helpers() {
        let sanitizer = Sanitizer::builtin();
        assert_eq!(sanitizer.check_css("color: red; behavior: url(x.htc)", None), "color: red");
        assert!(sanitizer.contains_forbidden_image_reference("background: url(http://evil/p.gif)"));
        assert!(!sanitizer.contains_forbidden_image_reference("background: url(cid:logo)"));
    }

    #[test]
    fn test_facade_url_schemes() {
        let sanitizer = Sanitizer::builtin();
        assert!(sanitizer.is_allowed_url_scheme("https://example.com"));
        assert!(sanitizer.is_allowed_url_scheme("image001.png"));
        assert!(sanitizer.is_allowed_url_scheme("data:image/gif;base64,R0lG"));
        assert!(sanitizer.is_allowed_url_scheme("data:text/html,<script>alert(1)</script>"));
        assert!(sanitizer.is_allowed_url_scheme("CID:part1"));
        assert!(!sanitizer.is_allowed_url_scheme("javascript:alert(1)"));

        assert!(sanitizer.is_allowed_url("data:image/gif;base64,R0lG"));
        assert!(!sanitizer.is_allowed_url("data:text/html;base64,PHNjcmlwdD4="));
        assert!(!sanitizer.is_allowed_url("javascript:alert(1)"));
    }

    #[test]
    fn test_metrics_recorded() {
        let sanitizer = Sanitizer::builtin();
        sanitizer
            .sanitize(
                "<blink onclick=\"x()\">a</blink><p onclick=\"x()\">b</p><script>c</script>",
                &SanitizeOptions::default(),
            )
            .unwrap();

        let snapshot = sanitizer.metrics().snapshot();
        assert_eq!(snapshot.documents_sanitized, 1);
        assert_eq!(snapshot.tags_rejected, 1);
        assert_eq!(snapshot.attributes_dropped, 1);
        assert_eq!(snapshot.script_removals, 1);
    }
}
