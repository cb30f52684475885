use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters describing what the sanitizer removed
#[derive(Debug, Default)]
pub struct SanitizerMetrics {
    /// Number of documents sanitized successfully
    pub documents_sanitized: AtomicUsize,
    /// Number of start tags rejected
    pub tags_rejected: AtomicUsize,
    /// Number of attributes dropped
    pub attributes_dropped: AtomicUsize,
    /// Number of CSS declarations dropped
    pub css_declarations_dropped: AtomicUsize,
    /// Number of script passes that removed something
    pub script_removals: AtomicUsize,
    /// Number of calls aborted by a limit
    pub aborted_calls: AtomicUsize,
}

impl SanitizerMetrics {
    /// Create new sanitizer metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_documents(&self) {
        self.documents_sanitized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rejected_tags(&self, count: usize) {
        self.tags_rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dropped_attributes(&self, count: usize) {
        self.attributes_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_dropped_declarations(&self, count: usize) {
        self.css_declarations_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_script_removals(&self, count: usize) {
        self.script_removals.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_aborted(&self) {
        self.aborted_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a plain copy of the current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_sanitized: self.documents_sanitized.load(Ordering::Relaxed),
            tags_rejected: self.tags_rejected.load(Ordering::Relaxed),
            attributes_dropped: self.attributes_dropped.load(Ordering::Relaxed),
            css_declarations_dropped: self.css_declarations_dropped.load(Ordering::Relaxed),
            script_removals: self.script_removals.load(Ordering::Relaxed),
            aborted_calls: self.aborted_calls.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.documents_sanitized.store(0, Ordering::Relaxed);
        self.tags_rejected.store(0, Ordering::Relaxed);
        self.attributes_dropped.store(0, Ordering::Relaxed);
        self.css_declarations_dropped.store(0, Ordering::Relaxed);
        self.script_removals.store(0, Ordering::Relaxed);
        self.aborted_calls.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time values of [`SanitizerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub documents_sanitized: usize,
    pub tags_rejected: usize,
    pub attributes_dropped: usize,
    pub css_declarations_dropped: usize,
    pub script_removals: usize,
    pub aborted_calls: usize,
}
