//! Errors that abort a single sanitize call.
//!
//! Malformed markup and bad CSS never show up here; they are stripped or
//! re-encoded by the filter. These variants only cover resource limits.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("Input too large: {length} bytes (limit {limit})")]
    InputTooLarge { length: usize, limit: usize },

    #[error("Nesting too deep: {0}")]
    NestingTooDeep(usize),

    #[error("Too many attributes on <{tag}>: {count}")]
    TooManyAttributes { tag: String, count: usize },

    #[error("Script removal did not settle after {0} passes")]
    ScriptPassLimit(usize),

    #[error("Filter did not settle after {0} rounds")]
    FilterRoundLimit(usize),
}

/// Result type for sanitizer operations
pub type SanitizeResult<T> = Result<T, SanitizeError>;
