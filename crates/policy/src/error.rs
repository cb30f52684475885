//! Policy specific errors for the Bastion sanitizer.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Policy definition unavailable: {name}")]
    Unavailable { name: String },

    #[error("Policy definition `{name}` produced no tag rules")]
    Empty { name: String },

    #[error("Invalid URL scheme encountered: {scheme}")]
    InvalidScheme { scheme: String },
}

/// Result type for policy operations
pub type PolicyResult<T> = Result<T, PolicyError>;
